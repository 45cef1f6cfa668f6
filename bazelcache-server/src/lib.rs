pub mod cache;
pub mod config;
pub mod core;
pub mod membership;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheGroup, CacheType, GroupConfig};
pub use config::{ConfigError, PeerSource, ServerConfig, ValidatedConfig};
pub use core::{CacheError, CacheKey, ErrorKind, Namespace};
pub use membership::{MembershipService, Peer, PeerResolver, PeerSet, PeerSink, PeerUpdate};
pub use server::{AppState, create_router, spawn_stats_logger};
pub use store::{BlobStore, ObjectBlobStore, StoreError};
