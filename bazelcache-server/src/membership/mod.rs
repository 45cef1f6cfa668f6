//! Peer Membership
//!
//! Keeps the cache tier's routing table in step with the fleet:
//! - Static peer list (fixed for the process lifetime)
//! - SRV-based discovery polled on an interval
//! - Change detection so unchanged results are never republished
//! - Epoch-tagged updates so stale sets never replace fresher ones

pub mod resolver;
pub mod service;
pub mod srv;
pub mod types;

pub use resolver::{PeerResolver, StaticResolver, resolver_for};
pub use service::MembershipService;
pub use srv::{SrvResolver, peers_from_targets};
pub use types::{MembershipError, MembershipResult, Peer, PeerSet, PeerSink, PeerUpdate};
