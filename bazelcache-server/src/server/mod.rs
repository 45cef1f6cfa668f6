pub mod handlers;
pub mod router;
pub mod stats;

pub use handlers::AppState;
pub use router::create_router;
pub use stats::spawn_stats_logger;
