use crate::cache::{CacheGroup, CacheType};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

/// Periodically log group and per-cache counters
pub fn spawn_stats_logger(group: CacheGroup, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately; nothing worth logging yet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            info!(group = group.name(), stats = %to_json(&group.stats()), "Stats");
            info!(
                group = group.name(),
                stats = %to_json(&group.cache_stats(CacheType::Main)),
                "CacheStats:MainCache"
            );
            info!(
                group = group.name(),
                stats = %to_json(&group.cache_stats(CacheType::Hot)),
                "CacheStats:HotCache"
            );
        }
    })
}

fn to_json<T: Serialize>(stats: &T) -> String {
    serde_json::to_string(stats).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GroupStatsSnapshot;

    #[test]
    fn test_stats_render_as_json() {
        let stats = GroupStatsSnapshot {
            gets: 3,
            cache_hits: 2,
            ..Default::default()
        };
        let value: serde_json::Value = serde_json::from_str(&to_json(&stats)).unwrap();
        assert_eq!(value["gets"], 3);
        assert_eq!(value["cache_hits"], 2);
        assert_eq!(value["server_requests"], 0);
        assert_eq!(value["in_flight_loads"], 0);
    }
}
