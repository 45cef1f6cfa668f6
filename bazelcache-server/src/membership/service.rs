//! Membership service
//!
//! Polls a [`PeerResolver`] and publishes the resulting peer set to a
//! [`PeerSink`] whenever it changes. Every published set is a complete
//! replacement tagged with a fresh epoch.

use super::resolver::PeerResolver;
use super::types::{MembershipResult, PeerSet, PeerSink, PeerUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub struct MembershipService {
    resolver: Arc<dyn PeerResolver>,
    sink: Arc<dyn PeerSink>,
    poll_interval: Duration,
    last_published: Option<PeerSet>,
    epoch: u64,
}

impl MembershipService {
    pub fn new(
        resolver: Arc<dyn PeerResolver>,
        sink: Arc<dyn PeerSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            resolver,
            sink,
            poll_interval,
            last_published: None,
            epoch: 0,
        }
    }

    /// Run one resolution cycle.
    ///
    /// Returns `Ok(true)` when a new peer set was published. Transient
    /// failures are logged and reported as `Ok(false)`; only fatal ones
    /// propagate.
    pub async fn poll_once(&mut self) -> MembershipResult<bool> {
        let peers = match self.resolver.resolve().await {
            Ok(peers) => peers,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Peer resolution failed, keeping last known peers");
                return Ok(false);
            }
        };

        if self.last_published.as_ref() == Some(&peers) {
            debug!(peers = peers.len(), "Peer set unchanged");
            return Ok(false);
        }

        self.epoch += 1;
        let update = PeerUpdate {
            epoch: self.epoch,
            peers: peers.clone(),
        };
        if !self.sink.set_peers(update) {
            warn!(epoch = self.epoch, "Peer update rejected as stale");
            return Ok(false);
        }

        info!(epoch = self.epoch, peers = ?peers.to_urls(), "Published peer set");
        self.last_published = Some(peers);
        Ok(true)
    }

    /// Poll until shutdown. Static resolvers are published once and the
    /// loop ends; dynamic ones are polled every interval.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MembershipResult<()> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await?;
                    if !self.resolver.is_dynamic() && self.last_published.is_some() {
                        debug!("Static peer set published, membership loop done");
                        return Ok(());
                    }
                }
                _ = shutdown.changed() => {
                    info!("Membership service stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<MembershipResult<()>> {
        tokio::spawn(self.run(shutdown))
    }
}
