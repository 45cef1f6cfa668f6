use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Base URL of one cooperating server instance, e.g. `http://10.0.0.7:8080`.
///
/// Stored normalized (no trailing slash, no path) so two spellings of the
/// same instance compare equal and hash to the same ring position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Peer(String);

impl Peer {
    /// Parse an absolute http(s) base URL.
    pub fn parse(raw: &str) -> MembershipResult<Self> {
        let invalid = |reason: &str| MembershipError::InvalidPeer {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        if url.path() != "/" && !url.path().is_empty() {
            return Err(invalid("base URL must not carry a path"));
        }

        let base = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        Ok(Self(base))
    }

    /// Build a peer from a discovered endpoint, reusing `scheme`.
    pub fn from_endpoint(scheme: &str, host: &str, port: u16) -> MembershipResult<Self> {
        Self::parse(&format!("{}://{}:{}", scheme, host, port))
    }

    pub fn scheme(&self) -> &str {
        self.0.split("://").next().unwrap_or("http")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unordered collection of peers, compared by value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet(BTreeSet<Peer>);

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer set holding `others` plus the local instance.
    pub fn with_self(self_peer: &Peer, others: impl IntoIterator<Item = Peer>) -> Self {
        let mut peers: BTreeSet<Peer> = others.into_iter().collect();
        peers.insert(self_peer.clone());
        Self(peers)
    }

    pub fn contains(&self, peer: &Peer) -> bool {
        self.0.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.0.iter()
    }

    pub fn to_urls(&self) -> Vec<String> {
        self.0.iter().map(|p| p.0.clone()).collect()
    }
}

impl FromIterator<Peer> for PeerSet {
    fn from_iter<I: IntoIterator<Item = Peer>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A complete replacement peer set tagged with its publication order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUpdate {
    /// Strictly increasing per publisher; receivers drop anything not newer.
    pub epoch: u64,
    pub peers: PeerSet,
}

/// Receiver of peer set updates (the cache tier's routing table)
pub trait PeerSink: Send + Sync {
    /// Replace the routing table. Returns false when the update was stale.
    fn set_peers(&self, update: PeerUpdate) -> bool;
}

/// Membership error types
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Invalid peer URL {url:?}: {reason}")]
    InvalidPeer { url: String, reason: String },

    /// Resolution failed this cycle; the last published set stays in force.
    #[error("Peer resolution failed: {0}")]
    Transient(String),

    /// Resolution can never succeed; the server must not keep running.
    #[error("Fatal peer resolution error: {0}")]
    Fatal(String),
}

impl MembershipError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Membership result type
pub type MembershipResult<T> = Result<T, MembershipError>;
