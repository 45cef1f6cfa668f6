use crate::cache::GroupConfig;
use crate::membership::{Peer, PeerSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: Server,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub peers: PeersConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    /// Socket to listen on
    pub bind: String,
    /// Base URL other instances use to reach this one
    pub self_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    S3,
    /// Directory named by `bucket` on the local filesystem
    File,
    /// Process memory, for tests and local experiments
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub bucket: String,
    pub region: String,
    /// Custom S3 endpoint (MinIO and friends)
    pub endpoint: Option<String>,
    pub path_style: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub group_name: String,
    /// Upper bound for cached bytes (main + hot)
    pub cache_bytes: u64,
    pub peer_timeout_secs: u64,
    /// Zero disables periodic stats logging
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Explicit peer base URLs
    pub static_peers: Vec<String>,
    /// SRV record to poll for peers
    pub srv_endpoint: Option<String>,
    pub discovery_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            self_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 300,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::S3,
            bucket: String::new(),
            region: "us-west-2".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            path_style: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            group_name: "bazelcache".to_string(),
            cache_bytes: 2 << 32,
            peer_timeout_secs: 30,
            stats_interval_secs: 15,
        }
    }
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            static_peers: Vec::new(),
            srv_endpoint: None,
            discovery_interval_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("bucket is required")]
    MissingBucket,

    #[error("invalid bind address {addr:?}: {reason}")]
    InvalidBind { addr: String, reason: String },

    #[error("self URL {url:?} is not a valid URL: {reason}")]
    InvalidSelfUrl { url: String, reason: String },

    #[error("{url:?} is not a valid peer URL: {reason}")]
    InvalidPeerUrl { url: String, reason: String },

    #[error("static peers and SRV peer discovery are mutually exclusive options")]
    ConflictingPeerSources,

    #[error("invalid SRV endpoint {name:?}: {reason}")]
    InvalidSrvEndpoint { name: String, reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Where the peer set comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSource {
    /// Only this instance
    Standalone,
    /// Fixed list (self not included)
    Static(PeerSet),
    /// SRV record name polled for targets
    Srv(String),
}

/// Configuration after validation, with parsed addresses and durations
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub bind: SocketAddr,
    pub self_peer: Peer,
    pub peer_source: PeerSource,
    pub discovery_interval: Duration,
    pub request_timeout: Duration,
    pub stats_interval: Option<Duration>,
    pub store: StoreConfig,
    pub group: GroupConfig,
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Check every option and resolve it into runtime form
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if self.store.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }

        let bind = self
            .server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidBind {
                addr: self.server.bind.clone(),
                reason: e.to_string(),
            })?;

        let self_peer =
            Peer::parse(&self.server.self_url).map_err(|e| ConfigError::InvalidSelfUrl {
                url: self.server.self_url.clone(),
                reason: e.to_string(),
            })?;

        let peer_source = self.peer_source()?;

        if self.peers.discovery_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "discovery_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.cache.peer_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "peer_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(ValidatedConfig {
            bind,
            self_peer,
            peer_source,
            discovery_interval: Duration::from_secs(self.peers.discovery_interval_secs),
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
            stats_interval: (self.cache.stats_interval_secs > 0)
                .then(|| Duration::from_secs(self.cache.stats_interval_secs)),
            store: self.store.clone(),
            group: GroupConfig {
                name: self.cache.group_name.clone(),
                cache_bytes: self.cache.cache_bytes,
                peer_timeout: Duration::from_secs(self.cache.peer_timeout_secs),
            },
        })
    }

    fn peer_source(&self) -> Result<PeerSource, ConfigError> {
        let static_peers: Vec<&str> = self
            .peers
            .static_peers
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        let srv = self
            .peers
            .srv_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (static_peers.is_empty(), srv) {
            (false, Some(_)) => Err(ConfigError::ConflictingPeerSources),
            (true, None) => Ok(PeerSource::Standalone),
            (true, Some(name)) => {
                validate_dns_name(name).map_err(|reason| ConfigError::InvalidSrvEndpoint {
                    name: name.to_string(),
                    reason,
                })?;
                Ok(PeerSource::Srv(name.to_string()))
            }
            (false, None) => {
                let peers = static_peers
                    .into_iter()
                    .map(|raw| {
                        Peer::parse(raw).map_err(|e| ConfigError::InvalidPeerUrl {
                            url: raw.to_string(),
                            reason: e.to_string(),
                        })
                    })
                    .collect::<Result<PeerSet, _>>()?;
                Ok(PeerSource::Static(peers))
            }
        }
    }
}

/// Split a comma-separated peer list, dropping empty entries
pub fn split_peer_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_dns_name(name: &str) -> Result<(), String> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return Err("name must be between 1 and 253 characters".to_string());
    }

    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("label {:?} must be between 1 and 63 characters", label));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("label {:?} contains invalid characters", label));
        }
    }
    Ok(())
}
