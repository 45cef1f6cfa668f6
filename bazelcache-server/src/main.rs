use anyhow::{Context, Result};
use bazelcache_server::config::{LoggingConfig, StoreBackend, split_peer_list};
use bazelcache_server::membership::resolver_for;
use bazelcache_server::{
    AppState, BlobStore, CacheGroup, MembershipService, ObjectBlobStore, PeerSink, ServerConfig,
    create_router, spawn_stats_logger,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "bazelcache-server")]
#[command(about = "Bazel remote cache backed by object storage with a shared in-memory tier", long_about = None)]
struct Args {
    /// YAML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind to this socket
    #[arg(long)]
    bind: Option<String>,

    /// Valid base URL that points to this server, e.g. "http://example.net:8000"
    #[arg(long = "self")]
    self_url: Option<String>,

    /// Comma-separated list of peers' URLs
    #[arg(long)]
    peers: Option<String>,

    /// SRV record for peer discovery (e.g. a Kubernetes headless service)
    #[arg(long)]
    peer_srv_endpoint: Option<String>,

    /// Bucket holding cache objects
    #[arg(long)]
    bucket: Option<String>,

    /// Object store backend
    #[arg(long, value_parser = parse_backend)]
    store_backend: Option<StoreBackend>,

    /// S3 region
    #[arg(long)]
    region: Option<String>,

    /// S3 endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Bytes of memory for cached objects
    #[arg(long)]
    cache_bytes: Option<u64>,

    /// Timeout in seconds for a single fetch from a peer
    #[arg(long)]
    peer_timeout_secs: Option<u64>,

    /// Seconds between SRV lookups
    #[arg(long)]
    discovery_interval_secs: Option<u64>,

    /// Seconds between stats log lines (0 disables)
    #[arg(long)]
    stats_interval_secs: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: text or json
    #[arg(long)]
    log_format: Option<String>,
}

fn parse_backend(raw: &str) -> std::result::Result<StoreBackend, String> {
    match raw {
        "s3" => Ok(StoreBackend::S3),
        "file" => Ok(StoreBackend::File),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(format!("unknown store backend {:?} (s3, file, memory)", other)),
    }
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(self_url) = self.self_url {
            config.server.self_url = self_url;
        }
        if let Some(peers) = self.peers {
            config.peers.static_peers = split_peer_list(&peers);
        }
        if let Some(srv) = self.peer_srv_endpoint {
            config.peers.srv_endpoint = Some(srv);
        }
        if let Some(bucket) = self.bucket {
            config.store.bucket = bucket;
        }
        if let Some(backend) = self.store_backend {
            config.store.backend = backend;
        }
        if let Some(region) = self.region {
            config.store.region = region;
        }
        if let Some(endpoint) = self.endpoint {
            config.store.endpoint = Some(endpoint);
        }
        if let Some(bytes) = self.cache_bytes {
            config.cache.cache_bytes = bytes;
        }
        if let Some(secs) = self.peer_timeout_secs {
            config.cache.peer_timeout_secs = secs;
        }
        if let Some(secs) = self.discovery_interval_secs {
            config.peers.discovery_interval_secs = secs;
        }
        if let Some(secs) = self.stats_interval_secs {
            config.cache.stats_interval_secs = secs;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.server.request_timeout_secs = secs;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    args.apply(&mut config);

    init_tracing(&config.logging);
    info!("Starting Bazelcache Server v{}", env!("CARGO_PKG_VERSION"));

    // Bad configuration never reaches the listener
    let validated = match config.validate() {
        Ok(validated) => validated,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn BlobStore> = Arc::new(
        ObjectBlobStore::from_config(&validated.store).context("creating object store")?,
    );
    let group = CacheGroup::new(
        validated.group.clone(),
        validated.self_peer.clone(),
        Arc::clone(&store),
    )?;

    if let Some(every) = validated.stats_interval {
        spawn_stats_logger(group.clone(), every);
    }

    // Peers: initial set before serving, then keep it current
    let resolver = match resolver_for(&validated.peer_source, &validated.self_peer) {
        Ok(resolver) => resolver,
        Err(e) => {
            error!("Peer resolution cannot start: {}", e);
            std::process::exit(1);
        }
    };
    let sink: Arc<dyn PeerSink> = Arc::new(group.clone());
    let mut membership = MembershipService::new(resolver, sink, validated.discovery_interval);
    if let Err(e) = membership.poll_once().await {
        error!("Peer resolution failed: {}", e);
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let membership = membership.spawn(shutdown_rx);
    tokio::spawn(async move {
        match membership.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Peer resolution has died: {}", e);
                std::process::exit(1);
            }
            Err(e) => {
                error!("Peer resolution task panicked: {}", e);
                std::process::exit(1);
            }
        }
    });

    let app = create_router(AppState { group, store }, validated.request_timeout);

    info!("Listening on {} as {}", validated.bind, validated.self_peer);
    let listener = tokio::net::TcpListener::bind(validated.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
