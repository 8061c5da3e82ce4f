//! Warden Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - One license engine with its watcher loop
//! - HTTP API and WebSocket push for clients
//! - Unix admin socket for local admin ops (warden-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::engine::{EngineConfig, LicenseEngine};
use crate::error::{Error, Result};
use crate::push::BroadcastChannel;
use crate::storage::Storage;
use crate::watcher::WatcherHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a Warden node.
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for warden-admin CLI)
    pub admin_socket: PathBuf,

    /// Watcher and store tuning
    pub engine: EngineConfig,
}

impl WardenConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir =
            PathBuf::from(var("WARDEN_DATA_DIR").unwrap_or_else(|| "./warden-data".to_string()));

        let api_addr = parse_var(&var, "WARDEN_API_ADDR", "0.0.0.0:8080")?;

        let admin_socket = var("WARDEN_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let scan_interval_secs: u64 = parse_var(&var, "WARDEN_SCAN_INTERVAL_SECS", "60")?;
        let store_timeout_ms: u64 = parse_var(&var, "WARDEN_STORE_TIMEOUT_MS", "5000")?;
        let scan_concurrency: usize = parse_var(&var, "WARDEN_SCAN_CONCURRENCY", "8")?;

        if scan_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "WARDEN_SCAN_INTERVAL_SECS must be at least 1".into(),
            ));
        }
        if scan_concurrency == 0 {
            return Err(Error::InvalidInput(
                "WARDEN_SCAN_CONCURRENCY must be at least 1".into(),
            ));
        }

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            engine: EngineConfig {
                scan_interval: Duration::from_secs(scan_interval_secs),
                store_timeout: Duration::from_millis(store_timeout_ms),
                scan_concurrency,
            },
        })
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T> {
    let raw = var(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("Invalid {}: {}", key, raw)))
}

/// Shared state for API handlers.
pub struct NodeState {
    pub engine: Arc<LicenseEngine>,
    pub watcher: WatcherHandle,
    pub push: BroadcastChannel,
}

pub type AppState = Arc<NodeState>;

impl NodeState {
    /// Wrap an engine, starting its watcher if it is not running yet.
    ///
    /// `push` must be the channel the engine publishes to, so WebSocket
    /// clients see its events.
    pub fn new(engine: Arc<LicenseEngine>, push: BroadcastChannel) -> Self {
        let watcher = engine.initialize_watcher();
        Self {
            engine,
            watcher,
            push,
        }
    }
}

/// A Warden node instance.
pub struct WardenNode {
    state: AppState,
    config: WardenConfig,
}

impl WardenNode {
    /// Create a new Warden node. Starts the watcher.
    pub async fn new(config: WardenConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        // Open single shared storage instance
        let storage = Arc::new(Storage::open(&config.data_dir)?);

        let push = BroadcastChannel::default();
        let engine = Arc::new(LicenseEngine::with_store(
            storage,
            Arc::new(push.clone()),
            config.engine.clone(),
        ));
        let state = Arc::new(NodeState::new(engine, push));

        Ok(Self { state, config })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> AppState {
        Arc::clone(&self.state)
    }

    /// Handle to the running watcher.
    pub fn watcher(&self) -> WatcherHandle {
        self.state.watcher.clone()
    }

    /// Run the node (starts HTTP server and admin socket).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Warden node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);
        tracing::info!("  Scan interval: {:?}", self.config.engine.scan_interval);

        // Start admin socket server in background
        let admin_socket = AdminSocket::new(
            self.watcher(),
            self.config
                .admin_socket
                .to_str()
                .unwrap_or("./warden-data/admin.sock"),
        );
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Build HTTP API
        let app = api::build_router(self.state());

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        let watcher = self.watcher();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        watcher.stop();
        served?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
