//! Warden - License Lifecycle & Real-Time Enforcement
//!
//! Keeps every tenant's license status current without anyone asking:
//! a watcher loop re-evaluates licenses on a fixed cadence, detects state
//! edges, persists the derived status and pushes notifications to the
//! affected audiences. An access gate answers allow/deny from fresh state.
//!
//! # Architecture
//!
//! - **Engine**: reconciliation, edge detection, license and member administration
//! - **Watcher**: the periodic loop and its [`WatcherHandle`]
//! - **Overrides**: administrator suspend / reactivate
//! - **Dispatcher**: audience resolution and push publishing
//! - **Gate**: allow/deny for request-handling code
//! - **Storage**: RocksDB-backed license store and member registry
//! - **API**: HTTP endpoints and WebSocket push
//! - **Admin Socket**: Unix socket for local admin commands (warden-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use warden_node::{WardenConfig, WardenNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WardenConfig::from_env()?;
//!     let node = WardenNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Embedding without RocksDB or HTTP:
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden_node::{EngineConfig, LicenseEngine, MemoryStore, RecordingChannel};
//!
//! # async fn demo() -> warden_node::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let push = Arc::new(RecordingChannel::new());
//! let engine = Arc::new(LicenseEngine::with_store(store, push, EngineConfig::default()));
//! let watcher = engine.initialize_watcher();
//!
//! let decision = engine.gate().check_access("college-a", true).await?;
//! watcher.stop();
//! # let _ = decision;
//! # Ok(())
//! # }
//! ```

pub mod admin_socket;
pub mod api;
pub mod cache;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod gate;
pub mod locks;
pub mod node;
pub mod overrides;
pub mod push;
pub mod storage;
pub mod store;
pub mod watcher;
pub mod ws;

pub use cache::{CacheEntry, TransitionCache};
pub use dispatcher::NotificationDispatcher;
pub use engine::{EngineConfig, LicenseEngine, LicenseStatusView, TenantOutcome, TickReport};
pub use error::{Error, Result};
pub use gate::AccessGate;
pub use node::{AppState, NodeState, WardenConfig, WardenNode};
pub use push::{BroadcastChannel, Envelope, PushChannel, RecordingChannel};
pub use storage::Storage;
pub use store::{LicenseStore, MemberRegistry, MemoryStore};
pub use watcher::WatcherHandle;
