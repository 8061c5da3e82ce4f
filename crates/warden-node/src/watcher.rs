//! Watcher loop - periodic reconciliation of every tenant.
//!
//! Started once per engine through [`LicenseEngine::initialize_watcher`].
//! The returned [`WatcherHandle`] is owned by the process bootstrap and
//! handed to whatever needs `force_check`; there is no global instance.

use crate::engine::LicenseEngine;
use crate::error::Result;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use warden_core::EffectiveState;

/// Per-engine loop bookkeeping.
#[derive(Debug, Default)]
pub struct WatcherState {
    ticks: AtomicU64,
    task: OnceLock<AbortHandle>,
}

/// Handle to the running watcher.
#[derive(Clone)]
pub struct WatcherHandle {
    engine: Arc<LicenseEngine>,
    state: Arc<WatcherState>,
}

impl WatcherHandle {
    /// Immediate evaluate-and-dispatch for one tenant.
    pub async fn force_check(&self, tenant_id: &str) -> Result<EffectiveState> {
        self.engine.force_check(tenant_id).await
    }

    /// Ticks completed so far, successful or not.
    pub fn ticks(&self) -> u64 {
        self.state.ticks.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.state
            .task
            .get()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop at process shutdown. An in-flight tick is dropped.
    pub fn stop(&self) {
        if let Some(task) = self.state.task.get() {
            task.abort();
            info!("License watcher stopped");
        }
    }

    pub fn engine(&self) -> &Arc<LicenseEngine> {
        &self.engine
    }

    /// Whether two handles drive the same loop.
    pub fn same_loop(&self, other: &WatcherHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl LicenseEngine {
    /// Start the watcher loop, or return the running one.
    ///
    /// Must be called from within a tokio runtime. The first tick runs
    /// immediately, later ticks every `scan_interval`.
    pub fn initialize_watcher(self: &Arc<Self>) -> WatcherHandle {
        let state = self.watcher.get_or_init(|| {
            let state = Arc::new(WatcherState::default());
            let task = tokio::spawn(run(Arc::clone(self), Arc::clone(&state)));
            // Freshly created, so this cannot already be set
            let _ = state.task.set(task.abort_handle());
            info!(
                interval_secs = self.config.scan_interval.as_secs_f64(),
                "License watcher started"
            );
            state
        });

        WatcherHandle {
            engine: Arc::clone(self),
            state: Arc::clone(state),
        }
    }
}

async fn run(engine: Arc<LicenseEngine>, state: Arc<WatcherState>) {
    let mut interval = tokio::time::interval(engine.config.scan_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match AssertUnwindSafe(engine.run_tick()).catch_unwind().await {
            Ok(Ok(report)) => {
                if report.failures > 0 {
                    warn!(
                        tenants = report.tenants,
                        failures = report.failures,
                        "Watcher tick completed with failures"
                    );
                } else {
                    debug!(tenants = report.tenants, edges = report.edges, "Watcher tick");
                }
            }
            Ok(Err(e)) => error!("Watcher tick failed, retrying next interval: {}", e),
            Err(_) => error!("Watcher tick panicked, retrying next interval"),
        }

        state.ticks.fetch_add(1, Ordering::AcqRel);
    }
}
