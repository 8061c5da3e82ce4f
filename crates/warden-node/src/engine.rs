//! License engine - reconciliation, edge detection and administration.
//!
//! ```text
//!            ┌────────────┐  count_active   ┌─────────────────┐
//!  tick ───→ │  Engine    │ ──────────────→ │ MemberRegistry  │
//!  force ──→ │            │ ←─ licenses ──→ │ LicenseStore    │
//!  override→ │  cache     │                 └─────────────────┘
//!            │  locks     │ ── on edge ───→ Dispatcher ──→ PushChannel
//!            └────────────┘
//!
//!  gate ───→ AccessGate (store + registry only, no cache, no dispatch)
//! ```

use crate::cache::{CacheEntry, TransitionCache};
use crate::dispatcher::NotificationDispatcher;
use crate::error::{Error, Result};
use crate::gate::AccessGate;
use crate::locks::TenantLocks;
use crate::push::PushChannel;
use crate::store::{LicenseStore, MemberRegistry};
use crate::watcher::WatcherState;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use warden_core::{
    evaluate, validate_tenant_id, EffectiveState, License, LicenseStatus, ManualStatus, Member,
    Reason,
};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Watcher cadence
    pub scan_interval: Duration,

    /// Upper bound on any single store call
    pub store_timeout: Duration,

    /// Tenants evaluated concurrently within one tick
    pub scan_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            store_timeout: Duration::from_secs(5),
            scan_concurrency: 8,
        }
    }
}

/// Result of one per-tenant reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantOutcome {
    pub state: EffectiveState,
    pub usage_count: u32,
    /// Whether the state differed from the cache and was dispatched
    pub edge: bool,
}

/// Summary of one watcher tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tenants: usize,
    pub edges: usize,
    pub failures: usize,
}

/// Status view for administrators. Derived fresh, like the gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatusView {
    pub tenant_id: String,
    pub status: LicenseStatus,
    pub reason: Reason,
    pub limit_reached: bool,
    pub capacity: u32,
    pub usage_count: u32,
    pub expiry: DateTime<Utc>,
    pub manual_status: ManualStatus,
    pub stored_status: LicenseStatus,
    pub evaluated_at: DateTime<Utc>,
    /// What the watcher last observed, possibly one interval old
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observed: Option<EffectiveState>,
}

/// The license lifecycle engine.
pub struct LicenseEngine {
    pub(crate) licenses: Arc<dyn LicenseStore>,
    pub(crate) members: Arc<dyn MemberRegistry>,
    pub(crate) dispatcher: NotificationDispatcher,
    pub(crate) cache: TransitionCache,
    pub(crate) locks: TenantLocks,
    pub(crate) gate: AccessGate,
    pub(crate) config: EngineConfig,
    pub(crate) watcher: OnceLock<Arc<WatcherState>>,
}

impl LicenseEngine {
    pub fn new(
        licenses: Arc<dyn LicenseStore>,
        members: Arc<dyn MemberRegistry>,
        push: Arc<dyn PushChannel>,
        config: EngineConfig,
    ) -> Self {
        let gate = AccessGate::new(
            Arc::clone(&licenses),
            Arc::clone(&members),
            config.store_timeout,
        );
        let dispatcher = NotificationDispatcher::new(push, Arc::clone(&members))
            .with_store_timeout(config.store_timeout);

        Self {
            licenses,
            members,
            dispatcher,
            cache: TransitionCache::new(),
            locks: TenantLocks::new(),
            gate,
            config,
            watcher: OnceLock::new(),
        }
    }

    /// Build an engine whose store also serves as the member registry.
    pub fn with_store<S>(store: Arc<S>, push: Arc<dyn PushChannel>, config: EngineConfig) -> Self
    where
        S: LicenseStore + MemberRegistry,
    {
        let licenses: Arc<dyn LicenseStore> = store.clone();
        let members: Arc<dyn MemberRegistry> = store;
        Self::new(licenses, members, push, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The access gate. Cloneable and independent of the cache.
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn cache(&self) -> &TransitionCache {
        &self.cache
    }

    /// Bound a store call by the configured timeout.
    pub(crate) async fn io<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.store_timeout, call).await?
    }

    // --- Watcher steps ---

    /// Re-evaluate every tenant once.
    ///
    /// Tenants are processed concurrently up to `scan_concurrency`; a failure
    /// or panic on one tenant is logged and counted, never propagated. Only
    /// failing to list tenants fails the tick.
    pub async fn run_tick(&self) -> Result<TickReport> {
        let tenants = self.io(self.licenses.list_tenants()).await?;
        let mut report = TickReport {
            tenants: tenants.len(),
            ..TickReport::default()
        };

        let results: Vec<(String, std::thread::Result<Result<TenantOutcome>>)> =
            stream::iter(tenants)
                .map(|tenant_id| async move {
                    let outcome = AssertUnwindSafe(self.reconcile_tenant(&tenant_id))
                        .catch_unwind()
                        .await;
                    (tenant_id, outcome)
                })
                .buffer_unordered(self.config.scan_concurrency.max(1))
                .collect()
                .await;

        for (tenant_id, outcome) in results {
            match outcome {
                Ok(Ok(outcome)) if outcome.edge => report.edges += 1,
                Ok(Ok(_)) => {}
                Ok(Err(Error::NotFound(_))) => {
                    // Revoked between listing and evaluation
                    debug!(tenant = %tenant_id, "License vanished during scan");
                }
                Ok(Err(e)) if e.is_transient() => {
                    report.failures += 1;
                    warn!(tenant = %tenant_id, "Skipping tenant this tick: {}", e);
                }
                Ok(Err(e)) => {
                    report.failures += 1;
                    error!(tenant = %tenant_id, "Tenant reconciliation failed: {}", e);
                }
                Err(_) => {
                    report.failures += 1;
                    error!(tenant = %tenant_id, "Tenant reconciliation panicked");
                }
            }
        }

        debug!(
            tenants = report.tenants,
            edges = report.edges,
            failures = report.failures,
            "Watcher tick complete"
        );
        Ok(report)
    }

    /// Reconcile one tenant: write back live usage, correct the stored
    /// status, and dispatch if the effective state is an edge.
    pub async fn reconcile_tenant(&self, tenant_id: &str) -> Result<TenantOutcome> {
        let _guard = self.locks.lock(tenant_id).await;
        let now = Utc::now();

        let usage = self.io(self.members.count_active(tenant_id)).await?;
        let mut license = self.io(self.licenses.require(tenant_id)).await?;

        self.io(self.licenses.set_usage_count(tenant_id, usage)).await?;
        license.usage_count = usage;

        let state = evaluate(&license, usage, now);

        if let Some(status) = stored_status_correction(license.stored_status, state.status) {
            self.io(self.licenses.set_stored_status(tenant_id, status))
                .await?;
            info!(
                tenant = %tenant_id,
                from = %license.stored_status,
                to = %status,
                "Persisted license status"
            );
            license.stored_status = status;
        }

        let edge = self.cache.is_edge(tenant_id, &state).await;
        if edge {
            let previous = self.cache.get(tenant_id).await;
            self.publish_edge(&license, previous, &state, now).await;
        } else {
            debug!(tenant = %tenant_id, status = %state.status, "No change");
        }

        Ok(TenantOutcome {
            state,
            usage_count: usage,
            edge,
        })
    }

    /// One immediate evaluate-and-dispatch cycle outside the tick cadence.
    ///
    /// Code paths that change membership call this right after the change so
    /// limit transitions are not delayed until the next scan.
    pub async fn force_check(&self, tenant_id: &str) -> Result<EffectiveState> {
        let outcome = self.reconcile_tenant(tenant_id).await?;
        info!(tenant = %tenant_id, status = %outcome.state.status, reason = %outcome.state.reason, "Forced license check");
        Ok(outcome.state)
    }

    pub(crate) async fn publish_edge(
        &self,
        license: &License,
        previous: Option<CacheEntry>,
        state: &EffectiveState,
        now: DateTime<Utc>,
    ) {
        info!(
            tenant = %license.tenant_id,
            status = %state.status,
            reason = %state.reason,
            limit_reached = state.limit_reached,
            "License transition"
        );
        self.dispatcher
            .dispatch(license, previous.as_ref().map(|p| &p.state), state, now)
            .await;
        self.cache.record(&license.tenant_id, *state, now).await;
    }

    // --- Administrative surface ---

    /// Fresh status view for one tenant.
    pub async fn license_status(&self, tenant_id: &str) -> Result<LicenseStatusView> {
        let now = Utc::now();
        let (license, usage) = self.gate.load(tenant_id).await?;
        let state = evaluate(&license, usage, now);
        let last_observed = self.cache.get(tenant_id).await.map(|e| e.state);

        Ok(LicenseStatusView {
            tenant_id: license.tenant_id,
            status: state.status,
            reason: state.reason,
            limit_reached: state.limit_reached,
            capacity: license.capacity,
            usage_count: usage,
            expiry: license.expiry,
            manual_status: license.manual_status,
            stored_status: license.stored_status,
            evaluated_at: now,
            last_observed,
        })
    }

    pub async fn list_licenses(&self) -> Result<Vec<License>> {
        self.io(self.licenses.list_licenses()).await
    }

    /// Issue a license, or renew capacity and expiry of an existing one.
    ///
    /// Renewal preserves the manual status; a suspended tenant stays
    /// suspended. The tenant is re-checked immediately afterwards.
    pub async fn issue_license(
        &self,
        tenant_id: &str,
        capacity: u32,
        expiry: DateTime<Utc>,
        actor_id: &str,
    ) -> Result<License> {
        {
            let _guard = self.locks.lock(tenant_id).await;
            let now = Utc::now();

            let license = match self.io(self.licenses.get_license(tenant_id)).await? {
                Some(mut existing) => {
                    existing.renew(capacity, expiry, Some(actor_id.to_string()), now)?;
                    existing
                }
                None => {
                    let mut license = License::new(tenant_id, capacity, expiry, now)?;
                    license.updated_by = Some(actor_id.to_string());
                    license
                }
            };
            self.io(self.licenses.put_license(&license)).await?;
            info!(tenant = %tenant_id, capacity, expiry = %expiry, actor = %actor_id, "License issued");
        }

        self.force_check(tenant_id).await?;
        self.io(self.licenses.require(tenant_id)).await
    }

    /// Delete a tenant's license and forget its cache entry.
    pub async fn revoke_license(&self, tenant_id: &str, actor_id: &str) -> Result<()> {
        let _guard = self.locks.lock(tenant_id).await;
        if !self.io(self.licenses.delete_license(tenant_id)).await? {
            return Err(Error::NotFound(format!("license for tenant {}", tenant_id)));
        }
        self.cache.remove(tenant_id).await;
        info!(tenant = %tenant_id, actor = %actor_id, "License revoked");
        Ok(())
    }

    /// Add or update a member, then re-check the tenant.
    ///
    /// Returns the tenant's new state, or `None` when it holds no license yet.
    pub async fn upsert_member(&self, member: &Member) -> Result<Option<EffectiveState>> {
        member.validate()?;
        self.io(self.members.upsert_member(member)).await?;
        debug!(tenant = %member.tenant_id, member = %member.member_id, "Member upserted");
        self.recheck_after_membership_change(&member.tenant_id).await
    }

    /// Remove a member, then re-check the tenant.
    pub async fn remove_member(
        &self,
        tenant_id: &str,
        member_id: &str,
    ) -> Result<Option<EffectiveState>> {
        validate_tenant_id(tenant_id)?;
        if !self.io(self.members.remove_member(tenant_id, member_id)).await? {
            return Err(Error::NotFound(format!(
                "member {} of tenant {}",
                member_id, tenant_id
            )));
        }
        debug!(tenant = %tenant_id, member = %member_id, "Member removed");
        self.recheck_after_membership_change(tenant_id).await
    }

    async fn recheck_after_membership_change(
        &self,
        tenant_id: &str,
    ) -> Result<Option<EffectiveState>> {
        match self.force_check(tenant_id).await {
            Ok(state) => Ok(Some(state)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Stored-status write the watcher is allowed to make, if any.
///
/// The watcher persists entering `Expired` and corrects a stale `Expired`
/// once the expiry has moved forward. It never writes `Suspended`; that is
/// the override handler's job. A stored `Suspended` left behind while the
/// manual status is already `Active` is corrected to the computed status.
fn stored_status_correction(stored: LicenseStatus, computed: LicenseStatus) -> Option<LicenseStatus> {
    match (stored, computed) {
        (LicenseStatus::Expired, LicenseStatus::Expired) => None,
        (_, LicenseStatus::Expired) => Some(LicenseStatus::Expired),
        (LicenseStatus::Expired | LicenseStatus::Suspended, LicenseStatus::Active) => {
            Some(LicenseStatus::Active)
        }
        _ => None,
    }
}
