//! Override handler - administrator-driven suspension and reactivation.
//!
//! Overrides are the only path that writes `manual_status`. They run under
//! the tenant lock, so a concurrent scan either finishes before the override
//! or re-reads the record after it; the override is always the final state.
//!
//! An override whose target already holds is a no-op: no write, no
//! notification, cache untouched.

use crate::engine::LicenseEngine;
use crate::error::{Error, Result};
use chrono::Utc;
use tracing::{debug, info};
use warden_core::{evaluate, EffectiveState, License, LicenseStatus, ManualStatus, Reason};

impl LicenseEngine {
    /// Suspend a tenant immediately.
    pub async fn disable(&self, tenant_id: &str, actor_id: &str) -> Result<License> {
        let _guard = self.locks.lock(tenant_id).await;
        let now = Utc::now();

        let mut license = self.license_for_override(tenant_id).await?;
        if license.manual_status == ManualStatus::Suspended {
            debug!(tenant = %tenant_id, actor = %actor_id, "Already suspended");
            return Ok(license);
        }

        let usage = self.io(self.members.count_active(tenant_id)).await?;
        license.manual_status = ManualStatus::Suspended;
        license.stored_status = LicenseStatus::Suspended;
        license.usage_count = usage;
        license.updated_by = Some(actor_id.to_string());
        license.updated_at = now;
        self.io(self.licenses.put_license(&license)).await?;
        info!(tenant = %tenant_id, actor = %actor_id, "License suspended");

        let state = evaluate(&license, usage, now);
        let previous = self.cache.get(tenant_id).await;
        // An explicit action is always an edge
        self.dispatcher
            .dispatch(&license, previous.as_ref().map(|p| &p.state), &state, now)
            .await;
        self.cache.record(tenant_id, state, now).await;

        Ok(license)
    }

    /// Lift a manual suspension.
    ///
    /// The tenant falls back to whatever expiry and usage dictate. Only a
    /// tenant that comes back fully usable is announced as reactivated; one
    /// that is expired or full gets the ordinary notice for that state.
    pub async fn reactivate(&self, tenant_id: &str, actor_id: &str) -> Result<License> {
        let _guard = self.locks.lock(tenant_id).await;
        let now = Utc::now();

        let mut license = self.license_for_override(tenant_id).await?;
        if license.manual_status == ManualStatus::Active {
            debug!(tenant = %tenant_id, actor = %actor_id, "Not suspended");
            return Ok(license);
        }

        let usage = self.io(self.members.count_active(tenant_id)).await?;
        license.manual_status = ManualStatus::Active;
        license.usage_count = usage;
        let state = evaluate(&license, usage, now);

        license.stored_status = state.status;
        license.updated_by = Some(actor_id.to_string());
        license.updated_at = now;
        self.io(self.licenses.put_license(&license)).await?;
        info!(
            tenant = %tenant_id,
            actor = %actor_id,
            status = %state.status,
            reason = %state.reason,
            "License reactivated"
        );

        let previous = self.cache.get(tenant_id).await;
        let previous_state = previous.as_ref().map(|p| &p.state);
        if state.admits_new_members() {
            let announced = EffectiveState {
                reason: Reason::ManualReactivate,
                ..state
            };
            self.dispatcher
                .dispatch(&license, previous_state, &announced, now)
                .await;
        } else if previous_state != Some(&state) {
            self.dispatcher
                .dispatch(&license, previous_state, &state, now)
                .await;
        }
        // The cache holds evaluator output, so the next scan sees no edge
        self.cache.record(tenant_id, state, now).await;

        Ok(license)
    }

    /// Load the license an override applies to.
    ///
    /// A tenant the member registry knows but that holds no license cannot
    /// be overridden; a tenant nobody knows is simply not found.
    async fn license_for_override(&self, tenant_id: &str) -> Result<License> {
        if let Some(license) = self.io(self.licenses.get_license(tenant_id)).await? {
            return Ok(license);
        }
        if self.io(self.members.knows_tenant(tenant_id)).await? {
            Err(Error::InvalidTransition(format!(
                "tenant {} has no license to override",
                tenant_id
            )))
        } else {
            Err(Error::NotFound(format!("tenant {}", tenant_id)))
        }
    }
}
