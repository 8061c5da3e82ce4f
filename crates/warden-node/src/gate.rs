//! Access gate - synchronous allow/deny for request-handling code.
//!
//! Every check re-reads the license store and the member registry and runs
//! the evaluator again. The transition cache is deliberately out of reach:
//! it can trail reality by a full scan interval, the gate must not.

use crate::error::{Error, Result};
use crate::store::{LicenseStore, MemberRegistry};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use warden_core::{evaluate, AccessDecision, License};

#[derive(Clone)]
pub struct AccessGate {
    licenses: Arc<dyn LicenseStore>,
    members: Arc<dyn MemberRegistry>,
    store_timeout: Duration,
}

impl AccessGate {
    pub fn new(
        licenses: Arc<dyn LicenseStore>,
        members: Arc<dyn MemberRegistry>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            licenses,
            members,
            store_timeout,
        }
    }

    /// May a request for `tenant_id` proceed?
    ///
    /// Set `requires_capacity` for operations that add members; those are
    /// denied with `limit_reached` once the tenant is full.
    pub async fn check_access(
        &self,
        tenant_id: &str,
        requires_capacity: bool,
    ) -> Result<AccessDecision> {
        let (license, usage) = self.load(tenant_id).await?;
        let state = evaluate(&license, usage, Utc::now());
        let decision = AccessDecision::decide(&state, requires_capacity);

        if !decision.allowed {
            debug!(
                tenant = %tenant_id,
                reason = %decision.reason,
                requires_capacity,
                "Access denied"
            );
        }
        Ok(decision)
    }

    /// Fetch the license and the live usage count.
    pub(crate) async fn load(&self, tenant_id: &str) -> Result<(License, u32)> {
        let license = tokio::time::timeout(self.store_timeout, self.licenses.get_license(tenant_id))
            .await??
            .ok_or_else(|| Error::NotFound(format!("license for tenant {}", tenant_id)))?;
        let usage =
            tokio::time::timeout(self.store_timeout, self.members.count_active(tenant_id)).await??;
        Ok((license, usage))
    }
}
