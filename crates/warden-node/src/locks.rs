//! Per-tenant serialization of read-modify-write cycles.
//!
//! The watcher's reconciliation and an administrator's override both rewrite
//! the same license record. Holding the tenant's lock across
//! read → evaluate → write keeps a scan from overwriting a concurrent
//! suspension with a stale `manual_status`. Different tenants never contend.
//!
//! Slots live only while someone holds or waits for them: the last guard to
//! release a slot removes it, so unknown tenant ids leave nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
pub struct TenantLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one tenant.
    pub async fn lock(&self, tenant_id: &str) -> TenantGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(tenant_id.to_string()).or_default())
        };
        let held = Arc::clone(&slot).lock_owned().await;
        TenantGuard {
            locks: self,
            tenant_id: tenant_id.to_string(),
            slot,
            held: Some(held),
        }
    }

    /// Number of tenants currently locked or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one tenant until dropped.
#[derive(Debug)]
pub struct TenantGuard<'a> {
    locks: &'a TenantLocks,
    tenant_id: String,
    slot: Slot,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for TenantGuard<'_> {
    fn drop(&mut self) {
        // Release the slot's own clone before counting owners.
        self.held.take();

        let mut slots = self.locks.slots.lock().unwrap_or_else(|e| e.into_inner());
        let unused = match slots.get(&self.tenant_id) {
            // The map and this guard are the only owners; no one is waiting.
            Some(current) => Arc::ptr_eq(current, &self.slot) && Arc::strong_count(&self.slot) == 2,
            None => false,
        };
        if unused {
            slots.remove(&self.tenant_id);
        }
    }
}
