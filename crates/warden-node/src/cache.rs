//! Transition cache - last-known effective state per tenant.
//!
//! Only the watcher, `force_check` and the override handler write here. The
//! access gate never reads it: an entry can lag reality by up to one scan
//! interval.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use warden_core::EffectiveState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub state: EffectiveState,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TransitionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TransitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, tenant_id: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(tenant_id).copied()
    }

    /// Whether `state` is an edge for this tenant: a cache miss, or any of
    /// status, reason or limit flag differing from the cached entry.
    pub async fn is_edge(&self, tenant_id: &str, state: &EffectiveState) -> bool {
        match self.entries.read().await.get(tenant_id) {
            Some(entry) => entry.state != *state,
            None => true,
        }
    }

    /// Overwrite the entry, returning the previous one.
    pub async fn record(
        &self,
        tenant_id: &str,
        state: EffectiveState,
        observed_at: DateTime<Utc>,
    ) -> Option<CacheEntry> {
        self.entries
            .write()
            .await
            .insert(tenant_id.to_string(), CacheEntry { state, observed_at })
    }

    /// Drop a tenant whose license was deleted.
    pub async fn remove(&self, tenant_id: &str) -> Option<CacheEntry> {
        self.entries.write().await.remove(tenant_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
