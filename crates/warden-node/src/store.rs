//! Store seams: the license store and the member registry.
//!
//! Both are external collaborators of the engine. [`crate::Storage`] backs
//! them with RocksDB; [`MemoryStore`] keeps everything in process for
//! embedding and tests.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use warden_core::{License, LicenseStatus, Member};

/// Durable license records keyed by tenant.
///
/// The field-level setters are read-modify-write on a single record; callers
/// serialize them per tenant.
#[async_trait]
pub trait LicenseStore: Send + Sync + 'static {
    async fn get_license(&self, tenant_id: &str) -> Result<Option<License>>;

    /// Insert or replace a license.
    async fn put_license(&self, license: &License) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete_license(&self, tenant_id: &str) -> Result<bool>;

    async fn list_licenses(&self) -> Result<Vec<License>>;

    /// Tenant ids that hold a license.
    async fn list_tenants(&self) -> Result<Vec<String>> {
        Ok(self
            .list_licenses()
            .await?
            .into_iter()
            .map(|l| l.tenant_id)
            .collect())
    }

    async fn set_usage_count(&self, tenant_id: &str, usage_count: u32) -> Result<()> {
        let mut license = self.require(tenant_id).await?;
        license.usage_count = usage_count;
        self.put_license(&license).await
    }

    async fn set_stored_status(&self, tenant_id: &str, status: LicenseStatus) -> Result<()> {
        let mut license = self.require(tenant_id).await?;
        license.stored_status = status;
        self.put_license(&license).await
    }

    async fn require(&self, tenant_id: &str) -> Result<License> {
        self.get_license(tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("license for tenant {}", tenant_id)))
    }
}

/// Member registry - the source of truth for live usage.
#[async_trait]
pub trait MemberRegistry: Send + Sync + 'static {
    async fn list_members(&self, tenant_id: &str) -> Result<Vec<Member>>;

    async fn upsert_member(&self, member: &Member) -> Result<()>;

    /// Returns whether a member was removed.
    async fn remove_member(&self, tenant_id: &str, member_id: &str) -> Result<bool>;

    /// Live count of active members.
    async fn count_active(&self, tenant_id: &str) -> Result<u32> {
        let active = self
            .list_members(tenant_id)
            .await?
            .iter()
            .filter(|m| m.active)
            .count();
        Ok(u32::try_from(active).unwrap_or(u32::MAX))
    }

    /// Member ids of the tenant's active administrators.
    async fn tenant_admins(&self, tenant_id: &str) -> Result<Vec<String>> {
        Ok(self
            .list_members(tenant_id)
            .await?
            .into_iter()
            .filter(|m| m.active && m.is_admin())
            .map(|m| m.member_id)
            .collect())
    }

    /// Whether the registry has ever seen this tenant.
    async fn knows_tenant(&self, tenant_id: &str) -> Result<bool> {
        Ok(!self.list_members(tenant_id).await?.is_empty())
    }
}

/// In-process store implementing both seams.
#[derive(Debug, Default)]
pub struct MemoryStore {
    licenses: RwLock<HashMap<String, License>>,
    members: RwLock<HashMap<String, HashMap<String, Member>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LicenseStore for MemoryStore {
    async fn get_license(&self, tenant_id: &str) -> Result<Option<License>> {
        Ok(self.licenses.read().await.get(tenant_id).cloned())
    }

    async fn put_license(&self, license: &License) -> Result<()> {
        self.licenses
            .write()
            .await
            .insert(license.tenant_id.clone(), license.clone());
        Ok(())
    }

    async fn delete_license(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.licenses.write().await.remove(tenant_id).is_some())
    }

    async fn list_licenses(&self) -> Result<Vec<License>> {
        let mut licenses: Vec<License> = self.licenses.read().await.values().cloned().collect();
        licenses.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(licenses)
    }
}

#[async_trait]
impl MemberRegistry for MemoryStore {
    async fn list_members(&self, tenant_id: &str) -> Result<Vec<Member>> {
        let members = self.members.read().await;
        let mut list: Vec<Member> = members
            .get(tenant_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.member_id.cmp(&b.member_id));
        Ok(list)
    }

    async fn upsert_member(&self, member: &Member) -> Result<()> {
        self.members
            .write()
            .await
            .entry(member.tenant_id.clone())
            .or_default()
            .insert(member.member_id.clone(), member.clone());
        Ok(())
    }

    async fn remove_member(&self, tenant_id: &str, member_id: &str) -> Result<bool> {
        let mut members = self.members.write().await;
        Ok(members
            .get_mut(tenant_id)
            .map(|m| m.remove(member_id).is_some())
            .unwrap_or(false))
    }
}
