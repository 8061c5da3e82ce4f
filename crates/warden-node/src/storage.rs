//! Persistent storage using RocksDB.
//!
//! Key layout:
//!
//! ```text
//! license:{tenant}            → License (JSON)
//! member:{tenant}:{member}    → Member  (JSON)
//! ```

use crate::error::Result;
use crate::store::{LicenseStore, MemberRegistry};
use async_trait::async_trait;
use rocksdb::{Options, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use warden_core::{validate_tenant_id, License, Member};

/// Storage backend for Warden data.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        let mut items = Vec::new();

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                items.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(items)
    }

    fn license_key(tenant_id: &str) -> String {
        format!("license:{}", tenant_id)
    }

    fn member_prefix(tenant_id: &str) -> String {
        format!("member:{}:", tenant_id)
    }

    fn member_key(tenant_id: &str, member_id: &str) -> String {
        format!("member:{}:{}", tenant_id, member_id)
    }
}

// --- Licenses ---

#[async_trait]
impl LicenseStore for Storage {
    async fn get_license(&self, tenant_id: &str) -> Result<Option<License>> {
        match self.db.get(Self::license_key(tenant_id).as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn put_license(&self, license: &License) -> Result<()> {
        let value = serde_json::to_vec(license)?;
        self.db
            .put(Self::license_key(&license.tenant_id).as_bytes(), value)?;
        Ok(())
    }

    async fn delete_license(&self, tenant_id: &str) -> Result<bool> {
        let key = Self::license_key(tenant_id);
        let existed = self.db.get(key.as_bytes())?.is_some();
        if existed {
            self.db.delete(key.as_bytes())?;
        }
        Ok(existed)
    }

    async fn list_licenses(&self) -> Result<Vec<License>> {
        self.scan(b"license:")
    }
}

// --- Members ---

#[async_trait]
impl MemberRegistry for Storage {
    async fn list_members(&self, tenant_id: &str) -> Result<Vec<Member>> {
        validate_tenant_id(tenant_id)?;
        self.scan(Self::member_prefix(tenant_id).as_bytes())
    }

    async fn upsert_member(&self, member: &Member) -> Result<()> {
        member.validate()?;
        let key = Self::member_key(&member.tenant_id, &member.member_id);
        let value = serde_json::to_vec(member)?;
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    async fn remove_member(&self, tenant_id: &str, member_id: &str) -> Result<bool> {
        validate_tenant_id(tenant_id)?;
        let key = Self::member_key(tenant_id, member_id);
        let existed = self.db.get(key.as_bytes())?.is_some();
        if existed {
            self.db.delete(key.as_bytes())?;
        }
        Ok(existed)
    }
}
