//! License record - one per tenant (college).

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Administrator-controlled flag, independent of time-based expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualStatus {
    #[default]
    Active,
    Suspended,
}

/// Effective license status, as computed or as last persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    #[default]
    Active,
    Expired,
    Suspended,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant's license.
///
/// `usage_count` and `stored_status` are denormalized caches: the member
/// registry owns the real usage and the evaluator owns the real status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    /// Tenant (college) identifier, also the notification room address
    pub tenant_id: String,

    /// Maximum permitted active members
    pub capacity: u32,

    /// Last reconciled count of active members
    #[serde(default)]
    pub usage_count: u32,

    /// Instant after which the license is expired
    pub expiry: DateTime<Utc>,

    /// Manual suspension flag
    #[serde(default)]
    pub manual_status: ManualStatus,

    /// Last persisted effective status
    #[serde(default)]
    pub stored_status: LicenseStatus,

    pub issued_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Actor behind the last administrative change
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl License {
    /// Create a new active license.
    pub fn new(
        tenant_id: impl Into<String>,
        capacity: u32,
        expiry: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let tenant_id = tenant_id.into();
        validate_tenant_id(&tenant_id)?;
        validate_capacity(capacity)?;

        Ok(Self {
            tenant_id,
            capacity,
            usage_count: 0,
            expiry,
            manual_status: ManualStatus::Active,
            stored_status: LicenseStatus::Active,
            issued_at: now,
            updated_at: now,
            updated_by: None,
        })
    }

    /// Renew capacity and expiry in place. Manual status is left untouched.
    pub fn renew(
        &mut self,
        capacity: u32,
        expiry: DateTime<Utc>,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        validate_capacity(capacity)?;
        self.capacity = capacity;
        self.expiry = expiry;
        self.updated_at = now;
        self.updated_by = actor;
        Ok(())
    }

    /// Whether the expiry lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry < now
    }

    pub fn is_suspended(&self) -> bool {
        self.manual_status == ManualStatus::Suspended
    }
}

/// Check that a tenant id is usable as a key segment and topic suffix.
///
/// Rejects blank ids and ids containing `:`, the separator of both the
/// `member:<tenant>:<member>` keys and the `tenant:<id>` topics.
pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.trim().is_empty() {
        return Err(Error::InvalidTenant("tenant id must not be empty".into()));
    }
    if tenant_id.contains(':') {
        return Err(Error::InvalidTenant(format!(
            "tenant id must not contain ':': {}",
            tenant_id
        )));
    }
    Ok(())
}

fn validate_capacity(capacity: u32) -> Result<()> {
    if capacity == 0 {
        return Err(Error::InvalidLicense("capacity must be positive".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_license_defaults() {
        let now = Utc::now();
        let license = License::new("college-a", 25, now + Duration::days(30), now).unwrap();
        assert_eq!(license.tenant_id, "college-a");
        assert_eq!(license.usage_count, 0);
        assert_eq!(license.manual_status, ManualStatus::Active);
        assert_eq!(license.stored_status, LicenseStatus::Active);
        assert!(!license.is_expired_at(now));
    }

    #[test]
    fn rejects_zero_capacity() {
        let now = Utc::now();
        let err = License::new("college-a", 0, now, now).unwrap_err();
        assert!(matches!(err, Error::InvalidLicense(_)));
    }

    #[test]
    fn rejects_blank_tenant() {
        let now = Utc::now();
        assert!(License::new("  ", 5, now, now).is_err());
    }

    #[test]
    fn rejects_topic_separator_in_tenant() {
        let now = Utc::now();
        assert!(matches!(
            License::new("tenant:x", 5, now, now),
            Err(Error::InvalidTenant(_))
        ));
    }

    #[test]
    fn renew_keeps_manual_status() {
        let now = Utc::now();
        let mut license = License::new("college-a", 5, now - Duration::days(1), now).unwrap();
        license.manual_status = ManualStatus::Suspended;

        license
            .renew(50, now + Duration::days(365), Some("root".into()), now)
            .unwrap();

        assert_eq!(license.capacity, 50);
        assert!(!license.is_expired_at(now));
        assert!(license.is_suspended());
        assert_eq!(license.updated_by.as_deref(), Some("root"));
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let json = r#"{
            "tenant_id": "college-b",
            "capacity": 3,
            "expiry": "2030-01-01T00:00:00Z",
            "issued_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let license: License = serde_json::from_str(json).unwrap();
        assert_eq!(license.usage_count, 0);
        assert_eq!(license.manual_status, ManualStatus::Active);
        assert_eq!(license.stored_status, LicenseStatus::Active);
        assert!(license.updated_by.is_none());
    }
}
