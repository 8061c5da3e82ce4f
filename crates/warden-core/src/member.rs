//! Member registry record.

use crate::error::{Error, Result};
use crate::license::validate_tenant_id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    #[default]
    Student,
    /// College administrator
    Admin,
}

/// A tenant member. Only active members count against license capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Member {
    /// Create an active student.
    pub fn student(tenant_id: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            tenant_id: tenant_id.into(),
            role: MemberRole::Student,
            active: true,
        }
    }

    /// Create an active college administrator.
    pub fn admin(tenant_id: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self {
            role: MemberRole::Admin,
            ..Self::student(tenant_id, member_id)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == MemberRole::Admin
    }

    /// Reject records whose ids would bleed into another tenant's keys.
    pub fn validate(&self) -> Result<()> {
        validate_tenant_id(&self.tenant_id)?;
        if self.member_id.trim().is_empty() {
            return Err(Error::InvalidMember("member id must not be empty".into()));
        }
        Ok(())
    }
}
