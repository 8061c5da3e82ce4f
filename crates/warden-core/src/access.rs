//! Access decisions derived from an effective state.

use crate::license::LicenseStatus;
use crate::state::{EffectiveState, Reason};
use serde::{Deserialize, Serialize};

/// Outcome of an access check.
///
/// Denials always carry a non-`none` reason so callers can render a specific
/// message without matching on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: Reason,
}

impl AccessDecision {
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: Reason::None,
        }
    }

    pub const fn deny(reason: Reason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    /// Decide from a freshly evaluated state.
    ///
    /// `requires_capacity` is set for operations that grow membership (adding
    /// a student); those are refused once the limit is reached even though
    /// the license itself is still active.
    pub fn decide(state: &EffectiveState, requires_capacity: bool) -> Self {
        match state.status {
            LicenseStatus::Suspended => Self::deny(Reason::ManualSuspend),
            LicenseStatus::Expired => Self::deny(Reason::Expired),
            LicenseStatus::Active if requires_capacity && state.limit_reached => {
                Self::deny(Reason::LimitReached)
            }
            LicenseStatus::Active => Self::allow(),
        }
    }
}
