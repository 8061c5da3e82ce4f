//! State evaluation: license + live usage + clock → effective state.
//!
//! Decision order (first match wins):
//!
//! ```text
//! manual_status == Suspended  → Suspended / manual_suspend
//! expiry < now                → Expired   / expired
//! usage >= capacity           → Active    / limit_reached
//! otherwise                   → Active    / none
//! ```
//!
//! Manual suspension is sticky: only a reactivation clears it. Expiry and the
//! capacity limit are level-triggered and recomputed from inputs on every call.

use crate::license::{License, LicenseStatus, ManualStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable cause attached to an effective state or access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    #[default]
    None,
    Expired,
    LimitReached,
    ManualSuspend,
    /// Never produced by [`evaluate`]; only attached to reactivation notices.
    ManualReactivate,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::None => "none",
            Reason::Expired => "expired",
            Reason::LimitReached => "limit_reached",
            Reason::ManualSuspend => "manual_suspend",
            Reason::ManualReactivate => "manual_reactivate",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshly derived license state. Never persisted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectiveState {
    pub status: LicenseStatus,
    pub reason: Reason,
    /// `usage >= capacity`, independent of `status`.
    pub limit_reached: bool,
}

impl EffectiveState {
    /// Active with room to grow.
    pub const fn active() -> Self {
        Self {
            status: LicenseStatus::Active,
            reason: Reason::None,
            limit_reached: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LicenseStatus::Active
    }

    /// Active and below capacity.
    pub fn admits_new_members(&self) -> bool {
        self.is_active() && !self.limit_reached
    }
}

/// Evaluate a license against live usage at `now`.
///
/// Pure: no I/O and no hidden state, so identical inputs always produce the
/// identical result.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use warden_core::{evaluate, License, LicenseStatus, Reason};
///
/// let now = Utc::now();
/// let license = License::new("college-a", 10, now + Duration::days(30), now).unwrap();
///
/// let state = evaluate(&license, 10, now);
/// assert_eq!(state.status, LicenseStatus::Active);
/// assert_eq!(state.reason, Reason::LimitReached);
/// assert!(state.limit_reached);
/// ```
pub fn evaluate(license: &License, usage_count: u32, now: DateTime<Utc>) -> EffectiveState {
    let limit_reached = usage_count >= license.capacity;

    let (status, reason) = if license.manual_status == ManualStatus::Suspended {
        (LicenseStatus::Suspended, Reason::ManualSuspend)
    } else if license.is_expired_at(now) {
        (LicenseStatus::Expired, Reason::Expired)
    } else if limit_reached {
        (LicenseStatus::Active, Reason::LimitReached)
    } else {
        (LicenseStatus::Active, Reason::None)
    };

    EffectiveState {
        status,
        reason,
        limit_reached,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn license(capacity: u32, expires_in: Duration, manual: ManualStatus) -> (License, DateTime<Utc>) {
        let now = Utc::now();
        let mut license = License::new("college-a", capacity, now + expires_in, now).unwrap();
        license.manual_status = manual;
        (license, now)
    }

    #[test]
    fn active_below_capacity() {
        let (license, now) = license(10, Duration::days(1), ManualStatus::Active);
        assert_eq!(evaluate(&license, 3, now), EffectiveState::active());
    }

    #[test]
    fn limit_reached_stays_active() {
        let (license, now) = license(10, Duration::days(1), ManualStatus::Active);
        let state = evaluate(&license, 10, now);
        assert_eq!(state.status, LicenseStatus::Active);
        assert_eq!(state.reason, Reason::LimitReached);
        assert!(state.limit_reached);
        assert!(state.is_active());
        assert!(!state.admits_new_members());
    }

    #[test]
    fn over_capacity_counts_as_limit() {
        let (license, now) = license(10, Duration::days(1), ManualStatus::Active);
        assert_eq!(evaluate(&license, 14, now).reason, Reason::LimitReached);
    }

    #[test]
    fn expiry_beats_limit() {
        let (license, now) = license(10, -Duration::days(1), ManualStatus::Active);
        let state = evaluate(&license, 10, now);
        assert_eq!(state.status, LicenseStatus::Expired);
        assert_eq!(state.reason, Reason::Expired);
        // Still reported, orthogonal to status
        assert!(state.limit_reached);
    }

    #[test]
    fn expiry_is_strict() {
        let (mut license, now) = license(10, Duration::zero(), ManualStatus::Active);
        license.expiry = now;
        assert_eq!(evaluate(&license, 0, now).status, LicenseStatus::Active);
    }

    #[test]
    fn suspension_beats_everything() {
        let (license, now) = license(1, -Duration::days(3), ManualStatus::Suspended);
        let state = evaluate(&license, 100, now);
        assert_eq!(state.status, LicenseStatus::Suspended);
        assert_eq!(state.reason, Reason::ManualSuspend);
    }

    #[test]
    fn moving_expiry_forward_is_level_triggered() {
        let (mut license, now) = license(10, -Duration::days(1), ManualStatus::Active);
        license.stored_status = LicenseStatus::Expired;
        assert_eq!(evaluate(&license, 0, now).status, LicenseStatus::Expired);

        license.expiry = now + Duration::days(30);
        assert_eq!(evaluate(&license, 0, now), EffectiveState::active());
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(Reason::LimitReached.as_str(), "limit_reached");
        assert_eq!(
            serde_json::to_string(&Reason::ManualSuspend).unwrap(),
            "\"manual_suspend\""
        );
    }
}
