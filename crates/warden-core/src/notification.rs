//! Notification taxonomy and push-channel addressing.
//!
//! | reason            | event                   | audience                         |
//! |-------------------|-------------------------|----------------------------------|
//! | expired           | `license.expired`       | all admins + tenant members      |
//! | limit_reached     | `license.limitReached`  | all admins + tenant admins       |
//! | manual_suspend    | `license.manualDisable` | all admins + tenant members      |
//! | manual_reactivate | `license.reactivated`   | all admins + tenant members      |
//! | (any)             | `license.statusChanged` | all admins                       |

use crate::error::Error;
use crate::license::{License, LicenseStatus};
use crate::state::{EffectiveState, Reason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Push-channel topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every platform administrator
    Admins,
    /// Every member of one tenant
    Tenant(String),
    /// One member's private topic
    Member(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Admins => f.write_str("admins"),
            Topic::Tenant(id) => write!(f, "tenant:{}", id),
            Topic::Member(id) => write!(f, "member:{}", id),
        }
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "admins" {
            return Ok(Topic::Admins);
        }
        match s.split_once(':') {
            Some(("tenant", id)) if !id.is_empty() => Ok(Topic::Tenant(id.to_string())),
            Some(("member", id)) if !id.is_empty() => Ok(Topic::Member(id.to_string())),
            _ => Err(Error::InvalidTopic(s.to_string())),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Who a notification is addressed to, before topic resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    AllAdmins,
    TenantMembers,
    /// Resolved to per-member private topics via the member registry
    TenantAdmins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "license.expired")]
    Expired,
    #[serde(rename = "license.limitReached")]
    LimitReached,
    #[serde(rename = "license.manualDisable")]
    ManualDisable,
    #[serde(rename = "license.reactivated")]
    Reactivated,
    #[serde(rename = "license.statusChanged")]
    StatusChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Expired => "license.expired",
            EventType::LimitReached => "license.limitReached",
            EventType::ManualDisable => "license.manualDisable",
            EventType::Reactivated => "license.reactivated",
            EventType::StatusChanged => "license.statusChanged",
        }
    }

    /// Specific event for a reason, if the reason has one.
    pub fn for_reason(reason: Reason) -> Option<Self> {
        match reason {
            Reason::None => None,
            Reason::Expired => Some(EventType::Expired),
            Reason::LimitReached => Some(EventType::LimitReached),
            Reason::ManualSuspend => Some(EventType::ManualDisable),
            Reason::ManualReactivate => Some(EventType::Reactivated),
        }
    }

    pub fn audiences(&self) -> &'static [Audience] {
        match self {
            EventType::Expired | EventType::ManualDisable | EventType::Reactivated => {
                &[Audience::AllAdmins, Audience::TenantMembers]
            }
            EventType::LimitReached => &[Audience::AllAdmins, Audience::TenantAdmins],
            EventType::StatusChanged => &[Audience::AllAdmins],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted for a transition whose current reason is `reason`, in
/// publication order. `statusChanged` is always last.
pub fn events_for(reason: Reason) -> Vec<EventType> {
    let mut events = Vec::with_capacity(2);
    if let Some(specific) = EventType::for_reason(reason) {
        events.push(specific);
    }
    events.push(EventType::StatusChanged);
    events
}

/// Everything a client needs to render the change without a follow-up query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub capacity: u32,
    pub usage_count: u32,
    pub expiry: DateTime<Utc>,
    pub limit_reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<LicenseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_reason: Option<Reason>,
}

/// An ephemeral, addressed license event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub tenant_id: String,
    pub event_type: EventType,
    pub status: LicenseStatus,
    pub reason: Reason,
    pub timestamp: DateTime<Utc>,
    pub payload: NotificationPayload,
}

impl Notification {
    /// Build a notification for `license` moving from `previous` to `current`.
    pub fn new(
        event_type: EventType,
        license: &License,
        previous: Option<&EffectiveState>,
        current: &EffectiveState,
        reason: Reason,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: license.tenant_id.clone(),
            event_type,
            status: current.status,
            reason,
            timestamp,
            payload: NotificationPayload {
                capacity: license.capacity,
                usage_count: license.usage_count,
                expiry: license.expiry,
                limit_reached: current.limit_reached,
                previous_status: previous.map(|p| p.status),
                previous_reason: previous.map(|p| p.reason),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_display_and_parse() {
        let topics = [
            Topic::Admins,
            Topic::Tenant("college-a".into()),
            Topic::Member("u-1".into()),
        ];
        for topic in topics {
            let parsed: Topic = topic.to_string().parse().unwrap();
            assert_eq!(parsed, topic);
        }
        assert_eq!(Topic::Tenant("x".into()).to_string(), "tenant:x");
    }

    #[test]
    fn topic_rejects_garbage() {
        assert!("tenant:".parse::<Topic>().is_err());
        assert!("room:1".parse::<Topic>().is_err());
        assert!("".parse::<Topic>().is_err());
    }

    #[test]
    fn status_changed_always_emitted() {
        assert_eq!(events_for(Reason::None), vec![EventType::StatusChanged]);
        assert_eq!(
            events_for(Reason::Expired),
            vec![EventType::Expired, EventType::StatusChanged]
        );
        assert_eq!(
            events_for(Reason::ManualReactivate),
            vec![EventType::Reactivated, EventType::StatusChanged]
        );
    }

    #[test]
    fn limit_reached_goes_to_tenant_admins_only() {
        let audiences = EventType::LimitReached.audiences();
        assert!(audiences.contains(&Audience::TenantAdmins));
        assert!(!audiences.contains(&Audience::TenantMembers));
    }

    #[test]
    fn event_names_serialize() {
        let json = serde_json::to_string(&EventType::ManualDisable).unwrap();
        assert_eq!(json, "\"license.manualDisable\"");
        assert_eq!(EventType::LimitReached.to_string(), "license.limitReached");
    }

    #[test]
    fn notification_carries_payload() {
        let now = Utc::now();
        let mut license = License::new("college-a", 10, now, now).unwrap();
        license.usage_count = 10;
        let current = EffectiveState {
            status: LicenseStatus::Active,
            reason: Reason::LimitReached,
            limit_reached: true,
        };
        let previous = EffectiveState::active();

        let n = Notification::new(
            EventType::LimitReached,
            &license,
            Some(&previous),
            &current,
            current.reason,
            now,
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["tenantId"], "college-a");
        assert_eq!(json["eventType"], "license.limitReached");
        assert_eq!(json["reason"], "limit_reached");
        assert_eq!(json["payload"]["usageCount"], 10);
        assert_eq!(json["payload"]["previousReason"], "none");
    }
}
