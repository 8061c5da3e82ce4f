//! Warden Core - License Model and State Evaluation
//!
//! Pure building blocks of the license enforcement engine. Nothing in this
//! crate performs I/O; the node crate wires these types to storage, the
//! watcher loop and the push channel.
//!
//! # Core Insight
//!
//! A license's effective status is never read, it is **derived**. The stored
//! status is only a cache for avoiding redundant writes; every decision goes
//! back through [`evaluate`] with the live usage count and the current time.
//!
//! # Modules
//!
//! - **License**: the per-tenant record ([`License`], [`ManualStatus`], [`LicenseStatus`])
//! - **State**: the evaluator and its output ([`evaluate`], [`EffectiveState`], [`Reason`])
//! - **Member**: registry records counted as usage ([`Member`], [`MemberRole`])
//! - **Access**: allow/deny decisions ([`AccessDecision`])
//! - **Notification**: event taxonomy and topics ([`Notification`], [`EventType`], [`Topic`])

mod access;
mod error;
mod license;
mod member;
mod notification;
mod state;

pub use access::AccessDecision;
pub use error::{Error, Result};
pub use license::{validate_tenant_id, License, LicenseStatus, ManualStatus};
pub use member::{Member, MemberRole};
pub use notification::{events_for, Audience, EventType, Notification, NotificationPayload, Topic};
pub use state::{evaluate, EffectiveState, Reason};
