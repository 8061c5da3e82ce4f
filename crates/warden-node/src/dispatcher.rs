//! Notification dispatcher - turns a transition into addressed envelopes.

use crate::push::{Envelope, PushChannel};
use crate::store::MemberRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use warden_core::{events_for, Audience, EffectiveState, License, Notification, Topic};

pub struct NotificationDispatcher {
    push: Arc<dyn PushChannel>,
    members: Arc<dyn MemberRegistry>,
    store_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(push: Arc<dyn PushChannel>, members: Arc<dyn MemberRegistry>) -> Self {
        Self {
            push,
            members,
            store_timeout: Duration::from_secs(5),
        }
    }

    /// Bound the tenant-admin lookup.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Publish the events for `license` moving from `previous` to `current`.
    ///
    /// `current.reason` selects the specific event; `license.statusChanged`
    /// always follows it. Delivery failures are logged and never abort the
    /// remaining envelopes. Returns the number of envelopes published.
    pub async fn dispatch(
        &self,
        license: &License,
        previous: Option<&EffectiveState>,
        current: &EffectiveState,
        now: DateTime<Utc>,
    ) -> usize {
        let tenant_id = &license.tenant_id;
        let mut published = 0;

        for event_type in events_for(current.reason) {
            let notification =
                Notification::new(event_type, license, previous, current, current.reason, now);

            for topic in self.resolve(tenant_id, event_type.audiences()).await {
                let envelope = Envelope {
                    topic,
                    notification: notification.clone(),
                };
                match self.push.publish(envelope) {
                    Ok(reached) => {
                        published += 1;
                        debug!(
                            tenant = %tenant_id,
                            event = %event_type,
                            reached,
                            "Published license event"
                        );
                    }
                    Err(e) => {
                        warn!(tenant = %tenant_id, event = %event_type, "Push publish failed: {}", e);
                    }
                }
            }
        }

        published
    }

    async fn resolve(&self, tenant_id: &str, audiences: &[Audience]) -> Vec<Topic> {
        let mut topics = Vec::with_capacity(audiences.len());
        for audience in audiences {
            match audience {
                Audience::AllAdmins => topics.push(Topic::Admins),
                Audience::TenantMembers => topics.push(Topic::Tenant(tenant_id.to_string())),
                Audience::TenantAdmins => {
                    let lookup = self.members.tenant_admins(tenant_id);
                    match tokio::time::timeout(self.store_timeout, lookup).await {
                        Ok(Ok(admins)) => topics.extend(admins.into_iter().map(Topic::Member)),
                        Ok(Err(e)) => {
                            warn!(tenant = %tenant_id, "Could not resolve tenant admins: {}", e);
                        }
                        Err(_) => {
                            warn!(tenant = %tenant_id, "Tenant admin lookup timed out");
                        }
                    }
                }
            }
        }
        topics
    }
}
