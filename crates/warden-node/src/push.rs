//! Push channel - topic-addressed publish/subscribe for license events.
//!
//! The engine only publishes. Subscription management belongs to the
//! transport: [`BroadcastChannel`] fans every envelope out to all receivers
//! and each WebSocket connection filters by the topics it asked for.

use crate::error::Result;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;
use warden_core::{Notification, Topic};

/// A notification addressed to one topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub topic: Topic,
    pub notification: Notification,
}

/// Outbound side of the publish/subscribe transport.
pub trait PushChannel: Send + Sync + 'static {
    /// Publish one envelope. Returns the number of subscribers reached.
    fn publish(&self, envelope: Envelope) -> Result<usize>;
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<Arc<Envelope>>,
}

impl BroadcastChannel {
    /// Create a channel buffering up to `capacity` envelopes per lagging receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl PushChannel for BroadcastChannel {
    fn publish(&self, envelope: Envelope) -> Result<usize> {
        let topic = envelope.topic.to_string();
        match self.tx.send(Arc::new(envelope)) {
            Ok(reached) => Ok(reached),
            Err(_) => {
                // No subscribers connected; nothing to deliver
                debug!(topic = %topic, "No push subscribers");
                Ok(0)
            }
        }
    }
}

/// Records every published envelope. Useful for embedding hosts that poll,
/// and for asserting on dispatch.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    published: Mutex<Vec<Envelope>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.lock().clone()
    }

    /// Envelopes for one topic, in order.
    pub fn on_topic(&self, topic: &Topic) -> Vec<Envelope> {
        self.lock()
            .iter()
            .filter(|e| &e.topic == topic)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Envelope>> {
        self.published.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PushChannel for RecordingChannel {
    fn publish(&self, envelope: Envelope) -> Result<usize> {
        self.lock().push(envelope);
        Ok(1)
    }
}
