//! WebSocket streaming of license events.
//!
//! Clients pick their rooms when connecting:
//!
//! ```text
//! /api/v1/ws?topics=admins                      platform administrators
//! /api/v1/ws?topics=tenant:college-a            every member of a college
//! /api/v1/ws?topics=tenant:college-a,member:u7  plus one member's private topic
//! ```
//!
//! Every connection holds one receiver on the node's broadcast channel and
//! forwards the envelopes whose topic it subscribed to.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use warden_core::{Notification, Topic};

use crate::node::AppState;
use crate::push::Envelope;

/// Interval between keep-alive heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Messages sent to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Confirms the active subscription
    Subscribed { topics: Vec<String> },
    /// A license event on one of the subscribed topics
    License {
        topic: String,
        notification: Notification,
    },
    /// The client fell behind and missed events
    Lagged { missed: u64 },
    /// Heartbeat to keep connection alive
    Heartbeat { timestamp: i64 },
}

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Comma-separated topic list
    topics: Option<String>,
}

/// Parse a comma-separated topic list. Empty means administrators only.
pub fn parse_topics(raw: Option<&str>) -> Result<HashSet<Topic>, warden_core::Error> {
    let raw = raw.unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(HashSet::from([Topic::Admins]));
    }
    raw.split(',')
        .filter(|t| !t.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// WebSocket handler for license events
pub async fn ws_license_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SubscribeParams>,
    State(state): State<AppState>,
) -> Response {
    let topics = match parse_topics(params.topics.as_deref()) {
        Ok(topics) => topics,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let rx = state.push.subscribe();
    debug!(subscribers = state.push.subscriber_count(), "Push subscriber attached");
    ws.on_upgrade(move |socket| handle_license_socket(socket, rx, topics))
}

/// Handle a WebSocket connection for license events
async fn handle_license_socket(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<Arc<Envelope>>,
    topics: HashSet<Topic>,
) {
    let mut names: Vec<String> = topics.iter().map(Topic::to_string).collect();
    names.sort();
    info!(topics = ?names, "WebSocket client subscribed to license events");

    if let Err(e) = send_event(&mut socket, &ServerEvent::Subscribed { topics: names }).await {
        warn!("Failed to confirm subscription: {}", e);
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Ignoring client message: {}", text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            // Forward matching license events
            received = rx.recv() => {
                match received {
                    Ok(envelope) => {
                        if !topics.contains(&envelope.topic) {
                            continue;
                        }
                        let event = ServerEvent::License {
                            topic: envelope.topic.to_string(),
                            notification: envelope.notification.clone(),
                        };
                        if let Err(e) = send_event(&mut socket, &event).await {
                            warn!("Failed to forward license event: {}", e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "WebSocket client lagged behind license events");
                        if let Err(e) = send_event(&mut socket, &ServerEvent::Lagged { missed }).await {
                            warn!("Failed to send lag notice: {}", e);
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        info!("Push channel closed, ending WebSocket session");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                let event = ServerEvent::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                };
                if let Err(e) = send_event(&mut socket, &event).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }
}

/// Send a server event over WebSocket
async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}
