//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for issuing licenses, overriding their
//! status and managing members. One JSON command per line, one JSON
//! response per line.

use crate::error::{Error, Result};
use crate::watcher::WatcherHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use warden_core::{Member, MemberRole};

/// Actor recorded for commands that do not name one.
const DEFAULT_ACTOR: &str = "warden-admin";

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Issue or renew a license
    Issue {
        tenant_id: String,
        capacity: u32,
        expiry: DateTime<Utc>,
        actor_id: Option<String>,
    },
    /// Delete a license
    Revoke {
        tenant_id: String,
        actor_id: Option<String>,
    },
    /// Suspend a tenant
    Disable {
        tenant_id: String,
        actor_id: Option<String>,
    },
    /// Lift a suspension
    Reactivate {
        tenant_id: String,
        actor_id: Option<String>,
    },
    /// Fresh status of one tenant
    Status { tenant_id: String },
    /// Access decision for one tenant
    Check {
        tenant_id: String,
        #[serde(default)]
        requires_capacity: bool,
    },
    /// Immediate evaluate-and-dispatch
    ForceCheck { tenant_id: String },
    /// Add or update a member
    AddMember {
        tenant_id: String,
        member_id: String,
        #[serde(default)]
        role: MemberRole,
    },
    /// Remove a member
    RemoveMember { tenant_id: String, member_id: String },
    /// List licensed tenants
    List,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Data { data: serde_json::Value },
    Pong,
}

impl From<Error> for AdminResponse {
    fn from(e: Error) -> Self {
        AdminResponse::Error {
            error: e.to_string(),
        }
    }
}

/// Admin socket server.
pub struct AdminSocket {
    watcher: WatcherHandle,
    socket_path: String,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(watcher: WatcherHandle, socket_path: &str) -> Self {
        Self {
            watcher,
            socket_path: socket_path.to_string(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let watcher = self.watcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, watcher).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, watcher: WatcherHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &watcher).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn data<T: Serialize>(value: &T) -> AdminResponse {
    match serde_json::to_value(value) {
        Ok(data) => AdminResponse::Data { data },
        Err(e) => Error::from(e).into(),
    }
}

/// Execute one command against the engine.
pub async fn execute_command(cmd: AdminCommand, watcher: &WatcherHandle) -> AdminResponse {
    let engine = watcher.engine();
    let actor = |actor_id: Option<String>| actor_id.unwrap_or_else(|| DEFAULT_ACTOR.to_string());

    match cmd {
        AdminCommand::Issue {
            tenant_id,
            capacity,
            expiry,
            actor_id,
        } => match engine
            .issue_license(&tenant_id, capacity, expiry, &actor(actor_id))
            .await
        {
            Ok(license) => data(&license),
            Err(e) => e.into(),
        },

        AdminCommand::Revoke {
            tenant_id,
            actor_id,
        } => match engine.revoke_license(&tenant_id, &actor(actor_id)).await {
            Ok(()) => AdminResponse::Ok {
                message: format!("Revoked license of {}", tenant_id),
            },
            Err(e) => e.into(),
        },

        AdminCommand::Disable {
            tenant_id,
            actor_id,
        } => match engine.disable(&tenant_id, &actor(actor_id)).await {
            Ok(_) => AdminResponse::Ok {
                message: format!("Suspended {}", tenant_id),
            },
            Err(e) => e.into(),
        },

        AdminCommand::Reactivate {
            tenant_id,
            actor_id,
        } => match engine.reactivate(&tenant_id, &actor(actor_id)).await {
            Ok(license) => AdminResponse::Ok {
                message: format!("Reactivated {} ({})", tenant_id, license.stored_status),
            },
            Err(e) => e.into(),
        },

        AdminCommand::Status { tenant_id } => match engine.license_status(&tenant_id).await {
            Ok(view) => data(&view),
            Err(e) => e.into(),
        },

        AdminCommand::Check {
            tenant_id,
            requires_capacity,
        } => match engine.gate().check_access(&tenant_id, requires_capacity).await {
            Ok(decision) => data(&decision),
            Err(e) => e.into(),
        },

        AdminCommand::ForceCheck { tenant_id } => match watcher.force_check(&tenant_id).await {
            Ok(state) => data(&state),
            Err(e) => e.into(),
        },

        AdminCommand::AddMember {
            tenant_id,
            member_id,
            role,
        } => {
            let member = Member {
                role,
                ..Member::student(tenant_id, member_id)
            };
            match engine.upsert_member(&member).await {
                Ok(state) => data(&state),
                Err(e) => e.into(),
            }
        }

        AdminCommand::RemoveMember {
            tenant_id,
            member_id,
        } => match engine.remove_member(&tenant_id, &member_id).await {
            Ok(state) => data(&state),
            Err(e) => e.into(),
        },

        AdminCommand::List => match engine.list_licenses().await {
            Ok(licenses) => AdminResponse::List {
                items: licenses
                    .into_iter()
                    .map(|l| format!("{}\t{}\t{}/{}", l.tenant_id, l.stored_status, l.usage_count, l.capacity))
                    .collect(),
            },
            Err(e) => e.into(),
        },

        AdminCommand::Ping => AdminResponse::Pong,
    }
}
