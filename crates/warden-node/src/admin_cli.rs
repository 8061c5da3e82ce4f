//! warden-admin CLI tool
//!
//! Manages licenses and members of a running warden-node.
//!
//! Usage:
//!   warden-admin issue <tenant_id> <capacity> <expiry_rfc3339>
//!   warden-admin revoke <tenant_id>
//!   warden-admin disable <tenant_id>
//!   warden-admin reactivate <tenant_id>
//!   warden-admin status <tenant_id>
//!   warden-admin check <tenant_id> [--capacity]
//!   warden-admin force-check <tenant_id>
//!   warden-admin add-member <tenant_id> <member_id> [--admin]
//!   warden-admin remove-member <tenant_id> <member_id>
//!   warden-admin list
//!   warden-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Issue {
        tenant_id: String,
        capacity: u32,
        expiry: String,
        actor_id: Option<String>,
    },
    Revoke {
        tenant_id: String,
        actor_id: Option<String>,
    },
    Disable {
        tenant_id: String,
        actor_id: Option<String>,
    },
    Reactivate {
        tenant_id: String,
        actor_id: Option<String>,
    },
    Status {
        tenant_id: String,
    },
    Check {
        tenant_id: String,
        requires_capacity: bool,
    },
    ForceCheck {
        tenant_id: String,
    },
    AddMember {
        tenant_id: String,
        member_id: String,
        role: String,
    },
    RemoveMember {
        tenant_id: String,
        member_id: String,
    },
    List,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Data { data: serde_json::Value },
    Pong,
}

fn print_usage() {
    eprintln!("warden-admin - Manage warden-node licenses and members");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  warden-admin issue <tenant> <capacity> <expiry>  Issue or renew (expiry in RFC 3339)");
    eprintln!("  warden-admin revoke <tenant>                     Delete a license");
    eprintln!("  warden-admin disable <tenant>                    Suspend a tenant");
    eprintln!("  warden-admin reactivate <tenant>                 Lift a suspension");
    eprintln!("  warden-admin status <tenant>                     Show fresh license status");
    eprintln!("  warden-admin check <tenant> [--capacity]         Ask the access gate");
    eprintln!("  warden-admin force-check <tenant>                Evaluate and notify now");
    eprintln!("  warden-admin add-member <tenant> <member> [--admin]");
    eprintln!("  warden-admin remove-member <tenant> <member>");
    eprintln!("  warden-admin list                                List licensed tenants");
    eprintln!("  warden-admin ping                                Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WARDEN_SOCKET  Path to admin socket (default: ./warden-data/admin.sock)");
    eprintln!("  WARDEN_ACTOR   Actor recorded on changes (default: warden-admin)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("WARDEN_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./warden-data/admin.sock"))
}

fn actor() -> Option<String> {
    std::env::var("WARDEN_ACTOR").ok()
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to warden-node at {:?}: {}\n\
             Is the warden-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

/// Positional argument `index`, or exit with a usage error.
fn arg(args: &[String], index: usize, command: &str, name: &str) -> String {
    match args.get(index) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a {} argument", command, name);
            std::process::exit(1);
        }
    }
}

fn parse_command(args: &[String]) -> AdminCommand {
    let command = args[1].as_str();
    let has_flag = |flag: &str| args.iter().skip(2).any(|a| a == flag);

    match command {
        "issue" => {
            let capacity = arg(args, 3, command, "capacity");
            let capacity = match capacity.parse() {
                Ok(capacity) => capacity,
                Err(_) => {
                    eprintln!("Error: capacity must be a positive integer, got {}", capacity);
                    std::process::exit(1);
                }
            };
            AdminCommand::Issue {
                tenant_id: arg(args, 2, command, "tenant_id"),
                capacity,
                expiry: arg(args, 4, command, "expiry"),
                actor_id: actor(),
            }
        }
        "revoke" => AdminCommand::Revoke {
            tenant_id: arg(args, 2, command, "tenant_id"),
            actor_id: actor(),
        },
        "disable" => AdminCommand::Disable {
            tenant_id: arg(args, 2, command, "tenant_id"),
            actor_id: actor(),
        },
        "reactivate" => AdminCommand::Reactivate {
            tenant_id: arg(args, 2, command, "tenant_id"),
            actor_id: actor(),
        },
        "status" => AdminCommand::Status {
            tenant_id: arg(args, 2, command, "tenant_id"),
        },
        "check" => AdminCommand::Check {
            tenant_id: arg(args, 2, command, "tenant_id"),
            requires_capacity: has_flag("--capacity"),
        },
        "force-check" => AdminCommand::ForceCheck {
            tenant_id: arg(args, 2, command, "tenant_id"),
        },
        "add-member" => AdminCommand::AddMember {
            tenant_id: arg(args, 2, command, "tenant_id"),
            member_id: arg(args, 3, command, "member_id"),
            role: if has_flag("--admin") { "admin" } else { "student" }.to_string(),
        },
        "remove-member" => AdminCommand::RemoveMember {
            tenant_id: arg(args, 2, command, "tenant_id"),
            member_id: arg(args, 3, command, "member_id"),
        },
        "list" => AdminCommand::List,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = parse_command(&args);

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::List { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for item in items {
                        println!("{}", item);
                    }
                }
            }
            AdminResponse::Data { data } => match serde_json::to_string_pretty(&data) {
                Ok(pretty) => println!("{}", pretty),
                Err(_) => println!("{}", data),
            },
            AdminResponse::Pong => {
                println!("pong - warden-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
