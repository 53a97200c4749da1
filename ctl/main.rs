#![forbid(unsafe_code)]

//! `agent-rooms-ctl`: local CLI companion for `agent-rooms`.
//!
//! Connects to the IPC socket, sends one protocol message, and prints the
//! matching reply as JSON. Everything else the server pushes on the
//! connection (the `welcome` greeting, unrelated room events) is skipped.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(
    name = "agent-rooms-ctl",
    about = "Local CLI for the agent-rooms server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "agent-rooms")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every room.
    List,

    /// Create a room.
    Create {
        /// Agent kind (`claude`, `codex`, `gemini`, or a configured kind).
        #[arg(long = "agent")]
        agent_type: String,
        /// Target directory.
        #[arg(long = "dir")]
        directory: String,
        /// Branch to work on.
        #[arg(long)]
        branch: Option<String>,
        /// Model passed to the agent CLI.
        #[arg(long)]
        model: Option<String>,
    },

    /// Send a prompt and wait for the reply.
    Send {
        /// Room id or name.
        room: String,
        /// Prompt text.
        content: String,
    },

    /// Cancel the in-flight request of a room.
    Cancel {
        /// Room id or name.
        room: String,
    },

    /// Force a room back to ready.
    Reset {
        /// Room id or name.
        room: String,
    },

    /// Rename a room.
    Rename {
        /// Room id or name.
        room: String,
        /// New name.
        name: String,
    },

    /// Destroy a room.
    Close {
        /// Room id or name.
        room: String,
    },

    /// Check that the server answers.
    Ping,
}

impl Command {
    fn request(&self) -> Value {
        match self {
            Self::List => json!({ "type": "list_rooms" }),
            Self::Create {
                agent_type,
                directory,
                branch,
                model,
            } => {
                let mut req = json!({
                    "type": "create_room",
                    "agentType": agent_type,
                    "directory": absolute(directory),
                });
                if let Some(b) = branch {
                    req["branch"] = Value::String(b.clone());
                }
                if let Some(m) = model {
                    req["agentOptions"] = json!({ "model": m });
                }
                req
            }
            Self::Send { room, content } => {
                json!({ "type": "send_message", "roomId": room, "content": content })
            }
            Self::Cancel { room } => json!({ "type": "cancel", "roomId": room }),
            Self::Reset { room } => json!({ "type": "reset", "roomId": room }),
            Self::Rename { room, name } => {
                json!({ "type": "rename_room", "roomId": room, "name": name })
            }
            Self::Close { room } => json!({ "type": "close_room", "roomId": room }),
            Self::Ping => json!({ "type": "ping" }),
        }
    }

    /// Whether `reply` is the one this command waits for.
    fn is_reply(&self, reply: &Value) -> bool {
        let kind = reply.get("type").and_then(Value::as_str).unwrap_or_default();
        match self {
            Self::List => kind == "room_list",
            Self::Create { .. } => kind == "room_joined",
            Self::Send { .. } => {
                kind == "message"
                    && reply
                        .pointer("/message/role")
                        .and_then(Value::as_str)
                        .is_some_and(|role| role != "user")
            }
            Self::Cancel { .. } => kind == "cancel_result",
            Self::Reset { .. } => kind == "reset_result",
            Self::Rename { .. } => kind == "room_renamed",
            Self::Close { .. } => kind == "room_closed",
            Self::Ping => kind == "pong",
        }
    }
}

fn absolute(directory: &str) -> String {
    std::path::absolute(directory)
        .map_or_else(|_| directory.to_owned(), |p| p.to_string_lossy().into_owned())
}

fn main() {
    let args = Cli::parse();
    let request = args.command.request();

    match exchange(&args.ipc_name, &args.command, &request) {
        Ok(reply) => {
            if reply.get("type").and_then(Value::as_str) == Some("error") {
                let err_msg = reply
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                eprintln!("Error: {err_msg}");
                std::process::exit(1);
            }
            println!("{}", serde_json::to_string_pretty(&reply).unwrap_or_default());
        }
        Err(err) => {
            eprintln!("Failed to talk to server: {err}");
            eprintln!("Is agent-rooms running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Send `request` and read lines until the reply (or an error) arrives.
fn exchange(
    ipc_name: &str,
    command: &Command,
    request: &Value,
) -> std::result::Result<Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err("server closed the connection".into());
        }
        let Ok(reply) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        if reply.get("type").and_then(Value::as_str) == Some("error") || command.is_reply(&reply) {
            return Ok(reply);
        }
    }
}
