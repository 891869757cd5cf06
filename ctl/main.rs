#![forbid(unsafe_code)]

//! `endurance-watch-ctl`: local CLI companion for `endurance-watch`.
//!
//! Connects to the session's feed socket and sends JSON commands: publish a
//! message on a stream, print live watcher status, or abort the session.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "endurance-watch-ctl",
    about = "Local CLI for a running endurance-watch session",
    version,
    long_about = None
)]
struct Cli {
    /// Feed socket name (must match the session's `ipc_name`).
    #[arg(long, default_value = "endurance-watch")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Publish one message on a stream.
    Publish {
        /// Target stream id.
        stream_id: String,
        /// UTF-8 payload text.
        #[arg(conflicts_with = "file")]
        text: Option<String>,
        /// Read a binary payload from this file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print the session state and live watcher counters.
    Status,

    /// Abort the running session as an operator cancel.
    Abort,
}

fn main() {
    let args = Cli::parse();

    let request_json = match &args.command {
        Command::Publish {
            stream_id,
            text,
            file,
        } => {
            let mut req = serde_json::json!({ "command": "publish", "stream_id": stream_id });
            if let Some(path) = file {
                match std::fs::read(path) {
                    Ok(bytes) => req["payload_bytes"] = serde_json::json!(bytes),
                    Err(err) => {
                        eprintln!("Failed to read {}: {err}", path.display());
                        std::process::exit(1);
                    }
                }
            } else if let Some(t) = text {
                req["payload"] = serde_json::Value::String(t.clone());
            }
            req
        }
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Abort => serde_json::json!({ "command": "abort" }),
    };

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to session: {err}");
            eprintln!(
                "Is endurance-watch running with ipc_name '{}'?",
                args.ipc_name
            );
            std::process::exit(1);
        }
    }
}

/// Connect to the feed socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
