//! Local feed server for publishers and `endurance-watch-ctl`.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON requests and
//! routes them to the running session.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "publish", "stream_id": "front", "payload": "frame text"}
//! {"command": "publish", "stream_id": "front", "payload_bytes": [1, 2, 3]}
//! {"command": "status"}
//! {"command": "abort"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "not found: stream rear is not monitored"}
//! ```

use futures_util::StreamExt;
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::codec::FeedCodec;
use crate::models::FeedMessage;
use crate::orchestrator::FeedSink;
use crate::{AppError, Result};

/// Everything a connection needs to serve requests for one session.
#[derive(Debug, Clone)]
pub struct FeedContext {
    /// Session identifier reported by `status`.
    pub session_id: String,
    /// Session name reported by `status`.
    pub session_name: String,
    /// Delivery handle into the session's watchers.
    pub sink: FeedSink,
    /// Cancelled by the `abort` command.
    pub operator_abort: CancellationToken,
}

/// Inbound feed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedRequest {
    /// Command verb: `publish`, `status`, or `abort`.
    pub command: String,
    /// Target stream (for `publish`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    /// UTF-8 payload (for `publish`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Binary payload (for `publish`); takes precedence over `payload`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_bytes: Option<Vec<u8>>,
}

/// Outbound feed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the feed server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_feed_server(
    ipc_name: &str,
    ctx: FeedContext,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = ipc_name.to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "feed server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("feed_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("feed server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(
                                    stream,
                                    ctx.clone(),
                                    ct.child_token(),
                                ));
                            }
                            Err(err) => {
                                warn!(%err, "feed accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single publisher or ctl connection until it closes or `ct`
/// is cancelled.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    ctx: FeedContext,
    ct: CancellationToken,
) {
    let span = info_span!("feed_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut lines = FramedRead::new(reader, FeedCodec::new());

        loop {
            let frame = tokio::select! {
                () = ct.cancelled() => {
                    debug!("feed connection closed by server shutdown");
                    break;
                }
                frame = lines.next() => frame,
            };
            let Some(frame) = frame else {
                break;
            };
            let (response, fatal) = match frame {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    (handle_line(trimmed, &ctx), false)
                }
                Err(err) => {
                    warn!(%err, "feed read error");
                    (FeedResponse::error(err.to_string()), true)
                }
            };

            let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
            });
            response_line.push('\n');

            if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                warn!(%err, "failed to write feed response");
                break;
            }
            if fatal {
                break;
            }
        }

        debug!("feed connection closed");
    }
    .instrument(span)
    .await;
}

/// Parse and execute one request line. The arrival time of a published
/// message is taken when the line is handled.
#[must_use]
pub fn handle_line(line: &str, ctx: &FeedContext) -> FeedResponse {
    let arrival = Instant::now();
    match serde_json::from_str::<FeedRequest>(line) {
        Ok(request) => dispatch_command(request, arrival, ctx),
        Err(err) => FeedResponse::error(format!("invalid json: {err}")),
    }
}

fn dispatch_command(request: FeedRequest, arrival: Instant, ctx: &FeedContext) -> FeedResponse {
    match request.command.as_str() {
        "publish" => handle_publish(request, arrival, ctx),
        "status" => handle_status(ctx),
        "abort" => handle_abort(ctx),
        other => FeedResponse::error(format!("unknown command: {other}")),
    }
}

fn handle_publish(request: FeedRequest, arrival: Instant, ctx: &FeedContext) -> FeedResponse {
    let Some(stream_id) = request.stream_id else {
        return FeedResponse::error("missing required 'stream_id' field");
    };
    let message = match (request.payload_bytes, request.payload) {
        (Some(bytes), _) => FeedMessage::new(bytes),
        (None, Some(text)) => FeedMessage::new(text.into_bytes()),
        (None, None) => FeedMessage::default(),
    };

    match ctx.sink.deliver(&stream_id, &message, arrival) {
        Ok(()) => FeedResponse::success(serde_json::json!({
            "stream_id": stream_id,
            "bytes": message.len(),
        })),
        Err(err) => FeedResponse::error(err.to_string()),
    }
}

fn handle_status(ctx: &FeedContext) -> FeedResponse {
    FeedResponse::success(serde_json::json!({
        "session_id": ctx.session_id,
        "session_name": ctx.session_name,
        "state": ctx.sink.state(),
        "watchers": ctx.sink.snapshots(),
    }))
}

fn handle_abort(ctx: &FeedContext) -> FeedResponse {
    warn!(session_id = %ctx.session_id, "operator abort requested");
    ctx.operator_abort.cancel();
    FeedResponse::success(serde_json::json!({
        "session_id": ctx.session_id,
        "status": "aborting",
    }))
}
