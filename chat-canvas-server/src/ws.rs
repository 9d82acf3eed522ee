//! WebSocket transport for one session.
//!
//! ## Protocol
//!
//! Client to server:
//!
//! ```json
//! {"type": "fragment", "text": "Result: ::metric::", "seq": 0}
//! {"type": "finish"}
//! {"type": "begin_message"}
//! {"type": "command", "command": {"action": "destroy", "componentId": "m"}}
//! {"type": "ping"}
//! ```
//!
//! Server to client: a `welcome` with the current snapshot, then every
//! session event (`update`, `closed`) plus `error` and `pong` replies. Updates
//! caused by other transports on the same session arrive here too. A client
//! that falls behind the session's event buffer gets a `snapshot` event in
//! place of the updates it missed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::metrics::{
    dec_ws_connections, inc_ws_connections, record_subscriber_resync, record_ws_message,
};
use crate::routes::ApiError;
use crate::sessions::{current_timestamp, SessionEvent, SessionRegistry, SessionSnapshot};
use crate::validation::{validate_message_size, validate_session_id};
use crate::AppState;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Append streamed text.
    Fragment {
        /// The text.
        text: String,
        /// Optional sequence number, enforced when present.
        #[serde(default)]
        seq: Option<u64>,
    },
    /// End of stream.
    Finish,
    /// Start the next assistant message; the canvas carries over.
    BeginMessage,
    /// Display command, as JSON or as the raw model output string.
    Command {
        /// The command.
        command: serde_json::Value,
    },
    /// Keep-alive.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the upgrade.
    Welcome {
        /// Server version.
        version: String,
        /// Current session view.
        snapshot: SessionSnapshot,
    },
    /// A session event.
    Event {
        /// The event.
        event: SessionEvent,
    },
    /// A request failed.
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Reply to `ping`.
    Pong {
        /// Unix timestamp in seconds.
        timestamp: u64,
    },
}

impl ServerMessage {
    fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Event { event } => event.name(),
            Self::Error { .. } => "error",
            Self::Pong { .. } => "pong",
        }
    }
}

/// WebSocket upgrade handler for `/ws/{id}`.
///
/// # Errors
///
/// Returns 400 for a malformed session id and 404 for an unknown session.
#[tracing::instrument(name = "websocket_connect", skip(ws, state))]
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_session_id(&session_id)?;
    // Fail the upgrade rather than the socket for unknown sessions.
    state.sessions.snapshot(&session_id)?;
    tracing::info!(session_id = %session_id, "WebSocket connection upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_session_socket(socket, state.sessions, session_id)))
}

/// Drive one WebSocket connection until either side closes.
pub async fn handle_session_socket(socket: WebSocket, sessions: SessionRegistry, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let Ok((snapshot, mut event_rx)) = sessions.subscribe(&session_id) else {
        return;
    };
    inc_ws_connections();

    let welcome = ServerMessage::Welcome {
        version: env!("CARGO_PKG_VERSION").to_string(),
        snapshot,
    };
    if send(&mut sender, &welcome).await.is_err() {
        dec_ws_connections();
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_text(&sessions, &session_id, text.as_str()) {
                            if send(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session_id = %session_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %session_id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        let closed = matches!(event, SessionEvent::Closed { .. });
                        if send(&mut sender, &ServerMessage::Event { event }).await.is_err() || closed {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(session_id = %session_id, skipped, "WebSocket subscriber lagged, resyncing");
                        record_subscriber_resync("ws");
                        let event = sessions.resync(&session_id, &mut event_rx);
                        let closed = matches!(event, SessionEvent::Closed { .. });
                        if send(&mut sender, &ServerMessage::Event { event }).await.is_err() || closed {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    dec_ws_connections();
    tracing::info!(session_id = %session_id, "WebSocket connection closed");
}

/// Handle one inbound text frame. Returns a direct reply, if any; results of
/// applied steps reach the client through the session's event channel.
fn handle_client_text(sessions: &SessionRegistry, session_id: &str, text: &str) -> Option<ServerMessage> {
    if let Err(e) = validate_message_size(text.len()) {
        crate::metrics::record_validation_failure(e.kind());
        return Some(error_message("message_too_large", &e.to_string()));
    }

    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return Some(error_message("invalid_message", &e.to_string())),
    };

    let outcome = match message {
        ClientMessage::Fragment { text, seq } => {
            record_ws_message("inbound", "fragment");
            sessions.accept(session_id, &text, seq).map(|_| ())
        }
        ClientMessage::Finish => {
            record_ws_message("inbound", "finish");
            sessions.finish(session_id).map(|_| ())
        }
        ClientMessage::BeginMessage => {
            record_ws_message("inbound", "begin_message");
            sessions.begin_message(session_id).map(|_| ())
        }
        ClientMessage::Command { command } => {
            record_ws_message("inbound", "command");
            let raw = match command {
                serde_json::Value::String(raw) => raw,
                other => other.to_string(),
            };
            sessions.apply_command(session_id, &raw).map(|_| ())
        }
        ClientMessage::Ping => {
            record_ws_message("inbound", "ping");
            return Some(ServerMessage::Pong {
                timestamp: current_timestamp(),
            });
        }
    };

    outcome.err().map(|e| {
        let error = ApiError::from(e);
        error_message(error.code(), &error.to_string())
    })
}

fn error_message(code: &str, message: &str) -> ServerMessage {
    ServerMessage::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}

async fn send<S>(sender: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize {} message: {}", message.kind(), e);
            return Ok(());
        }
    };
    record_ws_message("outbound", message.kind());
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}
