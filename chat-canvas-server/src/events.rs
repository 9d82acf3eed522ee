//! Session event streaming via Server-Sent Events.
//!
//! ## Protocol
//!
//! A subscriber first receives the current session view, then one event per
//! applied step:
//!
//! ```text
//! event: snapshot
//! data: {"type":"snapshot","snapshot":{"session_id":"chat-1","text":"",...}}
//!
//! event: update
//! data: {"type":"update","session_id":"chat-1","result":{"textDelta":"Hi",...}}
//!
//! event: closed
//! data: {"type":"closed","session_id":"chat-1"}
//! ```
//!
//! The stream ends after `closed`. A subscriber that falls behind the
//! session's event buffer receives a fresh `snapshot` in place of the events
//! it missed.
//!
//! ## Endpoints
//!
//! - `GET /api/sessions/{id}/events` - SSE stream for one session

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::StreamExt;

use crate::metrics::record_subscriber_resync;
use crate::routes::ApiError;
use crate::sessions::{SessionEvent, SessionRegistry};
use crate::validation::validate_session_id;
use crate::AppState;

/// Render a session event as an SSE frame.
fn to_sse(event: &SessionEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.name()).data(data)
}

/// SSE stream handler for one session.
///
/// # Example
///
/// ```text
/// curl -N http://localhost:9474/api/sessions/chat-1/events
/// ```
///
/// # Errors
///
/// Returns 400 for a malformed session id and 404 for an unknown session.
#[tracing::instrument(name = "session_events", skip(state))]
pub async fn stream_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    validate_session_id(&session_id)?;
    let (snapshot, rx) = state.sessions.subscribe(&session_id)?;
    tracing::debug!(session_id = %session_id, "SSE subscriber attached");

    let updates = session_updates(state.sessions, session_id, rx);

    let mut closed = false;
    let events = tokio_stream::once(SessionEvent::Snapshot { snapshot })
        .chain(updates)
        .take_while(move |event| {
            let open = !closed;
            closed = matches!(event, SessionEvent::Closed { .. });
            open
        })
        .map(|event| Ok(to_sse(&event)));

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("heartbeat"),
    ))
}

/// Events from one subscription, resyncing from a snapshot on lag.
fn session_updates(
    sessions: SessionRegistry,
    session_id: String,
    rx: broadcast::Receiver<SessionEvent>,
) -> impl Stream<Item = SessionEvent> {
    futures::stream::unfold(
        (sessions, session_id, rx),
        |(sessions, session_id, mut rx)| async move {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(session_id = %session_id, skipped, "SSE subscriber lagged, resyncing");
                    record_subscriber_resync("sse");
                    sessions.resync(&session_id, &mut rx)
                }
                Err(RecvError::Closed) => return None,
            };
            Some((event, (sessions, session_id, rx)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::RegistryLimits;

    #[tokio::test]
    async fn test_lagging_stream_resyncs_from_snapshot() {
        let sessions = SessionRegistry::with_limits(RegistryLimits {
            event_capacity: 2,
            ..RegistryLimits::default()
        });
        sessions.create(Some("s".to_string())).expect("should create");
        let (_, rx) = sessions.subscribe("s").expect("should subscribe");
        let updates = session_updates(sessions.clone(), "s".to_string(), rx);
        tokio::pin!(updates);

        for fragment in ["one ", "two ", "three ", "four"] {
            sessions.accept("s", fragment, None).expect("should accept");
        }

        match updates.next().await.expect("should yield") {
            SessionEvent::Snapshot { snapshot } => assert_eq!(snapshot.text, "one two three four"),
            other => panic!("Expected Snapshot, got {other:?}"),
        }

        sessions.accept("s", " five", None).expect("should accept");
        match updates.next().await.expect("should yield") {
            SessionEvent::Update { result, .. } => assert_eq!(result.text_delta, " five"),
            other => panic!("Expected Update, got {other:?}"),
        }

        sessions.remove("s").expect("should remove");
        assert!(matches!(
            updates.next().await,
            Some(SessionEvent::Closed { .. })
        ));
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::Closed {
            session_id: "test".to_string(),
        };
        let json = serde_json::to_string(&event).expect("should serialize");
        assert!(json.contains("\"type\":\"closed\""));
        assert!(json.contains("test"));
        assert_eq!(event.name(), "closed");
    }

    #[test]
    fn test_snapshot_event_name() {
        let event = SessionEvent::Snapshot {
            snapshot: crate::sessions::SessionSnapshot {
                session_id: "s".to_string(),
                text: String::new(),
                state: chat_canvas_core::CanvasState::new(),
                finished: false,
                next_seq: 0,
                created_at: 9_876_543_210,
            },
        };
        let json = serde_json::to_string(&event).expect("should serialize");
        assert!(json.contains("\"type\":\"snapshot\""));
        assert!(json.contains("9876543210"));
        assert_eq!(event.name(), "snapshot");
    }
}
