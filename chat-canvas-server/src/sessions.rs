//! Session registry.
//!
//! Every session owns one [`StreamAssembler`] behind its own mutex, so
//! fragments for one session apply strictly in arrival order while different
//! sessions proceed concurrently. The registry map itself sits behind an
//! `RwLock` and is only write-locked to add or remove sessions.
//!
//! Each session also owns a broadcast channel. Every applied step is
//! published as a [`SessionEvent`] for SSE and WebSocket subscribers. A
//! subscriber that falls further behind than the channel holds is resynced
//! from [`SessionRegistry::snapshot`].
//!
//! Sessions idle longer than the configured TTL are dropped by
//! [`SessionRegistry::sweep_expired`], which [`spawn_expiry_sweep`] runs on a
//! timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use chat_canvas_core::{
    parse_display_command, AssemblerError, CanvasState, CommandOutcome, DecodeError,
    IncrementalResult, StreamAssembler,
};

use crate::metrics;
use crate::validation::{
    validate_fragment, validate_session_count, validate_session_id, ValidationError,
    DEFAULT_MAX_FRAGMENT_BYTES, DEFAULT_MAX_SESSIONS,
};

/// Default capacity of each session's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session with this id.
    #[error("session not found: {0}")]
    NotFound(String),
    /// A session with this id already exists.
    #[error("session already exists: {0}")]
    AlreadyExists(String),
    /// Untrusted input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The session's assembler rejected the fragment.
    #[error(transparent)]
    Assembler(#[from] AssemblerError),
    /// A display command could not be decoded.
    #[error(transparent)]
    Command(#[from] DecodeError),
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Visible text so far.
    pub text: String,
    /// Current canvas.
    pub state: CanvasState,
    /// Whether the stream has ended.
    pub finished: bool,
    /// Sequence number the next fragment must carry.
    pub next_seq: u64,
    /// Unix timestamp in seconds when the session was created.
    pub created_at: u64,
}

/// Events published to a session's subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Full state, sent first to a new subscriber.
    Snapshot {
        /// Current session view.
        snapshot: SessionSnapshot,
    },
    /// One applied step.
    Update {
        /// Session identifier.
        session_id: String,
        /// What changed.
        result: IncrementalResult,
    },
    /// The session was deleted or expired.
    Closed {
        /// Session identifier.
        session_id: String,
    },
}

impl SessionEvent {
    /// Event name used on the SSE stream.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Update { .. } => "update",
            Self::Closed { .. } => "closed",
        }
    }
}

/// One session: an assembler and its timestamps.
#[derive(Debug)]
struct Session {
    assembler: StreamAssembler,
    created_at: u64,
    /// Last time a step was applied.
    last_active: Instant,
}

#[derive(Debug, Clone)]
struct SessionHandle {
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

/// Registry limits.
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    /// Maximum number of live sessions.
    pub max_sessions: usize,
    /// Maximum bytes per fragment.
    pub max_fragment_bytes: usize,
    /// Events buffered per session before a slow subscriber lags.
    pub event_capacity: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_fragment_bytes: DEFAULT_MAX_FRAGMENT_BYTES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Thread-safe map of session id to session.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    limits: RegistryLimits,
}

impl SessionRegistry {
    /// Create an empty registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with the given limits.
    #[must_use]
    pub fn with_limits(limits: RegistryLimits) -> Self {
        Self {
            sessions: Arc::default(),
            limits,
        }
    }

    /// Configured limits.
    #[must_use]
    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    /// Whether the session map is usable. False once a thread panicked
    /// while holding its lock.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.sessions.is_poisoned()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a session, generating a UUID when no id is given.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for a malformed id or when the
    /// registry is full, and [`SessionError::AlreadyExists`] for a taken id.
    pub fn create(&self, session_id: Option<String>) -> Result<SessionSnapshot, SessionError> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        validate_session_id(&session_id)?;

        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&session_id) {
            return Err(SessionError::AlreadyExists(session_id));
        }
        validate_session_count(sessions.len(), self.limits.max_sessions)?;

        let session = Session {
            assembler: StreamAssembler::new(),
            created_at: current_timestamp(),
            last_active: Instant::now(),
        };
        let snapshot = snapshot(&session_id, &session);
        let (events, _) = broadcast::channel(self.limits.event_capacity.max(1));
        sessions.insert(
            session_id.clone(),
            SessionHandle {
                session: Arc::new(Mutex::new(session)),
                events,
            },
        );
        metrics::set_active_sessions(sessions.len());

        tracing::info!(session_id = %session_id, "Session created");
        Ok(snapshot)
    }

    /// Current view of a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let handle = self.handle(session_id)?;
        let session = handle
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(snapshot(session_id, &session))
    }

    /// Delete a session and notify its subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let handle = sessions
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        metrics::set_active_sessions(sessions.len());
        drop(sessions);

        // Ignore send errors (no receivers is okay)
        let _ = handle.events.send(SessionEvent::Closed {
            session_id: session_id.to_string(),
        });
        tracing::info!(session_id = %session_id, "Session removed");
        Ok(())
    }

    /// Feed a fragment to a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`], [`SessionError::Validation`] for an
    /// oversized fragment, or [`SessionError::Assembler`] when the fragment is
    /// out of order or arrives after finish.
    pub fn accept(
        &self,
        session_id: &str,
        text: &str,
        seq: Option<u64>,
    ) -> Result<IncrementalResult, SessionError> {
        validate_fragment(text, self.limits.max_fragment_bytes)?;
        let result = self.step(session_id, |assembler| match seq {
            Some(seq) => assembler.accept_sequenced(seq, text),
            None => assembler.accept(text),
        })?;

        metrics::record_fragment(text.len());
        metrics::record_directives(&result.directives, "stream");
        metrics::record_diagnostics(&result.diagnostics);
        Ok(result)
    }

    /// Signal end of stream for a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub fn finish(&self, session_id: &str) -> Result<IncrementalResult, SessionError> {
        let result = self.step(session_id, |assembler| Ok(assembler.finish()))?;
        metrics::record_directives(&result.directives, "stream");
        metrics::record_diagnostics(&result.diagnostics);
        tracing::info!(
            session_id = %session_id,
            components = result.state.len(),
            "Session stream finished"
        );
        Ok(result)
    }

    /// Start the next assistant message in a session.
    ///
    /// The canvas carries over; text and fragment numbering restart.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub fn begin_message(&self, session_id: &str) -> Result<IncrementalResult, SessionError> {
        let result = self.step(session_id, |assembler| Ok(assembler.begin_message()))?;
        tracing::info!(
            session_id = %session_id,
            components = result.state.len(),
            "Session began new message"
        );
        Ok(result)
    }

    /// Decode raw display-model output and apply it to a session.
    ///
    /// Output that decodes to "no action" leaves the session untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::Command`] for a
    /// malformed command.
    pub fn apply_command(
        &self,
        session_id: &str,
        raw: &str,
    ) -> Result<(CommandOutcome, IncrementalResult), SessionError> {
        let outcome = parse_display_command(raw)?;
        metrics::record_diagnostics(&outcome.diagnostics);

        let Some(directive) = outcome.directive.clone() else {
            let snapshot = self.snapshot(session_id)?;
            let unchanged = IncrementalResult {
                text: snapshot.text,
                state: snapshot.state,
                finished: snapshot.finished,
                ..IncrementalResult::default()
            };
            return Ok((outcome, unchanged));
        };

        let result = self.step(session_id, |assembler| Ok(assembler.apply_command(directive)))?;
        metrics::record_directives(&result.directives, "command");
        Ok((outcome, result))
    }

    /// Subscribe to a session's events.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError> {
        let handle = self.handle(session_id)?;
        // Subscribe under the session lock so no update falls between the
        // snapshot and the receiver.
        let session = handle
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let rx = handle.events.subscribe();
        Ok((snapshot(session_id, &session), rx))
    }

    /// Remove every session idle for at least `ttl` and notify its
    /// subscribers. Returns the removed ids.
    pub fn sweep_expired(&self, ttl: Duration) -> Vec<String> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| {
                handle
                    .session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .last_active
                    .elapsed()
                    >= ttl
            })
            .map(|(id, _)| id.clone())
            .collect();

        let removed: Vec<(String, SessionHandle)> = expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|handle| (id, handle)))
            .collect();
        if removed.is_empty() {
            return Vec::new();
        }
        metrics::set_active_sessions(sessions.len());
        drop(sessions);

        metrics::record_sessions_expired(removed.len());
        removed
            .into_iter()
            .map(|(session_id, handle)| {
                // Ignore send errors (no receivers is okay)
                let _ = handle.events.send(SessionEvent::Closed {
                    session_id: session_id.clone(),
                });
                tracing::info!(session_id = %session_id, "Session expired");
                session_id
            })
            .collect()
    }

    /// Catch up a subscriber that lagged behind its event channel.
    ///
    /// Drains what is still queued and returns a snapshot taken under the
    /// session lock, so the next event the receiver yields is the first step
    /// the snapshot does not already contain. Returns `Closed` once the
    /// session is gone.
    pub fn resync(
        &self,
        session_id: &str,
        rx: &mut broadcast::Receiver<SessionEvent>,
    ) -> SessionEvent {
        let closed = || SessionEvent::Closed {
            session_id: session_id.to_string(),
        };
        let Ok(handle) = self.handle(session_id) else {
            return closed();
        };
        let session = handle
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            match rx.try_recv() {
                Ok(SessionEvent::Closed { .. }) => return closed(),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        tracing::debug!(session_id = %session_id, "Resynced lagging subscriber");
        SessionEvent::Snapshot {
            snapshot: snapshot(session_id, &session),
        }
    }

    fn handle(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Run one assembler step and publish its result while the session is
    /// still locked, so subscribers see steps in the order they applied.
    fn step(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut StreamAssembler) -> Result<IncrementalResult, AssemblerError>,
    ) -> Result<IncrementalResult, SessionError> {
        let handle = self.handle(session_id)?;
        let mut session = handle
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut session.assembler)?;
        session.last_active = Instant::now();

        // Ignore send errors (no receivers is okay)
        let _ = handle.events.send(SessionEvent::Update {
            session_id: session_id.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }
}

/// Spawn a task that drops sessions idle for longer than `ttl`, checking
/// every `interval`.
///
/// Returns the task handle and a sender that stops it.
#[must_use]
pub fn spawn_expiry_sweep(
    registry: SessionRegistry,
    ttl: Duration,
    interval: Duration,
) -> (JoinHandle<()>, oneshot::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Don't fire immediately on start
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::debug!("Session expiry sweep stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = registry.sweep_expired(ttl);
                    if !expired.is_empty() {
                        tracing::info!(count = expired.len(), "Expired idle sessions");
                    }
                }
            }
        }
    });

    (handle, shutdown_tx)
}

#[cfg(test)]
impl SessionRegistry {
    /// Panic while holding the map lock.
    pub(crate) fn poison_for_test(&self) {
        let _guard = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        panic!("poisoning session registry");
    }
}

fn snapshot(session_id: &str, session: &Session) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session_id.to_string(),
        text: session.assembler.text().to_string(),
        state: session.assembler.state().clone(),
        finished: session.assembler.is_finished(),
        next_seq: session.assembler.next_seq(),
        created_at: session.created_at,
    }
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
