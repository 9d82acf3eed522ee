//! # Chat Canvas Server Library
//!
//! HTTP, SSE and WebSocket surface over [`chat_canvas_core`].
//! This library is used by both the binary and integration tests.
//!
//! A client creates a session, streams assistant text into it fragment by
//! fragment and receives `{textDelta, state}` updates, either as direct
//! responses or pushed over SSE/WebSocket to every subscriber of the session.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use axum::{
    routing::{get, post},
    Router,
};
use tokio::{sync::oneshot, task::JoinHandle};

pub mod config;
pub mod events;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod sessions;
pub mod validation;
pub mod ws;

pub use config::{CliArgs, ServerConfig};
pub use sessions::{
    spawn_expiry_sweep, RegistryLimits, SessionError, SessionEvent, SessionRegistry,
    SessionSnapshot,
};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live sessions.
    pub sessions: SessionRegistry,
    /// Resolved configuration.
    pub config: ServerConfig,
}

impl AppState {
    /// Bundle a registry with its configuration.
    #[must_use]
    pub fn new(sessions: SessionRegistry, config: ServerConfig) -> Self {
        Self { sessions, config }
    }

    /// Build state with a fresh registry sized by `config`.
    #[must_use]
    pub fn from_config(config: ServerConfig) -> Self {
        Self::new(SessionRegistry::with_limits(config.limits), config)
    }

    /// Start dropping idle sessions as configured.
    ///
    /// Returns `None` when expiry is disabled, otherwise the sweep task and
    /// a sender that stops it.
    #[must_use]
    pub fn spawn_expiry_sweep(&self) -> Option<(JoinHandle<()>, oneshot::Sender<()>)> {
        let ttl = self.config.session_ttl?;
        tracing::info!(
            ttl_secs = ttl.as_secs(),
            interval_secs = self.config.sweep_interval.as_secs(),
            "Session expiry enabled"
        );
        Some(spawn_expiry_sweep(
            self.sessions.clone(),
            ttl,
            self.config.sweep_interval,
        ))
    }
}

/// API, event and health routes, without transport layers.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check endpoints (Kubernetes probes)
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api/parse", post(routes::parse_handler))
        .route("/api/sessions", post(routes::create_session))
        .route(
            "/api/sessions/{id}",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route("/api/sessions/{id}/fragments", post(routes::post_fragment))
        .route("/api/sessions/{id}/finish", post(routes::finish_session))
        .route("/api/sessions/{id}/messages", post(routes::begin_message))
        .route("/api/sessions/{id}/commands", post(routes::post_command))
        .route("/api/sessions/{id}/events", get(events::stream_handler))
        .route("/ws/{id}", get(ws::websocket_handler))
        .with_state(state)
}
