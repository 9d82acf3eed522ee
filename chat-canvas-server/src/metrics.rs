//! Prometheus metrics for chat-canvas-server.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use chat_canvas_core::{Diagnostic, DiagnosticKind, Directive};

// Metric names as constants for consistency
const FRAGMENTS_TOTAL: &str = "chat_canvas_fragments_total";
const FRAGMENT_BYTES_TOTAL: &str = "chat_canvas_fragment_bytes_total";
const DIRECTIVES_TOTAL: &str = "chat_canvas_directives_total";
const DIAGNOSTICS_TOTAL: &str = "chat_canvas_diagnostics_total";
const SESSIONS_ACTIVE: &str = "chat_canvas_sessions_active";
const SESSIONS_EXPIRED_TOTAL: &str = "chat_canvas_sessions_expired_total";
const SUBSCRIBER_RESYNCS_TOTAL: &str = "chat_canvas_subscriber_resyncs_total";
const WS_CONNECTIONS_ACTIVE: &str = "chat_canvas_ws_connections_active";
const WS_MESSAGES_TOTAL: &str = "chat_canvas_ws_messages_total";
const VALIDATION_FAILURES_TOTAL: &str = "chat_canvas_validation_failures_total";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record an accepted fragment.
pub fn record_fragment(bytes: usize) {
    counter!(FRAGMENTS_TOTAL).increment(1);
    counter!(FRAGMENT_BYTES_TOTAL).increment(bytes as u64);
}

/// Record applied directives, labelled by kind.
///
/// # Arguments
///
/// * `directives` - Directives applied in one step
/// * `source` - "stream" or "command"
pub fn record_directives(directives: &[Directive], source: &'static str) {
    for directive in directives {
        counter!(
            DIRECTIVES_TOTAL,
            "kind" => directive_kind(directive),
            "source" => source
        )
        .increment(1);
    }
}

/// Record absorbed diagnostics, labelled by pipeline stage.
pub fn record_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let stage = match diagnostic.kind {
            DiagnosticKind::Scan => "scan",
            DiagnosticKind::Decode => "decode",
        };
        counter!(DIAGNOSTICS_TOTAL, "stage" => stage).increment(1);
    }
}

/// Update the live session count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!(SESSIONS_ACTIVE).set(count as f64);
}

/// Record sessions dropped for being idle.
pub fn record_sessions_expired(count: usize) {
    counter!(SESSIONS_EXPIRED_TOTAL).increment(count as u64);
}

/// Record a lagging subscriber resynced from a snapshot.
///
/// # Arguments
///
/// * `transport` - "sse" or "ws"
pub fn record_subscriber_resync(transport: &'static str) {
    counter!(SUBSCRIBER_RESYNCS_TOTAL, "transport" => transport).increment(1);
}

/// Increment active WebSocket connections.
pub fn inc_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement active WebSocket connections.
pub fn dec_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a WebSocket message.
///
/// # Arguments
///
/// * `direction` - "inbound" or "outbound"
/// * `msg_type` - Message type (e.g., "fragment", "finish", "update")
pub fn record_ws_message(direction: &str, msg_type: &str) {
    counter!(
        WS_MESSAGES_TOTAL,
        "direction" => direction.to_string(),
        "type" => msg_type.to_string()
    )
    .increment(1);
}

/// Record an input validation failure.
///
/// # Arguments
///
/// * `validation_type` - Type of validation that failed (session_id, fragment, etc.)
pub fn record_validation_failure(validation_type: &str) {
    counter!(
        VALIDATION_FAILURES_TOTAL,
        "type" => validation_type.to_string()
    )
    .increment(1);
}

fn directive_kind(directive: &Directive) -> &'static str {
    match directive {
        Directive::RenderComponent(_) => "render_component",
        Directive::UpdateComponent { .. } => "update_component",
        Directive::DestroyComponent { .. } => "destroy_component",
        Directive::ClearCanvas => "clear_canvas",
        Directive::RenderRawMarkup { .. } => "render_raw_markup",
    }
}
