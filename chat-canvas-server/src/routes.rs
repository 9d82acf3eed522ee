//! API route handlers.
//!
//! ## Endpoints
//!
//! - `POST /api/parse` - one-shot parse of a complete message
//! - `POST /api/sessions` - create a session
//! - `GET /api/sessions/{id}` - session snapshot
//! - `DELETE /api/sessions/{id}` - discard a session
//! - `POST /api/sessions/{id}/fragments` - append streamed text
//! - `POST /api/sessions/{id}/finish` - end of stream
//! - `POST /api/sessions/{id}/commands` - apply display-model output

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use chat_canvas_core::{
    parse, AssemblerError, CanvasState, DecodeError, Diagnostic, Directive, IncrementalResult,
    ParseResult,
};

use crate::metrics::record_validation_failure;
use crate::sessions::{SessionError, SessionSnapshot};
use crate::validation::{validate_fragment, validate_session_id, ValidationError};
use crate::AppState;

/// Error returned by API handlers, rendered as `{"error": code, "message": text}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        record_validation_failure(error.kind());
        let (status, code) = match error {
            ValidationError::TooManySessions { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "too_many_sessions")
            }
            ValidationError::FragmentTooLarge { .. } | ValidationError::MessageTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            ValidationError::SessionIdTooLong | ValidationError::SessionIdInvalidChars => {
                (StatusCode::BAD_REQUEST, "invalid_session_id")
            }
        };
        Self {
            status,
            code,
            message: error.to_string(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        let (status, code) = match &error {
            SessionError::NotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            SessionError::AlreadyExists(_) => (StatusCode::CONFLICT, "session_exists"),
            SessionError::Validation(validation) => return validation.clone().into(),
            SessionError::Assembler(AssemblerError::OutOfOrderFragment { .. }) => {
                (StatusCode::CONFLICT, "out_of_order")
            }
            SessionError::Assembler(AssemblerError::Finished) => {
                (StatusCode::CONFLICT, "stream_finished")
            }
            SessionError::Command(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_command"),
        };
        Self {
            status,
            code,
            message: error.to_string(),
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(error: DecodeError) -> Self {
        SessionError::Command(error).into()
    }
}

/// Request body for `POST /api/parse`.
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    /// Complete assistant message.
    pub text: String,
}

/// Response body for `POST /api/parse`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParseResponse {
    /// Directives, residual text and diagnostics.
    #[serde(flatten)]
    pub result: ParseResult,
    /// Canvas after applying the directives to an empty state.
    pub state: CanvasState,
}

/// One-shot parse of a complete message.
///
/// # Errors
///
/// Returns 413 if the text exceeds the configured fragment limit.
#[tracing::instrument(name = "parse", skip(state, request), fields(len = request.text.len()))]
pub async fn parse_handler(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParseResponse>, ApiError> {
    validate_fragment(&request.text, state.sessions.limits().max_fragment_bytes)?;
    let result = parse(&request.text);
    let canvas = CanvasState::new().apply_all(&result.directives);
    Ok(Json(ParseResponse {
        result,
        state: canvas,
    }))
}

/// Request body for `POST /api/sessions`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Explicit id; a UUID is generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Create a session.
///
/// # Errors
///
/// Returns 400 for a malformed id, 409 for a taken id and 503 when the
/// registry is full.
#[tracing::instrument(name = "create_session", skip(state))]
pub async fn create_session(
    State(state): State<AppState>,
    request: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let snapshot = state.sessions.create(request.session_id)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Get a session snapshot.
///
/// # Errors
///
/// Returns 400 for a malformed id and 404 for an unknown session.
#[tracing::instrument(name = "get_session", skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    validate_session_id(&session_id)?;
    Ok(Json(state.sessions.snapshot(&session_id)?))
}

/// Discard a session.
///
/// # Errors
///
/// Returns 400 for a malformed id and 404 for an unknown session.
#[tracing::instrument(name = "delete_session", skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    validate_session_id(&session_id)?;
    state.sessions.remove(&session_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for `POST /api/sessions/{id}/fragments`.
#[derive(Debug, Deserialize)]
pub struct FragmentRequest {
    /// Streamed text.
    pub text: String,
    /// Optional sequence number, enforced when present.
    #[serde(default)]
    pub seq: Option<u64>,
}

/// Append a fragment to a session.
///
/// # Errors
///
/// Returns 404 for an unknown session, 413 for an oversized fragment and 409
/// for an out-of-order fragment or one arriving after finish.
#[tracing::instrument(name = "post_fragment", skip(state, request), fields(seq = ?request.seq))]
pub async fn post_fragment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<FragmentRequest>,
) -> Result<Json<IncrementalResult>, ApiError> {
    validate_session_id(&session_id)?;
    let result = state
        .sessions
        .accept(&session_id, &request.text, request.seq)?;
    Ok(Json(result))
}

/// Signal end of stream.
///
/// # Errors
///
/// Returns 404 for an unknown session.
#[tracing::instrument(name = "finish_session", skip(state))]
pub async fn finish_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<IncrementalResult>, ApiError> {
    validate_session_id(&session_id)?;
    Ok(Json(state.sessions.finish(&session_id)?))
}

/// Start the next assistant message in a session.
///
/// The canvas carries over; visible text and fragment numbering restart.
///
/// # Errors
///
/// Returns 404 for an unknown session.
#[tracing::instrument(name = "begin_message", skip(state))]
pub async fn begin_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<IncrementalResult>, ApiError> {
    validate_session_id(&session_id)?;
    Ok(Json(state.sessions.begin_message(&session_id)?))
}

/// Response body for `POST /api/sessions/{id}/commands`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Decoded directive, absent for "no action".
    pub directive: Option<Directive>,
    /// Problems absorbed while decoding.
    pub diagnostics: Vec<Diagnostic>,
    /// Canvas after applying the directive.
    pub state: CanvasState,
}

/// Apply raw display-model output to a session.
///
/// The body is taken verbatim: JSON, fenced JSON, or free text meaning
/// "no action".
///
/// # Errors
///
/// Returns 404 for an unknown session and 422 for JSON that is not a valid
/// command.
#[tracing::instrument(name = "post_command", skip(state, body), fields(len = body.len()))]
pub async fn post_command(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: String,
) -> Result<Json<CommandResponse>, ApiError> {
    validate_session_id(&session_id)?;
    let (outcome, result) = state.sessions.apply_command(&session_id, &body)?;
    Ok(Json(CommandResponse {
        directive: outcome.directive,
        diagnostics: outcome.diagnostics,
        state: result.state,
    }))
}
