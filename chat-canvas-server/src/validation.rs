//! Limits on client-supplied input.
//!
//! Session ids end up in URL paths, log fields and metric labels, and
//! fragments are buffered for the lifetime of a session, so both are checked
//! before they reach the registry.

use thiserror::Error;

/// Longest accepted session id.
pub const MAX_SESSION_ID_LEN: usize = 64;
/// Default maximum size of one text fragment.
pub const DEFAULT_MAX_FRAGMENT_BYTES: usize = 65_536; // 64KB
/// Default maximum number of live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;
/// Largest WebSocket text frame accepted.
pub const MAX_WS_MESSAGE_SIZE: usize = 1_048_576; // 1MB

/// Rejected input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Longer than [`MAX_SESSION_ID_LEN`].
    #[error("session_id too long (max {MAX_SESSION_ID_LEN} chars)")]
    SessionIdTooLong,
    /// Empty, or not limited to ASCII letters, digits, `-` and `_`.
    #[error("session_id must be non-empty ASCII letters, digits, '-' or '_'")]
    SessionIdInvalidChars,
    /// Fragment exceeds the configured size.
    #[error("fragment too large (max {max} bytes)")]
    FragmentTooLarge {
        /// Configured limit.
        max: usize,
    },
    /// No room for another session.
    #[error("too many sessions (max {max})")]
    TooManySessions {
        /// Configured limit.
        max: usize,
    },
    /// WebSocket frame larger than [`MAX_WS_MESSAGE_SIZE`].
    #[error("websocket message exceeds {MAX_WS_MESSAGE_SIZE} bytes")]
    MessageTooLarge,
}

impl ValidationError {
    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionIdTooLong | Self::SessionIdInvalidChars => "session_id",
            Self::FragmentTooLarge { .. } => "fragment",
            Self::TooManySessions { .. } => "session_count",
            Self::MessageTooLarge => "message",
        }
    }
}

/// Check a session id. UUIDs and slugs such as `chat-1` pass.
///
/// # Errors
///
/// [`ValidationError::SessionIdTooLong`] past 64 bytes,
/// [`ValidationError::SessionIdInvalidChars`] when empty or containing
/// anything but ASCII alphanumerics, `-` and `_`.
pub fn validate_session_id(id: &str) -> Result<(), ValidationError> {
    match id.len() {
        0 => Err(ValidationError::SessionIdInvalidChars),
        len if len > MAX_SESSION_ID_LEN => Err(ValidationError::SessionIdTooLong),
        _ if id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_')) =>
        {
            Ok(())
        }
        _ => Err(ValidationError::SessionIdInvalidChars),
    }
}

/// Validate a fragment against the configured limit.
///
/// # Errors
///
/// Returns [`ValidationError::FragmentTooLarge`] if the text exceeds `max` bytes.
pub fn validate_fragment(text: &str, max: usize) -> Result<(), ValidationError> {
    if text.len() > max {
        return Err(ValidationError::FragmentTooLarge { max });
    }
    Ok(())
}

/// Validate that one more session fits.
///
/// # Errors
///
/// Returns [`ValidationError::TooManySessions`] if `count` has reached `max`.
pub fn validate_session_count(count: usize, max: usize) -> Result<(), ValidationError> {
    if count >= max {
        return Err(ValidationError::TooManySessions { max });
    }
    Ok(())
}

/// Check the size of an inbound WebSocket frame.
///
/// # Errors
///
/// Returns [`ValidationError::MessageTooLarge`] above [`MAX_WS_MESSAGE_SIZE`].
pub fn validate_message_size(size: usize) -> Result<(), ValidationError> {
    if size > MAX_WS_MESSAGE_SIZE {
        return Err(ValidationError::MessageTooLarge);
    }
    Ok(())
}
