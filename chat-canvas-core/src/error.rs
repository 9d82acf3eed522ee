//! Error types for the inline command protocol.
//!
//! Scan and decode errors are per-span: the pipeline absorbs them, drops the
//! offending span from both the directive stream and the visible text, and
//! reports them as [`Diagnostic`]s. Only [`AssemblerError`] and
//! [`CanvasError`] reach callers as `Err`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tag::TagName;

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors found while locating spans in a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// An opening marker was closed by a marker for a different tag.
    #[error("mismatched tags: ::{open}:: closed by ::/{close}::")]
    MismatchedTag {
        /// Tag named by the opening marker.
        open: TagName,
        /// Tag named by the closing marker.
        close: TagName,
    },

    /// A closing marker appeared without a matching opener.
    #[error("unexpected closing marker ::/{0}::")]
    UnexpectedClose(TagName),

    /// The stream ended while a block was still open.
    #[error("unterminated ::{0}:: block at end of stream")]
    Unterminated(TagName),
}

/// Errors turning a scanned span into a directive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is not a JSON object.
    #[error("invalid {tag} payload: {reason}")]
    InvalidPayload {
        /// Tag whose payload failed to decode.
        tag: TagName,
        /// Parser message.
        reason: String,
    },

    /// The payload decoded but does not match the component schema.
    #[error("{tag} payload violates schema: {reason}")]
    SchemaViolation {
        /// Tag whose payload was rejected.
        tag: TagName,
        /// Which field was missing or ill-typed.
        reason: String,
    },

    /// The tag name is not part of the protocol.
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// A display command is JSON but not a valid command.
    #[error("invalid display command: {0}")]
    InvalidCommand(String),
}

/// Errors raised by the stream assembler itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    /// A fragment arrived with an unexpected sequence number.
    #[error("out-of-order fragment: expected seq {expected}, got {received}")]
    OutOfOrderFragment {
        /// Next sequence number the assembler accepts.
        expected: u64,
        /// Sequence number carried by the fragment.
        received: u64,
    },

    /// Text arrived after the end-of-stream signal.
    #[error("stream already finished")]
    Finished,
}

/// Top-level error for canvas operations.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Assembler rejected the input.
    #[error(transparent)]
    Assembler(#[from] AssemblerError),

    /// A display command could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// State serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which pipeline stage produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Mismatched, stray or unterminated markers.
    Scan,
    /// Payload or schema failures.
    Decode,
}

/// An absorbed per-span error, kept for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Pipeline stage.
    pub kind: DiagnosticKind,
    /// Human-readable message.
    pub message: String,
    /// Byte offset of the span start in the session buffer.
    pub start: usize,
    /// Byte offset one past the span end.
    pub end: usize,
}

impl Diagnostic {
    /// Build a diagnostic from a scan error.
    #[must_use]
    pub fn scan(error: &ScanError, start: usize, end: usize) -> Self {
        Self {
            kind: DiagnosticKind::Scan,
            message: error.to_string(),
            start,
            end,
        }
    }

    /// Build a diagnostic from a decode error.
    #[must_use]
    pub fn decode(error: &DecodeError, start: usize, end: usize) -> Self {
        Self {
            kind: DiagnosticKind::Decode,
            message: error.to_string(),
            start,
            end,
        }
    }

    /// Emit the diagnostic to the tracing sink.
    pub fn report(&self) {
        tracing::warn!(
            kind = ?self.kind,
            start = self.start,
            end = self.end,
            "Dropped directive: {}",
            self.message
        );
    }
}
