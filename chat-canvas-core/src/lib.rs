//! # Chat Canvas Core
//!
//! Inline command protocol for chat-driven canvases.
//!
//! Assistant text streams in with embedded markup such as
//! `::metric::{"title":"CTR","value":"3.4%"}::/metric::`. This crate finds
//! that markup, turns it into directives, applies them to a canvas state and
//! hands back the text with the markup removed, fragment by fragment.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              StreamAssembler                │
//! │  - buffer, processed offset, visible text   │
//! ├─────────────────────────────────────────────┤
//! │  Scanner          │  Decoder                │
//! │  - spans          │  - JSON payloads        │
//! │  - rejected       │  - per-tag schemas      │
//! │  - pending tail   │  - ids, layout children │
//! ├─────────────────────────────────────────────┤
//! │  Extractor        │  CanvasState reducer    │
//! │  - residual text  │  - render/update/clear  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Display commands from a secondary model pass decode into the same
//! [`Directive`] type through [`parse_display_command`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assembler;
pub mod command;
pub mod component;
pub mod decoder;
pub mod directive;
pub mod error;
pub mod extractor;
pub mod parser;
pub mod scanner;
pub mod schema;
pub mod state;
pub mod tag;

pub use assembler::{IncrementalResult, StreamAssembler};
pub use command::{parse_display_command, CommandOutcome, DisplayCommand};
pub use component::{ComponentId, ComponentRecord, ComponentType, Position, Props, Size};
pub use decoder::Decoder;
pub use directive::{Directive, ParseResult};
pub use error::{
    AssemblerError, CanvasError, CanvasResult, DecodeError, Diagnostic, DiagnosticKind, ScanError,
};
pub use extractor::extract;
pub use parser::parse;
pub use scanner::{scan, Pending, PendingKind, RawSpan, RejectedSpan, ScanOutput};
pub use schema::ComponentPayload;
pub use state::CanvasState;
pub use tag::TagName;

/// Chat canvas core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
