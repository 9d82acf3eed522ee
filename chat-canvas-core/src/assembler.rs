//! Stream assembler - incremental parsing of streamed text.
//!
//! The assembler owns one session's buffer. Each fragment is appended and the
//! whole buffer is rescanned; only spans that ended past the processed offset
//! are decoded, so every directive is applied exactly once. An open
//! `::canvas::` block is the exception: it is re-decoded on every fragment
//! under one id until its closing marker (or [`StreamAssembler::finish`])
//! arrives.
//!
//! A session can hold several assistant messages in turn. Each one starts with
//! [`StreamAssembler::begin_message`], which empties the text buffer while the
//! canvas and the id counter carry over.
//!
//! ```text
//! fragment ─► buffer ─► scan ─► decode (new spans) ─► reduce ─► IncrementalResult
//!                                                        │
//!                                  visible text ◄── extract
//! ```

use serde::{Deserialize, Serialize};

use crate::decoder::Decoder;
use crate::directive::Directive;
use crate::error::{AssemblerError, Diagnostic};
use crate::extractor::extract;
use crate::parser::run_pass;
use crate::state::CanvasState;

/// What changed after one assembler step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalResult {
    /// Newly visible text, to append to what was shown before.
    pub text_delta: String,
    /// The full visible text so far.
    pub text: String,
    /// Directives applied in this step, in order.
    pub directives: Vec<Directive>,
    /// Canvas state after the step.
    pub state: CanvasState,
    /// Errors absorbed in this step.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the stream has ended.
    pub finished: bool,
    /// Set when the visible text no longer extends the previous text; the
    /// consumer must replace rather than append.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset: bool,
}

/// Per-session incremental parser.
#[derive(Debug, Clone, Default)]
pub struct StreamAssembler {
    buffer: String,
    state: CanvasState,
    decoder: Decoder,
    /// End of the last span that will not be decoded again.
    processed: usize,
    /// Residual text already handed out.
    visible: String,
    /// Sequence number expected by [`StreamAssembler::accept_sequenced`].
    next_seq: u64,
    finished: bool,
}

impl StreamAssembler {
    /// Create an assembler with an empty buffer and canvas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and apply whatever it completed.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::Finished`] for non-empty text after
    /// [`StreamAssembler::finish`]. An empty fragment after finishing is a
    /// no-op.
    pub fn accept(&mut self, fragment: &str) -> Result<IncrementalResult, AssemblerError> {
        if self.finished {
            if fragment.is_empty() {
                return Ok(self.unchanged());
            }
            return Err(AssemblerError::Finished);
        }

        self.next_seq += 1;
        self.buffer.push_str(fragment);
        tracing::debug!(
            bytes = fragment.len(),
            buffered = self.buffer.len(),
            "Accepted fragment"
        );
        Ok(self.step(false))
    }

    /// Append a fragment that carries a sequence number.
    ///
    /// Sequence numbers start at 0 and count every accepted fragment,
    /// sequenced or not.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::OutOfOrderFragment`] when `seq` is not the
    /// next expected number; the fragment is not buffered. Otherwise as
    /// [`StreamAssembler::accept`].
    pub fn accept_sequenced(
        &mut self,
        seq: u64,
        fragment: &str,
    ) -> Result<IncrementalResult, AssemblerError> {
        if seq != self.next_seq {
            tracing::warn!(expected = self.next_seq, received = seq, "Rejected out-of-order fragment");
            return Err(AssemblerError::OutOfOrderFragment {
                expected: self.next_seq,
                received: seq,
            });
        }
        self.accept(fragment)
    }

    /// Signal end of stream.
    ///
    /// Closes an open canvas block, drops an unterminated opener and releases
    /// a held partial marker as text. Calling it again is a no-op.
    pub fn finish(&mut self) -> IncrementalResult {
        if self.finished {
            return self.unchanged();
        }
        let mut result = self.step(true);
        self.finished = true;
        result.finished = true;
        tracing::debug!(components = self.state.len(), "Stream finished");
        result
    }

    /// Start the next message of a multi-turn conversation.
    ///
    /// Clears the buffer and visible text, reopens a finished stream and
    /// restarts fragment numbering at 0. Canvas state is kept, and ids
    /// synthesized for later messages never repeat earlier ones. A canvas
    /// block still streaming in the previous message is left as it was.
    pub fn begin_message(&mut self) -> IncrementalResult {
        self.buffer.clear();
        self.visible.clear();
        self.processed = 0;
        self.next_seq = 0;
        self.finished = false;
        self.decoder.end_message();
        tracing::debug!(components = self.state.len(), "Began new message");
        IncrementalResult {
            reset: true,
            ..self.unchanged()
        }
    }

    /// Apply a directive that did not come from the text stream.
    pub fn apply_command(&mut self, directive: Directive) -> IncrementalResult {
        if let Some(id) = directive.target() {
            self.decoder.reserve(id);
        }
        self.state = std::mem::take(&mut self.state).apply(&directive);
        IncrementalResult {
            directives: vec![directive],
            ..self.unchanged()
        }
    }

    /// Current canvas state.
    #[must_use]
    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    /// Visible text so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.visible
    }

    /// Raw buffer, markup included.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether [`StreamAssembler::finish`] has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Sequence number the next sequenced fragment must carry.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    fn unchanged(&self) -> IncrementalResult {
        IncrementalResult {
            text_delta: String::new(),
            text: self.visible.clone(),
            directives: Vec::new(),
            state: self.state.clone(),
            diagnostics: Vec::new(),
            finished: self.finished,
            reset: false,
        }
    }

    fn step(&mut self, finishing: bool) -> IncrementalResult {
        let pass = run_pass(&mut self.decoder, &self.buffer, self.processed, finishing);
        self.processed = pass.processed;

        let mut directives = Vec::with_capacity(pass.directives.len());
        for directive in pass.directives {
            if self.is_redundant(&directive) {
                continue;
            }
            self.state = std::mem::take(&mut self.state).apply(&directive);
            directives.push(directive);
        }

        let text = extract(&self.buffer, &pass.removed);
        let (text_delta, reset) = match text.strip_prefix(self.visible.as_str()) {
            Some(delta) => (delta.to_string(), false),
            None => {
                tracing::warn!(
                    previous = self.visible.len(),
                    current = text.len(),
                    "Visible text no longer extends previous output"
                );
                (text.clone(), true)
            }
        };
        self.visible.clone_from(&text);

        IncrementalResult {
            text_delta,
            text,
            directives,
            state: self.state.clone(),
            diagnostics: pass.diagnostics,
            finished: false,
            reset,
        }
    }

    /// A raw-markup refresh that matches the current record changes nothing.
    fn is_redundant(&self, directive: &Directive) -> bool {
        let Directive::RenderRawMarkup { id, html, complete } = directive else {
            return false;
        };
        self.state
            .get(id)
            .is_some_and(|record| record.html() == Some(html.as_str()) && record.is_complete() == *complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;

    fn accept(assembler: &mut StreamAssembler, fragment: &str) -> IncrementalResult {
        assembler.accept(fragment).expect("should accept")
    }

    #[test]
    fn test_split_tag_matches_single_fragment() {
        let mut split = StreamAssembler::new();
        let first = accept(&mut split, r#"::table::{"a":1}"#);
        assert!(first.directives.is_empty());
        assert_eq!(first.text, "");
        let second = accept(&mut split, "::/table::");
        assert_eq!(second.directives.len(), 1);

        let mut whole = StreamAssembler::new();
        accept(&mut whole, r#"::table::{"a":1}::/table::"#);

        assert_eq!(split.state(), whole.state());
        assert_eq!(split.text(), whole.text());
    }

    #[test]
    fn test_text_delta_progression() {
        let mut assembler = StreamAssembler::new();
        assert_eq!(accept(&mut assembler, "Result: ").text_delta, "Result:");
        assert_eq!(accept(&mut assembler, "::met").text_delta, "");
        assert_eq!(accept(&mut assembler, r#"ric::{"title":"CTR","value":1}"#).text_delta, "");
        let closed = accept(&mut assembler, "::/metric:: Thanks!");
        assert_eq!(closed.text_delta, "  Thanks!");
        assert_eq!(closed.text, "Result:  Thanks!");
        assert_eq!(closed.state.len(), 1);
        assert!(!closed.reset);
    }

    #[test]
    fn test_directive_applied_once() {
        let mut assembler = StreamAssembler::new();
        accept(&mut assembler, "::panel::{\"content\":\"x\"}::/panel::");
        let later = accept(&mut assembler, " more text");
        assert!(later.directives.is_empty());
        assert_eq!(later.state.len(), 1);
    }

    #[test]
    fn test_open_canvas_progressive_reveal() {
        let mut assembler = StreamAssembler::new();
        let first = accept(&mut assembler, "Look: ::canvas::<div>");
        let second = accept(&mut assembler, "Hello");
        let done = assembler.finish();

        let first_id = first.directives[0].target().cloned().expect("canvas id");
        assert_eq!(second.directives[0].target(), Some(&first_id));
        assert_eq!(done.directives[0].target(), Some(&first_id));

        let record = done.state.get(&first_id).expect("canvas record");
        assert_eq!(record.component_type, ComponentType::RawMarkup);
        assert_eq!(record.html(), Some("<div>Hello"));
        assert!(record.is_complete());
        assert_eq!(done.state.len(), 1);
        assert!(done.finished);
        assert_eq!(done.text, "Look:");
    }

    #[test]
    fn test_canvas_closed_in_stream() {
        let mut assembler = StreamAssembler::new();
        let open = accept(&mut assembler, "::canvas::<p>hi");
        let closed = accept(&mut assembler, "</p>::/canvas:: after");
        let id = open.directives[0].target().cloned().expect("canvas id");

        assert_eq!(
            closed.directives,
            vec![Directive::RenderRawMarkup {
                id: id.clone(),
                html: "<p>hi</p>".to_string(),
                complete: true,
            }]
        );
        assert_eq!(closed.text, "after");

        let finished = assembler.finish();
        assert!(finished.directives.is_empty());
        assert_eq!(finished.state.len(), 1);
    }

    #[test]
    fn test_unchanged_canvas_is_not_reapplied() {
        let mut assembler = StreamAssembler::new();
        accept(&mut assembler, "::canvas::<p>");
        let again = accept(&mut assembler, "");
        assert!(again.directives.is_empty());
    }

    #[test]
    fn test_finish_drops_unterminated_opener() {
        let mut assembler = StreamAssembler::new();
        accept(&mut assembler, "Data: ::table::{\"rows\":[1,");
        let done = assembler.finish();

        assert!(done.directives.is_empty());
        assert_eq!(done.text, "Data:");
        assert_eq!(done.diagnostics.len(), 1);
        assert!(done.diagnostics[0].message.contains("unterminated"));
    }

    #[test]
    fn test_finish_releases_partial_marker() {
        let mut assembler = StreamAssembler::new();
        assert_eq!(accept(&mut assembler, "ends with ::ta").text, "ends with");
        let done = assembler.finish();
        assert_eq!(done.text_delta, " ::ta");
        assert_eq!(done.text, "ends with ::ta");
    }

    #[test]
    fn test_accept_after_finish() {
        let mut assembler = StreamAssembler::new();
        accept(&mut assembler, "::metric::{\"title\":\"a\",\"value\":1}::/metric::");
        let done = assembler.finish();

        let idle = assembler.accept("").expect("empty fragment is a no-op");
        assert_eq!(idle.state, done.state);
        assert!(idle.directives.is_empty());
        assert!(idle.finished);

        assert_eq!(assembler.accept("more"), Err(AssemblerError::Finished));
        assert_eq!(assembler.finish().state, done.state);
    }

    #[test]
    fn test_sequenced_fragments() {
        let mut assembler = StreamAssembler::new();
        assembler.accept_sequenced(0, "a").expect("seq 0");
        assert_eq!(
            assembler.accept_sequenced(2, "c"),
            Err(AssemblerError::OutOfOrderFragment {
                expected: 1,
                received: 2
            })
        );
        assembler.accept_sequenced(1, "b").expect("seq 1");
        assert_eq!(assembler.text(), "ab");
        assert_eq!(assembler.next_seq(), 2);
    }

    #[test]
    fn test_apply_command() {
        let mut assembler = StreamAssembler::new();
        accept(&mut assembler, "::panel::{\"id\":\"p\",\"content\":\"x\"}::/panel::");

        let result = assembler.apply_command(Directive::DestroyComponent { id: "p".into() });
        assert!(result.state.is_empty());
        assert_eq!(result.directives.len(), 1);
        assert_eq!(result.text_delta, "");
    }

    #[test]
    fn test_malformed_directive_is_absorbed() {
        let mut assembler = StreamAssembler::new();
        let result = accept(&mut assembler, "x ::chart::{\"type\":\"line\"}::/chart:: y");
        assert!(result.directives.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.text, "x  y");
    }

    #[test]
    fn test_begin_message_keeps_canvas() {
        let mut assembler = StreamAssembler::new();
        accept(&mut assembler, "First ::panel::{\"content\":\"a\"}::/panel::");
        assembler.finish();

        let began = assembler.begin_message();
        assert!(began.reset);
        assert_eq!(began.text, "");
        assert!(!began.finished);
        assert_eq!(began.state.len(), 1);
        assert_eq!(assembler.next_seq(), 0);

        let second = assembler
            .accept_sequenced(0, "Second ::panel::{\"content\":\"b\"}::/panel::")
            .expect("new message accepts fragments");
        assert_eq!(second.text, "Second");
        assert_eq!(second.state.len(), 2);
        let ids = second.state.ids();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_later_message_updates_and_clears() {
        let mut assembler = StreamAssembler::new();
        accept(&mut assembler, "::metric::{\"id\":\"ctr\",\"title\":\"CTR\",\"value\":\"3%\"}::/metric::");
        accept(&mut assembler, "::panel::{\"id\":\"notes\",\"content\":\"x\"}::/panel::");
        assembler.finish();

        assembler.begin_message();
        let updated = accept(
            &mut assembler,
            "::metric::{\"id\":\"ctr\",\"title\":\"CTR\",\"value\":\"4%\"}::/metric::",
        );
        assert_eq!(updated.state.len(), 2);
        let record = updated.state.get(&"ctr".into()).expect("metric record");
        assert_eq!(record.props["value"], "4%");

        assembler.finish();
        assembler.begin_message();
        let cleared = accept(&mut assembler, "Starting over ::clear::");
        assert!(cleared.state.is_empty());
        assert_eq!(cleared.text, "Starting over");
    }

    #[test]
    fn test_command_ids_are_not_resynthesized() {
        let mut assembler = StreamAssembler::new();
        let record = crate::component::ComponentRecord::new("panel-1".into(), ComponentType::TextPanel);
        assembler.apply_command(Directive::RenderComponent(record));

        let result = accept(&mut assembler, "::panel::{\"content\":\"x\"}::/panel::");
        assert_eq!(result.state.len(), 2);
        assert!(result.state.contains(&"panel-2".into()));
    }
}
