//! One scan/decode/extract pass over a buffer.
//!
//! [`parse`] treats its input as a complete message. The stream assembler
//! drives the same pass incrementally through [`run_pass`], starting from the
//! offset it has already applied.

use std::ops::Range;

use crate::decoder::Decoder;
use crate::directive::{Directive, ParseResult};
use crate::error::{Diagnostic, ScanError};
use crate::extractor::extract;
use crate::scanner::{scan, PendingKind, RawSpan, RejectedSpan};

/// Parse a complete message.
///
/// Every recognized span is removed from the residual text. An open
/// `::canvas::` block is reported complete and an unterminated opener of any
/// other tag is dropped with a diagnostic.
#[must_use]
pub fn parse(text: &str) -> ParseResult {
    let mut decoder = Decoder::new();
    let pass = run_pass(&mut decoder, text, 0, true);
    ParseResult {
        residual_text: extract(text, &pass.removed),
        directives: pass.directives,
        diagnostics: pass.diagnostics,
    }
}

/// Output of [`run_pass`].
#[derive(Debug, Default)]
pub(crate) struct Pass {
    /// Directives for spans that ended past the starting offset.
    pub directives: Vec<Directive>,
    /// Errors absorbed along the way.
    pub diagnostics: Vec<Diagnostic>,
    /// Every range the extractor must delete from the buffer.
    pub removed: Vec<Range<usize>>,
    /// End of the last span that will never be decoded again.
    pub processed: usize,
}

enum Found<'s, 'a> {
    Span(&'s RawSpan<'a>),
    Rejected(&'s RejectedSpan),
}

impl Found<'_, '_> {
    fn start(&self) -> usize {
        match self {
            Self::Span(span) => span.start,
            Self::Rejected(rejected) => rejected.start,
        }
    }
}

/// Scan `buffer` and decode what ended after `processed`.
///
/// An unterminated canvas span is decoded on every pass while `finishing` is
/// false, so its component keeps refreshing. When `finishing` is set the
/// buffer is final: an open canvas is closed and a pending opener is dropped.
pub(crate) fn run_pass(decoder: &mut Decoder, buffer: &str, processed: usize, finishing: bool) -> Pass {
    let output = scan(buffer);
    let mut pass = Pass {
        processed,
        ..Pass::default()
    };

    let mut found: Vec<Found<'_, '_>> = output
        .spans
        .iter()
        .map(Found::Span)
        .chain(output.rejected.iter().map(Found::Rejected))
        .collect();
    found.sort_by_key(Found::start);

    for item in found {
        match item {
            Found::Rejected(rejected) => {
                if rejected.end > processed {
                    pass.diagnostics
                        .push(Diagnostic::scan(&rejected.error, rejected.start, rejected.end));
                    pass.processed = pass.processed.max(rejected.end);
                }
            }
            Found::Span(span) if !span.terminated => {
                let directive = if finishing {
                    pass.processed = pass.processed.max(span.end);
                    decoder.decode_finished(span)
                } else {
                    // Same decoder, same start offset: the id stays stable.
                    match decoder.decode(span) {
                        Ok(directive) => directive,
                        Err(e) => {
                            pass.diagnostics.push(Diagnostic::decode(&e, span.start, span.end));
                            continue;
                        }
                    }
                };
                pass.directives.push(directive);
            }
            Found::Span(span) => {
                if span.end <= processed {
                    continue;
                }
                pass.processed = pass.processed.max(span.end);
                match decoder.decode(span) {
                    Ok(directive) => pass.directives.push(directive),
                    Err(e) => pass.diagnostics.push(Diagnostic::decode(&e, span.start, span.end)),
                }
                pass.diagnostics.extend(decoder.take_diagnostics());
            }
        }
    }

    pass.removed = output.removed_ranges(false, buffer.len());
    if let Some(pending) = output.pending {
        match pending.kind {
            PendingKind::OpenTag(tag) if finishing => {
                pass.diagnostics.push(Diagnostic::scan(
                    &ScanError::Unterminated(tag),
                    pending.start,
                    buffer.len(),
                ));
                pass.processed = buffer.len();
                pass.removed.push(pending.start..buffer.len());
            }
            // A trailing fragment that never became a marker is plain text.
            PendingKind::PartialMarker if finishing => {}
            _ => pass.removed.push(pending.start..buffer.len()),
        }
    }

    for diagnostic in &pass.diagnostics {
        diagnostic.report();
    }
    tracing::debug!(
        directives = pass.directives.len(),
        diagnostics = pass.diagnostics.len(),
        processed = pass.processed,
        "Scan pass complete"
    );

    pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;
    use serde_json::json;

    #[test]
    fn test_parse_metric_example() {
        let result = parse(r#"Result: ::metric::{"title":"CTR","value":"3.4%"}::/metric:: Thanks!"#);

        assert_eq!(result.residual_text, "Result:  Thanks!");
        assert_eq!(result.directives.len(), 1);
        match &result.directives[0] {
            Directive::RenderComponent(record) => {
                assert_eq!(record.component_type, ComponentType::MetricCard);
                assert_eq!(
                    serde_json::Value::Object(record.props.clone()),
                    json!({"title": "CTR", "value": "3.4%"})
                );
            }
            other => panic!("Expected RenderComponent, got {other:?}"),
        }
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_parse_mismatch_is_stripped() {
        let result = parse("before ::table::{}::/chart:: after");
        assert!(result.directives.is_empty());
        assert_eq!(result.residual_text, "before  after");
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_parse_failed_decode_is_stripped() {
        let result = parse("a ::metric::{oops}::/metric:: b");
        assert!(result.directives.is_empty());
        assert_eq!(result.residual_text, "a  b");
        assert!(result.diagnostics[0].message.contains("invalid metric payload"));
    }

    #[test]
    fn test_parse_unterminated_opener_is_dropped() {
        let result = parse("Look ::table::{\"rows\":[");
        assert!(result.directives.is_empty());
        assert_eq!(result.residual_text, "Look");
        assert!(result.diagnostics[0].message.contains("unterminated"));
    }

    #[test]
    fn test_parse_closes_open_canvas() {
        let result = parse("Here ::canvas::<b>bold</b>");
        assert_eq!(result.residual_text, "Here");
        assert_eq!(result.directives.len(), 1);
        assert!(matches!(
            &result.directives[0],
            Directive::RenderRawMarkup { html, complete: true, .. } if html == "<b>bold</b>"
        ));
    }

    #[test]
    fn test_parse_keeps_partial_marker_text() {
        let result = parse("ratio ::ta");
        assert_eq!(result.residual_text, "ratio ::ta");
    }

    #[test]
    fn test_parse_clear_and_order() {
        let result = parse("::table::{}::/table::::clear::::chart::{\"data\":[]}::/chart::");
        let kinds: Vec<_> = result
            .directives
            .iter()
            .map(|d| serde_json::to_value(d).expect("should serialize")["kind"].clone())
            .collect();
        assert_eq!(
            kinds,
            vec![json!("render_component"), json!("clear_canvas"), json!("render_component")]
        );
    }

    #[test]
    fn test_run_pass_skips_processed_spans() {
        let buffer = "::table::{}::/table:: ::panel::{}::/panel::";
        let mut decoder = Decoder::new();
        let first = run_pass(&mut decoder, buffer, 0, false);
        assert_eq!(first.directives.len(), 2);
        assert_eq!(first.processed, buffer.len());

        let second = run_pass(&mut decoder, buffer, first.processed, false);
        assert!(second.directives.is_empty());
        assert_eq!(second.removed.len(), 2);
    }

    #[test]
    fn test_parse_payload_id_never_shadows_synthesized_id() {
        let result = parse(
            r#"::table::{"id":"table-1","title":"mine"}::/table:: ::table::{"title":"other"}::/table::"#,
        );
        let state = crate::state::CanvasState::new().apply_all(&result.directives);
        assert_eq!(state.len(), 2);
        let titles: Vec<_> = state.components().map(|c| c.props["title"].clone()).collect();
        assert_eq!(titles, vec![json!("mine"), json!("other")]);
    }
}
