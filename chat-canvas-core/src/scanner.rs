//! Tag scanner for the inline markup grammar.
//!
//! The scanner makes one left-to-right pass over a buffer with an explicit
//! cursor and reports:
//!
//! - complete spans (`::tag::payload::/tag::` and the `::clear::` sentinel),
//! - rejected ranges that must be stripped but carry no directive,
//! - an optional pending tail: an opener still waiting for its close marker,
//!   or a trailing fragment that may still grow into a marker.
//!
//! ```text
//! Result: ::metric::{"title":"CTR"}::/metric:: Thanks! ::tab
//!         └──────────── span ──────────────────┘        └ pending
//! ```
//!
//! Only `canvas` is emitted while unterminated; every other opener waits for
//! more input.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::ScanError;
use crate::tag::TagName;

/// A located block of markup, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpan<'a> {
    /// Tag named by the opening marker.
    pub tag: TagName,
    /// `name="value"` pairs from a `::layout ...::` opener.
    pub attributes: BTreeMap<String, String>,
    /// Text between the opening and closing markers.
    pub inner: &'a str,
    /// Byte offset of `inner` in the scanned buffer.
    pub inner_start: usize,
    /// Byte offset of the opening marker.
    pub start: usize,
    /// Byte offset one past the closing marker (or end of buffer).
    pub end: usize,
    /// False only for a `canvas` block still waiting for `::/canvas::`.
    pub terminated: bool,
}

impl RawSpan<'_> {
    /// Byte range covered by the span.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A range of markup that produced a scan error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSpan {
    /// Byte offset of the first marker.
    pub start: usize,
    /// Byte offset one past the last marker.
    pub end: usize,
    /// Why the range was rejected.
    pub error: ScanError,
}

/// What is waiting at the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// A complete opener whose close marker has not arrived.
    OpenTag(TagName),
    /// A trailing fragment that may still become a marker.
    PartialMarker,
}

/// Tail of the buffer held back until more input arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    /// Byte offset where the held tail begins.
    pub start: usize,
    /// What the tail looks like.
    pub kind: PendingKind,
}

/// Result of scanning a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput<'a> {
    /// Well-formed spans in buffer order.
    pub spans: Vec<RawSpan<'a>>,
    /// Ranges rejected by the scanner, in buffer order.
    pub rejected: Vec<RejectedSpan>,
    /// Incomplete tail, if any.
    pub pending: Option<Pending>,
}

impl ScanOutput<'_> {
    /// Every range the text extractor must delete, sorted by start.
    ///
    /// The pending tail is included when `include_pending` is set.
    #[must_use]
    pub fn removed_ranges(&self, include_pending: bool, buffer_len: usize) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = self
            .spans
            .iter()
            .map(RawSpan::range)
            .chain(self.rejected.iter().map(|r| r.start..r.end))
            .collect();
        if include_pending {
            if let Some(pending) = self.pending {
                ranges.push(pending.start..buffer_len);
            }
        }
        ranges.sort_by_key(|r| r.start);
        ranges
    }
}

/// Scan a buffer for markup spans.
#[must_use]
pub fn scan(buffer: &str) -> ScanOutput<'_> {
    Scanner::new(buffer).run()
}

const MARKER: &str = "::";

/// A marker recognized at a `::` position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker<'a> {
    Clear,
    Open { tag: TagName, attributes: &'a str },
    Close(TagName),
}

struct Scanner<'a> {
    buffer: &'a str,
    /// Next byte to search from.
    cursor: usize,
    /// End of the last consumed construct.
    settled: usize,
    output: ScanOutput<'a>,
}

impl<'a> Scanner<'a> {
    fn new(buffer: &'a str) -> Self {
        Self {
            buffer,
            cursor: 0,
            settled: 0,
            output: ScanOutput::default(),
        }
    }

    fn run(mut self) -> ScanOutput<'a> {
        while let Some(offset) = self.buffer[self.cursor..].find(MARKER) {
            let start = self.cursor + offset;
            let Some((marker, marker_end)) = marker_at(self.buffer, start) else {
                // `:` is one byte, so start + 1 is a char boundary.
                self.cursor = start + 1;
                continue;
            };

            match marker {
                Marker::Clear => {
                    self.output.spans.push(RawSpan {
                        tag: TagName::Clear,
                        attributes: BTreeMap::new(),
                        inner: "",
                        inner_start: marker_end,
                        start,
                        end: marker_end,
                        terminated: true,
                    });
                    self.advance(marker_end);
                }
                Marker::Close(tag) => {
                    self.output.rejected.push(RejectedSpan {
                        start,
                        end: marker_end,
                        error: ScanError::UnexpectedClose(tag),
                    });
                    self.advance(marker_end);
                }
                Marker::Open { tag, attributes } => {
                    if !self.open_block(tag, attributes, start, marker_end) {
                        return self.output;
                    }
                }
            }
        }

        self.output.pending = partial_marker_start(self.buffer, self.settled).map(|start| Pending {
            start,
            kind: PendingKind::PartialMarker,
        });
        self.output
    }

    fn advance(&mut self, to: usize) {
        self.cursor = to;
        self.settled = to;
    }

    /// Handle an opener. Returns false when scanning must stop.
    fn open_block(&mut self, tag: TagName, attributes: &str, start: usize, body_start: usize) -> bool {
        let buffer = self.buffer;
        match find_close(buffer, tag, body_start) {
            Some((close, close_start, close_end)) if close == tag => {
                self.output.spans.push(RawSpan {
                    tag,
                    attributes: parse_attributes(attributes),
                    inner: &buffer[body_start..close_start],
                    inner_start: body_start,
                    start,
                    end: close_end,
                    terminated: true,
                });
                self.advance(close_end);
                true
            }
            Some((close, _, close_end)) => {
                self.output.rejected.push(RejectedSpan {
                    start,
                    end: close_end,
                    error: ScanError::MismatchedTag { open: tag, close },
                });
                self.advance(close_end);
                true
            }
            None if tag == TagName::Canvas => {
                let body = &buffer[body_start..];
                let held = partial_suffix_len(body, &close_marker(tag));
                self.output.spans.push(RawSpan {
                    tag,
                    attributes: parse_attributes(attributes),
                    inner: &body[..body.len() - held],
                    inner_start: body_start,
                    start,
                    end: buffer.len(),
                    terminated: false,
                });
                self.advance(buffer.len());
                false
            }
            None => {
                self.output.pending = Some(Pending {
                    start,
                    kind: PendingKind::OpenTag(tag),
                });
                false
            }
        }
    }
}

fn close_marker(tag: TagName) -> String {
    format!("::/{tag}::")
}

/// Length of the run of lowercase ASCII letters at the start of `s`.
fn name_len(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_lowercase).count()
}

/// Recognize a complete marker starting at `start` (which holds `::`).
fn marker_at(buffer: &str, start: usize) -> Option<(Marker<'_>, usize)> {
    let rest = &buffer[start + MARKER.len()..];

    if let Some(body) = rest.strip_prefix('/') {
        let len = name_len(body);
        let tag: TagName = body[..len].parse().ok()?;
        if tag == TagName::Clear || !body[len..].starts_with(MARKER) {
            return None;
        }
        return Some((Marker::Close(tag), start + 3 + len + MARKER.len()));
    }

    let len = name_len(rest);
    let tag: TagName = rest[..len].parse().ok()?;
    let after = &rest[len..];
    let name_end = start + MARKER.len() + len;

    if after.starts_with(MARKER) {
        let marker = if tag == TagName::Clear {
            Marker::Clear
        } else {
            Marker::Open { tag, attributes: "" }
        };
        return Some((marker, name_end + MARKER.len()));
    }

    // `::layout cols="2" gap="10"::`
    if tag == TagName::Layout && after.starts_with(char::is_whitespace) {
        let colon = after.find(':')?;
        if !after[colon..].starts_with(MARKER) {
            return None;
        }
        let attributes = &after[..colon];
        return Some((Marker::Open { tag, attributes }, name_end + colon + MARKER.len()));
    }

    None
}

/// Locate the close marker for a block opened at `from`.
///
/// `layout` and `canvas` look only for their own close marker. Every other
/// tag stops at the nearest close marker of any tag, so a mismatched close is
/// reported instead of consuming unrelated blocks.
fn find_close(buffer: &str, tag: TagName, from: usize) -> Option<(TagName, usize, usize)> {
    if tag.closes_exclusively() {
        let marker = close_marker(tag);
        return buffer[from..].find(&marker).map(|offset| {
            let start = from + offset;
            (tag, start, start + marker.len())
        });
    }

    let mut cursor = from;
    while let Some(offset) = buffer[cursor..].find("::/") {
        let start = cursor + offset;
        if let Some((Marker::Close(close), end)) = marker_at(buffer, start) {
            return Some((close, start, end));
        }
        cursor = start + 1;
    }
    None
}

/// Length of the longest proper prefix of `marker` that `text` ends with.
fn partial_suffix_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| text.ends_with(&marker[..len]))
        .unwrap_or(0)
}

/// Earliest position at or after `from` where the rest of the buffer could
/// still grow into a marker.
fn partial_marker_start(buffer: &str, from: usize) -> Option<usize> {
    buffer[from..]
        .match_indices(':')
        .map(|(offset, _)| from + offset)
        .find(|&start| could_become_marker(&buffer[start..]))
}

/// Whether `tail` (which starts with `:`) is an incomplete marker.
fn could_become_marker(tail: &str) -> bool {
    let Some(rest) = tail.strip_prefix(MARKER) else {
        return tail == ":";
    };
    let (closing, body) = match rest.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, rest),
    };

    let len = name_len(body);
    let name = &body[..len];
    let after = &body[len..];

    if after.is_empty() {
        return std::iter::once(TagName::Clear)
            .chain(TagName::BLOCKS)
            .filter(|tag| !(closing && *tag == TagName::Clear))
            .any(|tag| tag.as_str().starts_with(name));
    }

    let Ok(tag) = name.parse::<TagName>() else {
        return false;
    };
    if closing && tag == TagName::Clear {
        return false;
    }
    if after == ":" {
        return true;
    }
    if !closing && tag == TagName::Layout && after.starts_with(char::is_whitespace) {
        // Still reading attributes; a lone trailing `:` may become `::`.
        return match after.find(':') {
            None => true,
            Some(colon) => colon == after.len() - 1,
        };
    }
    false
}

/// Parse `name="value"` pairs; anything else is skipped.
fn parse_attributes(text: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut rest = text;

    while let Some(eq) = rest.find("=\"") {
        let name = rest[..eq]
            .rsplit(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .next()
            .unwrap_or_default();
        let value_start = eq + 2;
        let Some(value_len) = rest[value_start..].find('"') else {
            break;
        };
        if !name.is_empty() {
            attributes.insert(
                name.to_string(),
                rest[value_start..value_start + value_len].to_string(),
            );
        }
        rest = &rest[value_start + value_len + 1..];
    }

    attributes
}
