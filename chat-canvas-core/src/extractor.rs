//! Text extractor - the human-visible remainder of a buffer.

use std::ops::Range;

/// Delete `ranges` from `buffer` and trim the result.
///
/// Ranges must lie on char boundaries. They may arrive unsorted and may
/// overlap; everything outside them is kept in order, including the
/// whitespace that surrounded a removed span.
#[must_use]
pub fn extract(buffer: &str, ranges: &[Range<usize>]) -> String {
    let mut sorted: Vec<&Range<usize>> = ranges.iter().collect();
    sorted.sort_by_key(|r| r.start);

    let mut text = String::with_capacity(buffer.len());
    let mut cursor = 0;
    for range in sorted {
        let start = range.start.min(buffer.len());
        if start > cursor {
            text.push_str(&buffer[cursor..start]);
        }
        cursor = cursor.max(range.end.min(buffer.len()));
    }
    text.push_str(&buffer[cursor..]);

    text.trim().to_string()
}
