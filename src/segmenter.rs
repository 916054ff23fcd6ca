//! Cut a span's text into highlighted and plain segments for rendering.

use crate::range::TextRange;

/// A contiguous slice of a span's text.
///
/// `start`/`end` are character offsets into the span text, the same unit as
/// [`TextRange`]. Segments produced by [`segment`] tile the text exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Exclusive end offset in characters.
    pub end: usize,
    /// Whether the segment is covered by a stored highlight.
    pub highlighted: bool,
    /// Inclusive start offset in characters.
    pub start: usize,
    /// The segment's slice of the span text.
    pub text: &'a str,
}

impl Segment<'_> {
    /// Number of characters in the segment.
    #[must_use]
    pub const fn char_count(&self) -> usize {
        return self.end.saturating_sub(self.start);
    }
}

/// Byte index of the `offset`-th character, clamped to the end of `text`.
fn byte_index(text: &str, offset: usize) -> usize {
    return text.char_indices().nth(offset).map_or(text.len(), |(idx, _)| return idx);
}

/// Split `text` into segments according to `ranges`.
///
/// `ranges` are expected sorted by start and non-overlapping, which the
/// highlight store guarantees. Ranges reaching past the end of the text are
/// clipped and ranges behind the cursor are skipped, so the output always
/// covers `[0, char_count)` with no gaps or overlaps and concatenates back to
/// `text`. Empty text yields no segments.
pub fn segment<'a>(text: &'a str, ranges: &[TextRange]) -> Vec<Segment<'a>> {
    let total = text.chars().count();
    let mut segments = Vec::with_capacity(ranges.len().saturating_mul(2).saturating_add(1));
    let mut cursor = 0_usize;

    for range in ranges {
        let start = range.start().max(cursor).min(total);
        let end = range.end().min(total);
        if start >= end {
            continue;
        }
        if cursor < start {
            push_segment(&mut segments, text, cursor, start, false);
        }
        push_segment(&mut segments, text, start, end, true);
        cursor = end;
    }

    if cursor < total {
        push_segment(&mut segments, text, cursor, total, false);
    }

    return segments;
}

/// Slice `[start, end)` characters out of `text` and append it as a segment.
fn push_segment<'a>(
    segments: &mut Vec<Segment<'a>>,
    text: &'a str,
    start: usize,
    end: usize,
    highlighted: bool,
) {
    let from = byte_index(text, start);
    let to = byte_index(text, end);
    let slice = text.get(from..to).unwrap_or_default();
    segments.push(Segment { end, highlighted, start, text: slice });
}
