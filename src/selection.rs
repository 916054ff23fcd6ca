//! Turn a raw selection inside one rendered segment into an absolute range and action.

use crate::error::Error;
use crate::range::TextRange;
use crate::segmenter::Segment;

/// One end of a raw user selection, as reported by the rendering layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionEndpoint {
    /// Render-local id of the text node holding this endpoint.
    pub node: usize,
    /// Character offset inside that text node.
    pub offset: usize,
}

/// A raw selection event. `anchor` is where the drag started, `focus` where
/// it ended; a backwards drag has `focus` before `anchor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionEvent {
    /// Where the selection started.
    pub anchor: SelectionEndpoint,
    /// Where the selection ended.
    pub focus: SelectionEndpoint,
}

/// What the user asked for by selecting inside a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    /// Selection inside a plain segment: highlight it.
    Add,
    /// Selection inside a highlighted segment: remove the highlight.
    Remove,
}

/// A selection mapped back onto the span's text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSelection {
    /// Whether to add or remove a highlight.
    pub mode: SelectionMode,
    /// Absolute range in the span's text.
    pub range: TextRange,
}

impl SelectionEvent {
    /// A selection inside a single text node.
    #[must_use]
    pub const fn within(node: usize, anchor: usize, focus: usize) -> Self {
        return Self {
            anchor: SelectionEndpoint { node, offset: anchor },
            focus: SelectionEndpoint { node, offset: focus },
        };
    }
}

/// Resolve a selection event taken inside `segment`.
///
/// Local offsets are added to the segment's start; the mode follows the
/// segment's highlighted flag.
///
/// # Errors
///
/// Returns `Error::CrossNodeSelection` if anchor and focus sit in different
/// text nodes, `Error::CollapsedSelection` for a zero-length selection, and
/// `Error::SelectionOutOfBounds` if an offset lies past the segment's end.
pub fn resolve(segment: &Segment<'_>, event: &SelectionEvent) -> Result<ResolvedSelection, Error> {
    if event.anchor.node != event.focus.node {
        return Err(Error::CrossNodeSelection {
            anchor: event.anchor.node,
            focus: event.focus.node,
        });
    }

    let local_start = event.anchor.offset.min(event.focus.offset);
    let local_end = event.anchor.offset.max(event.focus.offset);
    if local_start == local_end {
        return Err(Error::CollapsedSelection { offset: local_start });
    }

    let len = segment.char_count();
    if local_end > len {
        return Err(Error::SelectionOutOfBounds { len, offset: local_end });
    }

    let range = TextRange::new(
        segment.start.saturating_add(local_start),
        segment.start.saturating_add(local_end),
    )?;
    let mode = if segment.highlighted { SelectionMode::Remove } else { SelectionMode::Add };

    return Ok(ResolvedSelection { mode, range });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(start: usize, text: &str) -> Segment<'_> {
        Segment { end: start + text.chars().count(), highlighted: false, start, text }
    }

    #[test]
    fn offsets_are_shifted_by_segment_start() {
        let seg = plain(9, " brown fox");
        let resolved = resolve(&seg, &SelectionEvent::within(2, 1, 6)).unwrap();
        assert_eq!(resolved.range, TextRange::new(10, 15).unwrap());
        assert_eq!(resolved.mode, SelectionMode::Add);
    }

    #[test]
    fn highlighted_segment_means_remove() {
        let seg = Segment { end: 9, highlighted: true, start: 4, text: "quick" };
        let resolved = resolve(&seg, &SelectionEvent::within(1, 0, 5)).unwrap();
        assert_eq!(resolved.range, TextRange::new(4, 9).unwrap());
        assert_eq!(resolved.mode, SelectionMode::Remove);
    }

    #[test]
    fn backwards_drag_is_normalized() {
        let seg = plain(0, "The ");
        let resolved = resolve(&seg, &SelectionEvent::within(0, 3, 1)).unwrap();
        assert_eq!(resolved.range, TextRange::new(1, 3).unwrap());
    }

    #[test]
    fn cross_node_selection_is_rejected_and_ignorable() {
        let seg = plain(0, "The ");
        let event = SelectionEvent {
            anchor: SelectionEndpoint { node: 0, offset: 1 },
            focus: SelectionEndpoint { node: 1, offset: 2 },
        };
        let err = resolve(&seg, &event).unwrap_err();
        assert!(matches!(err, Error::CrossNodeSelection { anchor: 0, focus: 1 }));
        assert!(err.is_ignorable_selection());
    }

    #[test]
    fn collapsed_selection_is_rejected_and_ignorable() {
        let seg = plain(0, "The ");
        let err = resolve(&seg, &SelectionEvent::within(0, 2, 2)).unwrap_err();
        assert!(err.is_ignorable_selection());
    }

    #[test]
    fn offset_past_segment_end_is_an_error() {
        let seg = plain(0, "The ");
        let err = resolve(&seg, &SelectionEvent::within(0, 1, 9)).unwrap_err();
        assert!(matches!(err, Error::SelectionOutOfBounds { len: 4, offset: 9 }));
        assert!(!err.is_ignorable_selection());
    }
}
