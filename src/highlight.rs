//! Authoritative store of highlighted ranges per message and span.

use std::collections::HashMap;

use crate::message::MessageId;
use crate::range::TextRange;
use crate::span_id::SpanId;

/// `message -> span -> ranges`, with each range list sorted by start and free
/// of overlapping or touching pairs after every mutation.
#[derive(Clone, Debug, Default)]
pub struct HighlightStore {
    /// Highlighted ranges keyed by message, then span.
    parts: HashMap<MessageId, HashMap<SpanId, Vec<TextRange>>>,
}

impl HighlightStore {
    /// Insert `range`, folding in every stored range it overlaps or touches.
    pub fn add_range(&mut self, message: MessageId, span: &SpanId, range: TextRange) {
        let ranges = self.parts.entry(message).or_default().entry(span.clone()).or_default();

        let mut merged = range;
        let mut kept = Vec::with_capacity(ranges.len().saturating_add(1));
        for existing in ranges.drain(..) {
            match merged.merge(existing) {
                Some(wider) => merged = wider,
                None => kept.push(existing),
            }
        }
        // Stored ranges are sorted and gap-separated, so one pass catches every
        // range the growing merge touches.
        kept.push(merged);
        kept.sort();
        *ranges = kept;

        tracing::debug!(%message, %span, %range, %merged, "highlight added");
    }

    /// Drop every highlight.
    pub fn clear(&mut self) {
        self.parts.clear();
    }

    /// Whether `range` lies entirely inside one stored highlight.
    #[must_use]
    pub fn covers(&self, message: MessageId, span: &SpanId, range: TextRange) -> bool {
        return self.query(message, span).iter().any(|stored| return stored.covers(range));
    }

    /// Whether no highlights are stored at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        return self.parts.values().all(|spans| return spans.values().all(Vec::is_empty));
    }

    /// Highlighted ranges of one span, sorted by start.
    #[must_use]
    pub fn query(&self, message: MessageId, span: &SpanId) -> &[TextRange] {
        return self
            .parts
            .get(&message)
            .and_then(|spans| return spans.get(span))
            .map_or(&[], Vec::as_slice);
    }

    /// Drop every highlight of one message.
    pub fn remove_message(&mut self, message: MessageId) {
        self.parts.remove(&message);
    }

    /// Cut `range` out of every stored highlight it overlaps, splitting a
    /// highlight in two when `range` sits strictly inside it.
    pub fn remove_range(&mut self, message: MessageId, span: &SpanId, range: TextRange) {
        let Some(spans) = self.parts.get_mut(&message) else {
            return;
        };
        let Some(ranges) = spans.get_mut(span) else {
            return;
        };

        let remaining: Vec<TextRange> =
            ranges.iter().flat_map(|stored| return stored.subtract(range)).collect();
        *ranges = remaining;

        tracing::debug!(%message, %span, %range, left = ranges.len(), "highlight removed");

        if ranges.is_empty() {
            spans.remove(span);
        }
        if spans.is_empty() {
            self.parts.remove(&message);
        }
    }

    /// Spans of `message` that carry at least one highlight, sorted by id.
    #[must_use]
    pub fn spans(&self, message: MessageId) -> Vec<&SpanId> {
        let mut ids: Vec<&SpanId> =
            self.parts.get(&message).map(|spans| return spans.keys().collect()).unwrap_or_default();
        ids.sort();
        return ids;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: MessageId = MessageId(1);

    fn r(start: usize, end: usize) -> TextRange {
        TextRange::new(start, end).unwrap()
    }

    fn span() -> SpanId {
        SpanId::Stable("p-1-1".to_string())
    }

    fn assert_disjoint(store: &HighlightStore) {
        let ranges = store.query(M, &span());
        for pair in ranges.windows(2) {
            assert!(!pair[0].touches(pair[1]), "{} and {} touch", pair[0], pair[1]);
            assert!(pair[0].start() < pair[1].start());
        }
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut store = HighlightStore::default();
        store.add_range(M, &span(), r(0, 5));
        store.add_range(M, &span(), r(5, 10));
        assert_eq!(store.query(M, &span()), &[r(0, 10)]);
    }

    #[test]
    fn adding_twice_is_idempotent() {
        let mut once = HighlightStore::default();
        once.add_range(M, &span(), r(3, 7));
        let mut twice = HighlightStore::default();
        twice.add_range(M, &span(), r(3, 7));
        twice.add_range(M, &span(), r(3, 7));
        assert_eq!(once.query(M, &span()), twice.query(M, &span()));
    }

    #[test]
    fn bridging_range_absorbs_several() {
        let mut store = HighlightStore::default();
        store.add_range(M, &span(), r(0, 2));
        store.add_range(M, &span(), r(4, 6));
        store.add_range(M, &span(), r(8, 10));
        store.add_range(M, &span(), r(20, 22));
        store.add_range(M, &span(), r(1, 9));
        assert_eq!(store.query(M, &span()), &[r(0, 10), r(20, 22)]);
    }

    #[test]
    fn disjoint_ranges_stay_sorted() {
        let mut store = HighlightStore::default();
        store.add_range(M, &span(), r(10, 12));
        store.add_range(M, &span(), r(0, 2));
        store.add_range(M, &span(), r(5, 7));
        assert_eq!(store.query(M, &span()), &[r(0, 2), r(5, 7), r(10, 12)]);
    }

    #[test]
    fn removing_interior_splits() {
        let mut store = HighlightStore::default();
        store.add_range(M, &span(), r(0, 10));
        store.remove_range(M, &span(), r(4, 6));
        assert_eq!(store.query(M, &span()), &[r(0, 4), r(6, 10)]);
    }

    #[test]
    fn removing_everything_leaves_nothing() {
        let mut store = HighlightStore::default();
        store.add_range(M, &span(), r(0, 10));
        store.remove_range(M, &span(), r(0, 10));
        assert!(store.query(M, &span()).is_empty());
        assert!(store.is_empty());

        store.add_range(M, &span(), r(2, 4));
        store.remove_range(M, &span(), r(0, 50));
        assert!(store.query(M, &span()).is_empty());
    }

    #[test]
    fn removal_spanning_several_highlights_trims_each() {
        let mut store = HighlightStore::default();
        store.add_range(M, &span(), r(0, 4));
        store.add_range(M, &span(), r(6, 10));
        store.add_range(M, &span(), r(12, 16));
        store.remove_range(M, &span(), r(2, 14));
        assert_eq!(store.query(M, &span()), &[r(0, 2), r(14, 16)]);
    }

    #[test]
    fn other_spans_and_messages_are_untouched() {
        let mut store = HighlightStore::default();
        let other = SpanId::Stable("p-3-1".to_string());
        store.add_range(M, &span(), r(0, 4));
        store.add_range(M, &other, r(0, 4));
        store.add_range(MessageId(2), &span(), r(0, 4));
        store.remove_range(M, &span(), r(0, 4));
        assert_eq!(store.query(M, &other), &[r(0, 4)]);
        assert_eq!(store.query(MessageId(2), &span()), &[r(0, 4)]);
        assert_eq!(store.spans(M), vec![&other]);
    }

    #[test]
    fn invariant_holds_across_mixed_operations() {
        let mut store = HighlightStore::default();
        let ops: [(bool, usize, usize); 12] = [
            (true, 0, 3),
            (true, 5, 9),
            (true, 2, 6),
            (false, 4, 5),
            (true, 12, 20),
            (false, 14, 16),
            (true, 9, 12),
            (true, 30, 31),
            (false, 0, 1),
            (true, 31, 40),
            (false, 35, 36),
            (true, 1, 2),
        ];
        for (add, start, end) in ops {
            if add {
                store.add_range(M, &span(), r(start, end));
            } else {
                store.remove_range(M, &span(), r(start, end));
            }
            assert_disjoint(&store);
        }
    }
}
