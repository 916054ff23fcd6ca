//! Memo and supplementary-thread stores, keyed by exact range identity.

use std::collections::HashMap;

use crate::message::{Message, MessageId};
use crate::range::TextRange;
use crate::span_id::SpanId;

/// A payload attached to one exact range, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Annotation {
    /// Free-text note.
    Memo(String),
    /// Ordered follow-up messages generated about the range.
    Supplementary(Vec<Message>),
}

/// `message -> span -> [(range, payload)]`.
///
/// Lookup, update and delete match ranges exactly (both offsets equal), never
/// by overlap: editing a memo targets the precise highlight being viewed.
#[derive(Clone, Debug)]
pub struct AnnotationStore<P> {
    /// Entries in insertion order per span.
    entries: HashMap<MessageId, HashMap<SpanId, Vec<Entry<P>>>>,
}

/// One annotated range.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry<P> {
    /// The attached payload.
    pub payload: P,
    /// The exact range the payload is attached to.
    pub range: TextRange,
}

/// Memo text per range.
pub type MemoStore = AnnotationStore<String>;

/// Supplementary thread per range.
pub type SupplementaryStore = AnnotationStore<Vec<Message>>;

impl<P> AnnotationStore<P> {
    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries of one span, in insertion order.
    #[must_use]
    pub fn entries(&self, message: MessageId, span: &SpanId) -> &[Entry<P>] {
        return self
            .entries
            .get(&message)
            .and_then(|spans| return spans.get(span))
            .map_or(&[], Vec::as_slice);
    }

    /// Payload stored under exactly `range`, if any.
    #[must_use]
    pub fn find_exact(&self, message: MessageId, span: &SpanId, range: TextRange) -> Option<&P> {
        return self
            .entries(message, span)
            .iter()
            .find(|entry| return entry.range == range)
            .map(|entry| return &entry.payload);
    }

    /// Mutable payload stored under exactly `range`, if any.
    pub fn find_exact_mut(
        &mut self,
        message: MessageId,
        span: &SpanId,
        range: TextRange,
    ) -> Option<&mut P> {
        return self
            .entries
            .get_mut(&message)?
            .get_mut(span)?
            .iter_mut()
            .find(|entry| return entry.range == range)
            .map(|entry| return &mut entry.payload);
    }

    /// Whether no entries are stored at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        return self.entries.values().all(|spans| return spans.values().all(Vec::is_empty));
    }

    /// Message ids that carry at least one entry, ascending.
    #[must_use]
    pub fn messages(&self) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self.entries.keys().copied().collect();
        ids.sort();
        return ids;
    }

    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        return Self { entries: HashMap::new() };
    }

    /// Delete the entry stored under exactly `range`. Returns the removed
    /// payload, or `None` when nothing matched.
    pub fn remove_exact(&mut self, message: MessageId, span: &SpanId, range: TextRange) -> Option<P> {
        let spans = self.entries.get_mut(&message)?;
        let list = spans.get_mut(span)?;
        let idx = list.iter().position(|entry| return entry.range == range)?;
        let removed = list.remove(idx);

        if list.is_empty() {
            spans.remove(span);
        }
        if spans.is_empty() {
            self.entries.remove(&message);
        }
        return Some(removed.payload);
    }

    /// Drop every entry of one message.
    pub fn remove_message(&mut self, message: MessageId) {
        self.entries.remove(&message);
    }

    /// Delete every entry of `message`/`span` for which `keep` returns false.
    /// Returns the ranges that were dropped.
    pub fn retain<F>(&mut self, message: MessageId, span: &SpanId, mut keep: F) -> Vec<TextRange>
    where
        F: FnMut(TextRange) -> bool,
    {
        let Some(spans) = self.entries.get_mut(&message) else {
            return Vec::new();
        };
        let Some(list) = spans.get_mut(span) else {
            return Vec::new();
        };

        let mut dropped = Vec::new();
        list.retain(|entry| {
            if keep(entry.range) {
                return true;
            }
            dropped.push(entry.range);
            return false;
        });

        if list.is_empty() {
            spans.remove(span);
        }
        if spans.is_empty() {
            self.entries.remove(&message);
        }
        return dropped;
    }

    /// Spans of `message` that carry at least one entry, sorted by id.
    #[must_use]
    pub fn spans(&self, message: MessageId) -> Vec<&SpanId> {
        let mut ids: Vec<&SpanId> = self
            .entries
            .get(&message)
            .map(|spans| return spans.keys().collect())
            .unwrap_or_default();
        ids.sort();
        return ids;
    }

    /// Replace the payload under exactly `range`, or append a new entry.
    /// Returns the previous payload when one was replaced.
    pub fn upsert(&mut self, message: MessageId, span: &SpanId, range: TextRange, payload: P) -> Option<P> {
        let list = self.entries.entry(message).or_default().entry(span.clone()).or_default();
        if let Some(entry) = list.iter_mut().find(|entry| return entry.range == range) {
            return Some(std::mem::replace(&mut entry.payload, payload));
        }
        list.push(Entry { payload, range });
        return None;
    }
}

impl<P> Default for AnnotationStore<P> {
    fn default() -> Self {
        return Self::new();
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

    #[test]
    fn upsert_same_range_replaces_payload() {
        let mut memos = MemoStore::new();
        assert_eq!(memos.upsert(M, &span(), r(2, 5), "note A".to_string()), None);
        assert_eq!(
            memos.upsert(M, &span(), r(2, 5), "note B".to_string()),
            Some("note A".to_string())
        );
        let entries = memos.entries(M, &span());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.first().map(|e| e.payload.as_str()), Some("note B"));
    }

    #[test]
    fn different_range_is_a_different_entry() {
        let mut memos = MemoStore::new();
        memos.upsert(M, &span(), r(2, 5), "note B".to_string());
        memos.upsert(M, &span(), r(2, 6), "note C".to_string());
        assert_eq!(memos.entries(M, &span()).len(), 2);
        assert_eq!(memos.find_exact(M, &span(), r(2, 6)).map(String::as_str), Some("note C"));
    }

    #[test]
    fn lookup_never_matches_by_overlap() {
        let mut memos = MemoStore::new();
        memos.upsert(M, &span(), r(2, 8), "wide".to_string());
        assert_eq!(memos.find_exact(M, &span(), r(3, 5)), None);
        assert_eq!(memos.remove_exact(M, &span(), r(2, 7)), None);
        assert_eq!(memos.entries(M, &span()).len(), 1);
    }

    #[test]
    fn remove_exact_deletes_and_cleans_up() {
        let mut memos = MemoStore::new();
        memos.upsert(M, &span(), r(4, 9), "adjective".to_string());
        assert_eq!(memos.remove_exact(M, &span(), r(4, 9)), Some("adjective".to_string()));
        assert!(memos.is_empty());
        assert!(memos.messages().is_empty());
        assert_eq!(memos.remove_exact(M, &span(), r(4, 9)), None);
    }

    #[test]
    fn retain_reports_dropped_ranges() {
        let mut memos = MemoStore::new();
        memos.upsert(M, &span(), r(0, 2), "a".to_string());
        memos.upsert(M, &span(), r(4, 6), "b".to_string());
        let dropped = memos.retain(M, &span(), |range| range.start() < 3);
        assert_eq!(dropped, vec![r(4, 6)]);
        assert_eq!(memos.entries(M, &span()).len(), 1);
    }

    #[test]
    fn supplementary_threads_can_be_extended_in_place() {
        let mut threads = SupplementaryStore::new();
        threads.upsert(M, &span(), r(0, 3), Vec::new());
        let thread = threads.find_exact_mut(M, &span(), r(0, 3)).unwrap();
        assert!(thread.is_empty());
        assert!(threads.find_exact_mut(M, &span(), r(0, 4)).is_none());
    }
}
