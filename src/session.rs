//! Session records: the flat, persistable shape of a conversation and its
//! annotations, and the transform between it and the in-memory stores.
//!
//! Highlights are not persisted on their own. On load they are rebuilt as the
//! union of every annotated range, so a highlight that carried neither a memo
//! nor a supplementary thread does not survive a round trip.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotation::{MemoStore, SupplementaryStore};
use crate::config::EphemeralPolicy;
use crate::error::Error;
use crate::highlight::HighlightStore;
use crate::message::{Message, MessageId, Role};
use crate::pricing::PriceTable;
use crate::range::TextRange;
use crate::span_id::SpanId;

/// A memo as persisted inside its message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoRecord {
    /// Span id the memo is anchored to.
    pub client_side_id: String,
    /// The memo text.
    pub memo: String,
    /// Exclusive end offset in characters.
    pub range_end: usize,
    /// Inclusive start offset in characters.
    pub range_start: usize,
}

/// A message as persisted, with its annotations embedded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message text.
    pub content: String,
    /// Cost in USD.
    pub cost: f64,
    /// Message id, unique within the session.
    pub id: u64,
    /// Memos attached to ranges of this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memos: Vec<MemoRecord>,
    /// Model name, empty when none.
    #[serde(default)]
    pub model: String,
    /// Who wrote the message.
    pub role: Role,
    /// Supplementary threads attached to ranges of this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplementary_messages: Vec<SupplementaryRecord>,
    /// When the message was committed.
    pub timestamp: DateTime<Utc>,
}

/// Options controlling how a session is flattened.
#[derive(Clone, Copy, Debug)]
pub struct SerializeOptions<'a> {
    /// What to do with annotations keyed by ephemeral span ids.
    pub policy: EphemeralPolicy,
    /// Price lookup for per-message cost.
    pub pricing: &'a PriceTable,
}

/// The persisted form of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Storage id; absent until first saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Messages in conversation order.
    pub messages: Vec<MessageRecord>,
    /// Human-readable title.
    pub summary: String,
}

/// Everything a session owns in memory.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    /// Highlighted ranges.
    pub highlights: HighlightStore,
    /// Ephemeral spans that arrived in a loaded record. Their annotations are
    /// written back unchanged whatever the policy.
    pub legacy_spans: HashSet<(MessageId, SpanId)>,
    /// Memo entries.
    pub memos: MemoStore,
    /// Committed messages in conversation order.
    pub messages: Vec<Message>,
    /// Next message id to hand out.
    pub next_id: u64,
    /// Supplementary threads.
    pub supplementary: SupplementaryStore,
}

/// One follow-up message of a persisted supplementary thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryItem {
    /// Message text.
    pub content: String,
    /// Cost in USD.
    pub cost: f64,
    /// Model name, empty when none.
    #[serde(default)]
    pub model: String,
    /// Who wrote the message.
    pub role: Role,
    /// When the message was committed.
    pub timestamp: DateTime<Utc>,
}

/// A supplementary thread as persisted inside its message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryRecord {
    /// Span id the thread is anchored to.
    pub client_side_id: String,
    /// Follow-up messages in order.
    pub items: Vec<SupplementaryItem>,
    /// Exclusive end offset in characters.
    pub range_end: usize,
    /// Inclusive start offset in characters.
    pub range_start: usize,
}

impl SessionRecord {
    /// Parse a record from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the content is not a valid record, including
    /// negative offsets.
    pub fn from_json(content: &str) -> Result<Self, Error> {
        return Ok(serde_json::from_str(content)?);
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        return Ok(serde_json::to_string_pretty(self)?);
    }
}

/// Whether an annotation on `span` may be persisted under `policy`. Spans
/// loaded from an earlier record are always admitted.
///
/// # Errors
///
/// Returns `Error::EphemeralSpan` when the id is ephemeral, did not come from
/// a loaded record, and the policy rejects it.
fn admit(
    state: &SessionState,
    message: MessageId,
    span: &SpanId,
    policy: EphemeralPolicy,
) -> Result<bool, Error> {
    if span.is_stable() || state.legacy_spans.contains(&(message, span.clone())) {
        return Ok(true);
    }
    return match policy {
        EphemeralPolicy::Drop => {
            tracing::warn!(%message, %span, "dropping annotation keyed by ephemeral span id");
            Ok(false)
        },
        EphemeralPolicy::Reject => Err(Error::EphemeralSpan {
            message_id: message.0,
            span_id: span.to_string(),
        }),
    };
}

/// Rebuild in-memory state from a persisted record.
///
/// Message ids are kept. Supplementary messages get fresh ids above every
/// persisted message id, and `next_id` resumes after all of them. Token
/// counts are not persisted, so restored messages carry their recorded cost.
///
/// # Errors
///
/// Returns `Error::SessionCorrupt` if two messages share an id, a span id is
/// empty, or a range has `rangeStart >= rangeEnd`.
pub fn deserialize(record: &SessionRecord) -> Result<SessionState, Error> {
    let mut seen = HashSet::new();
    for message in &record.messages {
        if !seen.insert(message.id) {
            return Err(Error::SessionCorrupt {
                reason: format!("duplicate message id {}", message.id),
            });
        }
    }

    let mut state = SessionState {
        next_id: record.messages.iter().map(|m| return m.id).max().map_or(1, |max| return max.saturating_add(1)),
        ..SessionState::default()
    };

    for message in &record.messages {
        let id = MessageId(message.id);
        state.messages.push(Message {
            content: message.content.clone(),
            cost: Some(message.cost),
            id,
            input_tokens: None,
            model: non_empty(&message.model),
            output_tokens: None,
            role: message.role,
            timestamp: message.timestamp,
        });

        for memo in &message.memos {
            let (span, range) = anchor(message.id, &memo.client_side_id, memo.range_start, memo.range_end)?;
            if !span.is_stable() {
                state.legacy_spans.insert((id, span.clone()));
            }
            state.highlights.add_range(id, &span, range);
            state.memos.upsert(id, &span, range, memo.memo.clone());
        }

        for thread in &message.supplementary_messages {
            let (span, range) =
                anchor(message.id, &thread.client_side_id, thread.range_start, thread.range_end)?;
            if !span.is_stable() {
                state.legacy_spans.insert((id, span.clone()));
            }
            let mut items = Vec::with_capacity(thread.items.len());
            for item in &thread.items {
                items.push(Message {
                    content: item.content.clone(),
                    cost: Some(item.cost),
                    id: MessageId(state.next_id),
                    input_tokens: None,
                    model: non_empty(&item.model),
                    output_tokens: None,
                    role: item.role,
                    timestamp: item.timestamp,
                });
                state.next_id = state.next_id.saturating_add(1);
            }
            state.highlights.add_range(id, &span, range);
            match state.supplementary.find_exact_mut(id, &span, range) {
                Some(existing) => existing.extend(items),
                None => {
                    state.supplementary.upsert(id, &span, range, items);
                },
            }
        }
    }

    tracing::debug!(
        messages = state.messages.len(),
        next_id = state.next_id,
        "session record loaded"
    );
    return Ok(state);
}

/// Validate one persisted anchor.
///
/// # Errors
///
/// Returns `Error::SessionCorrupt` if the span id is empty or the range is invalid.
fn anchor(message: u64, client_side_id: &str, start: usize, end: usize) -> Result<(SpanId, TextRange), Error> {
    if client_side_id.is_empty() {
        return Err(Error::SessionCorrupt {
            reason: format!("message {message}: annotation without clientSideId"),
        });
    }
    let range = TextRange::new(start, end).map_err(|e| {
        return Error::SessionCorrupt { reason: format!("message {message}: {e}") };
    })?;
    let span = SpanId::parse(client_side_id);
    if !span.is_stable() {
        tracing::warn!(message, %span, "loaded annotation is keyed by an ephemeral span id; keeping it as is");
    }
    return Ok((span, range));
}

/// Cost of one message: priced from tokens when model and both counts are
/// known, else the cost restored from an earlier record, else zero.
fn message_cost(message: &Message, pricing: &PriceTable) -> f64 {
    if let (Some(model), Some(input), Some(output)) =
        (&message.model, message.input_tokens, message.output_tokens)
    {
        return pricing.cost(model, input, output);
    }
    return message.cost.unwrap_or(0.0);
}

/// `None` for an empty string.
fn non_empty(raw: &str) -> Option<String> {
    return (!raw.is_empty()).then(|| return raw.to_string());
}

/// Flatten in-memory state into a persistable record.
///
/// Only annotations are written; highlights without one are dropped.
///
/// # Errors
///
/// Returns `Error::EphemeralSpan` if an annotation is keyed by an ephemeral
/// span id and the policy is `Reject`.
pub fn serialize(
    state: &SessionState,
    id: Option<u64>,
    summary: &str,
    options: SerializeOptions<'_>,
) -> Result<SessionRecord, Error> {
    let mut messages = Vec::with_capacity(state.messages.len());
    for message in &state.messages {
        let mut memos = Vec::new();
        for span in state.memos.spans(message.id) {
            if !admit(state, message.id, span, options.policy)? {
                continue;
            }
            for entry in state.memos.entries(message.id, span) {
                memos.push(MemoRecord {
                    client_side_id: span.to_string(),
                    memo: entry.payload.clone(),
                    range_end: entry.range.end(),
                    range_start: entry.range.start(),
                });
            }
        }

        let mut supplementary_messages = Vec::new();
        for span in state.supplementary.spans(message.id) {
            if !admit(state, message.id, span, options.policy)? {
                continue;
            }
            for entry in state.supplementary.entries(message.id, span) {
                supplementary_messages.push(SupplementaryRecord {
                    client_side_id: span.to_string(),
                    items: entry
                        .payload
                        .iter()
                        .map(|item| {
                            return SupplementaryItem {
                                content: item.content.clone(),
                                cost: message_cost(item, options.pricing),
                                model: item.model.clone().unwrap_or_default(),
                                role: item.role,
                                timestamp: item.timestamp,
                            };
                        })
                        .collect(),
                    range_end: entry.range.end(),
                    range_start: entry.range.start(),
                });
            }
        }

        messages.push(MessageRecord {
            content: message.content.clone(),
            cost: message_cost(message, options.pricing),
            id: message.id.0,
            memos,
            model: message.model.clone().unwrap_or_default(),
            role: message.role,
            supplementary_messages,
            timestamp: message.timestamp,
        });
    }

    tracing::debug!(messages = messages.len(), "session record built");
    return Ok(SessionRecord { id, messages, summary: summary.to_string() });
}
