//! The per-session annotation engine: messages, highlights, memos and
//! supplementary threads behind one explicit context object.

use chrono::Utc;

use crate::annotation::{Annotation, MemoStore, SupplementaryStore};
use crate::error::Error;
use crate::highlight::HighlightStore;
use crate::message::{CapturedRange, Message, MessageId, Role, StreamingContent, Usage};
use crate::range::TextRange;
use crate::segmenter::{self, Segment};
use crate::selection::{self, ResolvedSelection, SelectionEvent, SelectionMode};
use crate::session::{self, SerializeOptions, SessionRecord, SessionState};
use crate::span_id::SpanId;

/// Owns every store of one session.
///
/// All mutations go through the engine so that a highlight always exists
/// before an annotation is attached to it, and removing a highlight never
/// leaves an annotation on text that is no longer highlighted.
#[derive(Debug, Default)]
pub struct AnnotationEngine {
    /// Storage id of the session, once saved or loaded.
    session_id: Option<u64>,
    /// Messages and stores.
    state: SessionState,
    /// Assistant message still streaming in.
    streaming: Option<PendingMessage>,
}

/// An assistant message under construction.
#[derive(Debug)]
struct PendingMessage {
    /// Content received so far.
    content: StreamingContent,
    /// Id reserved for the message when it is committed.
    id: MessageId,
    /// Model producing the message.
    model: Option<String>,
}

impl AnnotationEngine {
    /// Every annotation stored under exactly `range`, memo first.
    #[must_use]
    pub fn annotations(&self, message: MessageId, span: &SpanId, range: TextRange) -> Vec<Annotation> {
        let mut found = Vec::new();
        if let Some(memo) = self.state.memos.find_exact(message, span, range) {
            found.push(Annotation::Memo(memo.clone()));
        }
        if let Some(thread) = self.state.supplementary.find_exact(message, span, range) {
            found.push(Annotation::Supplementary(thread.clone()));
        }
        return found;
    }

    /// Add another chunk to the streaming message. Returns the new content
    /// version, or `None` when nothing is streaming.
    pub fn append_chunk(&mut self, chunk: &str) -> Option<u64> {
        return self.streaming.as_mut().map(|pending| return pending.content.append(chunk));
    }

    /// Annotate `range` with follow-up messages: highlight it, then append
    /// the messages to the thread stored under exactly that range.
    pub fn append_supplementary(
        &mut self,
        message: MessageId,
        span: &SpanId,
        range: TextRange,
        items: Vec<Message>,
    ) {
        self.state.highlights.add_range(message, span, range);
        match self.state.supplementary.find_exact_mut(message, span, range) {
            Some(thread) => thread.extend(items),
            None => {
                self.state.supplementary.upsert(message, span, range, items);
            },
        }
    }

    /// Apply a resolved selection: add a highlight, or cut one and drop every
    /// annotation whose range is no longer fully highlighted.
    pub fn apply_selection(&mut self, message: MessageId, span: &SpanId, resolved: ResolvedSelection) {
        match resolved.mode {
            SelectionMode::Add => self.state.highlights.add_range(message, span, resolved.range),
            SelectionMode::Remove => {
                self.state.highlights.remove_range(message, span, resolved.range);
                self.prune(message, span);
            },
        }
    }

    /// Apply a selection captured while `message` was still streaming.
    ///
    /// # Errors
    ///
    /// Returns `Error::StaleOffsets` if nothing is streaming, the content was
    /// restarted since capture, or the range reaches past the text present at
    /// capture.
    pub fn apply_streaming_selection(
        &mut self,
        span: &SpanId,
        captured: &CapturedRange,
        mode: SelectionMode,
    ) -> Result<(), Error> {
        let Some(pending) = self.streaming.as_ref() else {
            return Err(Error::StaleOffsets { captured_epoch: captured.epoch, current_epoch: 0 });
        };
        pending.content.validate(captured)?;
        let id = pending.id;
        self.apply_selection(id, span, ResolvedSelection { mode, range: captured.range });
        return Ok(());
    }

    /// Start streaming an assistant message and return the id it will get.
    /// When a message is already streaming it is regenerated instead: its
    /// content restarts, earlier captures go stale and its highlights and
    /// annotations are dropped.
    pub fn begin_streaming(&mut self, model: Option<String>) -> MessageId {
        if let Some(pending) = self.streaming.as_mut() {
            pending.content.restart();
            pending.model = model;
            let id = pending.id;
            let epoch = pending.content.epoch();
            self.forget_message(id);
            tracing::debug!(%id, epoch, "streaming message restarted");
            return id;
        }

        let id = self.allocate_id();
        self.streaming = Some(PendingMessage { content: StreamingContent::new(), id, model });
        return id;
    }

    /// Abandon the streaming message without committing it.
    pub fn cancel_streaming(&mut self) {
        if let Some(pending) = self.streaming.take() {
            self.forget_message(pending.id);
            tracing::debug!(id = %pending.id, "streaming message cancelled");
        }
    }

    /// Capture `range` against the streaming content's current version.
    #[must_use]
    pub fn capture(&self, range: TextRange) -> Option<CapturedRange> {
        return self.streaming.as_ref().map(|pending| return pending.content.capture(range));
    }

    /// Delete the memo stored under exactly `range`, keeping the highlight.
    pub fn delete_memo(&mut self, message: MessageId, span: &SpanId, range: TextRange) -> Option<String> {
        return self.state.memos.remove_exact(message, span, range);
    }

    /// Delete the thread stored under exactly `range`, keeping the highlight.
    pub fn delete_supplementary(
        &mut self,
        message: MessageId,
        span: &SpanId,
        range: TextRange,
    ) -> Option<Vec<Message>> {
        return self.state.supplementary.remove_exact(message, span, range);
    }

    /// Build a message with a fresh id without committing it, e.g. for a
    /// supplementary thread.
    pub fn draft_message(
        &mut self,
        role: Role,
        content: &str,
        model: Option<String>,
        usage: Option<Usage>,
    ) -> Message {
        return Message {
            content: content.to_string(),
            cost: None,
            id: self.allocate_id(),
            input_tokens: usage.map(|u| return u.prompt_tokens),
            model,
            output_tokens: usage.map(|u| return u.completion_tokens),
            role,
            timestamp: Utc::now(),
        };
    }

    /// Commit the streaming message with its final usage.
    pub fn finish_streaming(&mut self, usage: Option<Usage>) -> Option<MessageId> {
        let pending = self.streaming.take()?;
        let id = pending.id;
        self.state.messages.push(Message {
            content: pending.content.into_content(),
            cost: None,
            id,
            input_tokens: usage.map(|u| return u.prompt_tokens),
            model: pending.model,
            output_tokens: usage.map(|u| return u.completion_tokens),
            role: Role::Assistant,
            timestamp: Utc::now(),
        });
        tracing::debug!(%id, "streaming message committed");
        return Some(id);
    }

    /// Rebuild an engine from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionCorrupt` if the record is semantically broken.
    pub fn from_record(record: &SessionRecord) -> Result<Self, Error> {
        return Ok(Self {
            session_id: record.id,
            state: session::deserialize(record)?,
            streaming: None,
        });
    }

    /// Handle a raw selection taken inside `segment` of a rendered span.
    ///
    /// Cross-node and collapsed selections are ignored and return `Ok(None)`
    /// without touching any store.
    ///
    /// # Errors
    ///
    /// Returns `Error::SelectionOutOfBounds` if an offset lies past the segment.
    pub fn handle_selection(
        &mut self,
        message: MessageId,
        span: &SpanId,
        segment: &Segment<'_>,
        event: &SelectionEvent,
    ) -> Result<Option<ResolvedSelection>, Error> {
        let resolved = match selection::resolve(segment, event) {
            Err(e) if e.is_ignorable_selection() => {
                tracing::debug!(%message, %span, error = %e, "selection ignored");
                return Ok(None);
            },
            Err(e) => return Err(e),
            Ok(resolved) => resolved,
        };
        self.apply_selection(message, span, resolved);
        return Ok(Some(resolved));
    }

    /// The session's highlight store.
    #[must_use]
    pub const fn highlights(&self) -> &HighlightStore {
        return &self.state.highlights;
    }

    /// The session's memo store.
    #[must_use]
    pub const fn memos(&self) -> &MemoStore {
        return &self.state.memos;
    }

    /// A committed message by id.
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        return self.state.messages.iter().find(|m| return m.id == id);
    }

    /// Committed messages in conversation order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        return &self.state.messages;
    }

    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        return Self::default();
    }

    /// Commit a complete message and return its id.
    pub fn push_message(
        &mut self,
        role: Role,
        content: &str,
        model: Option<String>,
        usage: Option<Usage>,
    ) -> MessageId {
        let message = self.draft_message(role, content, model, usage);
        let id = message.id;
        self.state.messages.push(message);
        return id;
    }

    /// Clear every message and store. Ids keep counting up.
    pub fn reset(&mut self) {
        let next_id = self.state.next_id;
        self.state = SessionState { next_id, ..SessionState::default() };
        self.streaming = None;
        tracing::debug!("session reset");
    }

    /// Highlight `range` and attach `memo` to it, replacing the memo already
    /// stored under exactly that range. Returns the replaced memo.
    pub fn save_memo(
        &mut self,
        message: MessageId,
        span: &SpanId,
        range: TextRange,
        memo: &str,
    ) -> Option<String> {
        self.state.highlights.add_range(message, span, range);
        return self.state.memos.upsert(message, span, range, memo.to_string());
    }

    /// Cut `text` into segments using the span's current highlights.
    #[must_use]
    pub fn segments<'a>(&self, message: MessageId, span: &SpanId, text: &'a str) -> Vec<Segment<'a>> {
        return segmenter::segment(text, self.state.highlights.query(message, span));
    }

    /// Storage id, once the session was saved or loaded.
    #[must_use]
    pub const fn session_id(&self) -> Option<u64> {
        return self.session_id;
    }

    /// Record the storage id assigned on save.
    pub const fn set_session_id(&mut self, id: u64) {
        self.session_id = Some(id);
    }

    /// Content of the streaming message, if any.
    #[must_use]
    pub fn streaming(&self) -> Option<&StreamingContent> {
        return self.streaming.as_ref().map(|pending| return &pending.content);
    }

    /// The session's supplementary thread store.
    #[must_use]
    pub const fn supplementary(&self) -> &SupplementaryStore {
        return &self.state.supplementary;
    }

    /// Flatten the session into a persistable record.
    ///
    /// # Errors
    ///
    /// Returns `Error::EphemeralSpan` if an annotation is keyed by an
    /// ephemeral span id and the policy rejects it.
    pub fn to_record(&self, summary: &str, options: SerializeOptions<'_>) -> Result<SessionRecord, Error> {
        return session::serialize(&self.state, self.session_id, summary, options);
    }

    /// Hand out the next message id.
    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.state.next_id.max(1));
        self.state.next_id = id.0.saturating_add(1);
        return id;
    }

    /// Drop highlights and annotations of one message.
    fn forget_message(&mut self, id: MessageId) {
        self.state.highlights.remove_message(id);
        self.state.legacy_spans.retain(|(message, _)| return *message != id);
        self.state.memos.remove_message(id);
        self.state.supplementary.remove_message(id);
    }

    /// Drop annotations of one span whose range is no longer fully highlighted.
    fn prune(&mut self, message: MessageId, span: &SpanId) {
        let highlights = &self.state.highlights;
        let memos = self.state.memos.retain(message, span, |range| {
            return highlights.covers(message, span, range);
        });
        let threads = self.state.supplementary.retain(message, span, |range| {
            return highlights.covers(message, span, range);
        });
        if !memos.is_empty() || !threads.is_empty() {
            tracing::warn!(
                %message,
                %span,
                memos = memos.len(),
                threads = threads.len(),
                "annotations removed with their highlight"
            );
        }
    }
}
