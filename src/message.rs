//! Conversation messages and the append-only buffer for a message still streaming in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::range::TextRange;

/// A range together with the content state it was captured against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapturedRange {
    /// Restart counter of the content when captured.
    pub epoch: u64,
    /// The captured range.
    pub range: TextRange,
    /// Chunk counter of the content when captured.
    pub version: u64,
}

/// A committed chat message. Content is immutable once committed.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Full message text (markdown for assistant messages).
    pub content: String,
    /// Cost restored from a persisted record when token counts are unknown.
    pub cost: Option<f64>,
    /// Process-assigned, monotonically increasing id.
    pub id: MessageId,
    /// Prompt tokens billed for this message, when known.
    pub input_tokens: Option<u64>,
    /// Model that produced the message, if any.
    pub model: Option<String>,
    /// Completion tokens billed for this message, when known.
    pub output_tokens: Option<u64>,
    /// Who wrote the message.
    pub role: Role,
    /// When the message was committed.
    pub timestamp: DateTime<Utc>,
}

/// Identifier of a message within one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(
    /// The raw numeric id.
    pub u64,
);

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Produced by the model.
    Assistant,
    /// A failed completion, kept so the transcript shows what happened.
    Error,
    /// Typed by the reader.
    User,
}

/// Content of an assistant message under construction.
///
/// Chunks are only ever appended, so a range captured at some version stays
/// valid for every later version of the same epoch. Restarting the buffer
/// (regenerating the answer) starts a new epoch and invalidates every range
/// captured before it.
#[derive(Clone, Debug, Default)]
pub struct StreamingContent {
    /// Accumulated text.
    buffer: String,
    /// Bumped on every restart.
    epoch: u64,
    /// Character count of the buffer after each appended chunk; index 0 is the empty buffer.
    lengths: Vec<usize>,
}

/// Token usage reported by the completion transport once streaming ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens generated by the model.
    pub completion_tokens: u64,
    /// Tokens sent to the model.
    pub prompt_tokens: u64,
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", self.0);
    }
}

impl Role {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        return match self {
            Self::Assistant => "assistant",
            Self::Error => "error",
            Self::User => "user",
        };
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return match s {
            "assistant" => Ok(Self::Assistant),
            "error" => Ok(Self::Error),
            "user" => Ok(Self::User),
            other => Err(Error::UnknownRole { role: other.to_string() }),
        };
    }
}

impl StreamingContent {
    /// Append one chunk and return the new version.
    pub fn append(&mut self, chunk: &str) -> u64 {
        if self.lengths.is_empty() {
            self.lengths.push(0);
        }
        let before = self.lengths.last().copied().unwrap_or(0);
        self.buffer.push_str(chunk);
        self.lengths.push(before.saturating_add(chunk.chars().count()));
        return self.version();
    }

    /// Capture `range` against the current content.
    #[must_use]
    pub fn capture(&self, range: TextRange) -> CapturedRange {
        return CapturedRange { epoch: self.epoch, range, version: self.version() };
    }

    /// Text received so far.
    #[must_use]
    pub fn content(&self) -> &str {
        return &self.buffer;
    }

    /// Current restart counter.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        return self.epoch;
    }

    /// Consume the buffer into its final text.
    #[must_use]
    pub fn into_content(self) -> String {
        return self.buffer;
    }

    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        return Self::default();
    }

    /// Throw away everything received and start a new epoch.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.lengths.clear();
        self.epoch = self.epoch.saturating_add(1);
    }

    /// Check that `captured` still addresses the same characters.
    ///
    /// # Errors
    ///
    /// Returns `Error::StaleOffsets` if the buffer was restarted since capture,
    /// if the capture claims a version that was never reached, or if the range
    /// reaches past the text that existed at the captured version.
    pub fn validate(&self, captured: &CapturedRange) -> Result<(), Error> {
        let stale = Error::StaleOffsets {
            captured_epoch: captured.epoch,
            current_epoch: self.epoch,
        };
        if captured.epoch != self.epoch {
            return Err(stale);
        }
        let known = usize::try_from(captured.version)
            .ok()
            .and_then(|v| return self.lengths.get(v).copied())
            .or_else(|| return (captured.version == 0).then_some(0));
        return match known {
            Some(len) if captured.range.end() <= len => Ok(()),
            Some(_) | None => Err(stale),
        };
    }

    /// Number of chunks appended in this epoch.
    #[must_use]
    pub fn version(&self) -> u64 {
        return u64::try_from(self.lengths.len().saturating_sub(1)).unwrap_or(u64::MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: usize, end: usize) -> TextRange {
        TextRange::new(start, end).unwrap()
    }

    #[test]
    fn versions_count_chunks() {
        let mut content = StreamingContent::new();
        assert_eq!(content.version(), 0);
        assert_eq!(content.append("Hello"), 1);
        assert_eq!(content.append(", world"), 2);
        assert_eq!(content.content(), "Hello, world");
    }

    #[test]
    fn ranges_captured_earlier_stay_valid_as_content_grows() {
        let mut content = StreamingContent::new();
        content.append("The quick");
        let captured = content.capture(r(4, 9));
        content.append(" brown fox");
        assert!(content.validate(&captured).is_ok());
    }

    #[test]
    fn range_beyond_captured_text_is_stale() {
        let mut content = StreamingContent::new();
        content.append("The");
        let captured = content.capture(r(4, 9));
        content.append(" quick");
        assert!(matches!(content.validate(&captured), Err(Error::StaleOffsets { .. })));
    }

    #[test]
    fn restart_invalidates_earlier_captures() {
        let mut content = StreamingContent::new();
        content.append("The quick brown fox");
        let captured = content.capture(r(4, 9));
        content.restart();
        assert_eq!(content.epoch(), 1);
        content.append("A completely different answer");
        let err = content.validate(&captured).unwrap_err();
        assert!(matches!(err, Error::StaleOffsets { captured_epoch: 0, current_epoch: 1 }));
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Assistant, Role::Error, Role::User] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("system".parse::<Role>().is_err());
    }
}
