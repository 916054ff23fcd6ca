/// Crate-level error types for marginalia.
use std::path::PathBuf;

/// Every failure carries enough context to produce a diagnostic without a
/// debugger. "Not found" results of exact-range lookups are `None`, never an
/// error value.
#[allow(clippy::error_impl_error, reason = "crate-wide error type re-exported as marginalia::Error")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The selection collapsed to a caret (zero characters selected).
    #[error("selection is collapsed at offset {offset}")]
    CollapsedSelection {
        /// Local offset of the caret inside the segment.
        offset: usize,
    },

    /// Config file exists but cannot be used.
    #[error("config invalid: {}: {reason}", path.display())]
    ConfigInvalid {
        /// Path to the offending config file.
        path: PathBuf,
        /// Why the config was rejected.
        reason: String,
    },

    /// The selection's anchor and focus live in different text nodes.
    #[error("selection spans text nodes {anchor} and {focus}")]
    CrossNodeSelection {
        /// Render-local id of the node where the selection started.
        anchor: usize,
        /// Render-local id of the node where the selection ended.
        focus: usize,
    },

    /// An annotation is keyed by a span id that will not survive a reparse.
    #[error("annotation on message {message_id} uses ephemeral span id `{span_id}`")]
    EphemeralSpan {
        /// Message the annotation belongs to.
        message_id: u64,
        /// The ephemeral span id.
        span_id: String,
    },

    /// A range was constructed with `start >= end`.
    #[error("invalid range: start {start} must be below end {end}")]
    InvalidRange {
        /// Requested end offset.
        end: usize,
        /// Requested start offset.
        start: usize,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization of a session record failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped serde_json error.
        #[from]
        serde_json::Error,
    ),

    /// No committed message with this id exists in the session.
    #[error("message not found: {id}")]
    MessageNotFound {
        /// The requested message id.
        id: u64,
    },

    /// Tree-sitter failed to parse markdown content.
    #[error("parse failed: {reason}")]
    ParseFailed {
        /// Description of the parse failure.
        reason: String,
    },

    /// A local selection offset falls outside the segment it was taken from.
    #[error("selection offset {offset} is outside a segment of {len} characters")]
    SelectionOutOfBounds {
        /// Length of the segment in characters.
        len: usize,
        /// The offending local offset.
        offset: usize,
    },

    /// A persisted session record is structurally valid JSON but semantically broken.
    #[error("session corrupt: {reason}")]
    SessionCorrupt {
        /// Description of the corruption.
        reason: String,
    },

    /// No session with this id exists in the store.
    #[error("session not found: {id}")]
    SessionNotFound {
        /// The requested session id.
        id: u64,
    },

    /// The message renders no span with this id.
    #[error("message {message_id} has no span `{span_id}`")]
    SpanNotFound {
        /// Message that was searched.
        message_id: u64,
        /// The requested span id.
        span_id: String,
    },

    /// A captured range was recorded against content that has since been restarted.
    #[error("stale offsets: captured in epoch {captured_epoch}, content is now at epoch {current_epoch}")]
    StaleOffsets {
        /// Epoch the range was captured in.
        captured_epoch: u64,
        /// Epoch of the content now.
        current_epoch: u64,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// A message role string is not one of user, assistant, error.
    #[error("unknown role: `{role}`")]
    UnknownRole {
        /// The unrecognized role string.
        role: String,
    },
}

impl Error {
    /// Selection errors the caller should swallow: no popover, no state change.
    #[must_use]
    pub const fn is_ignorable_selection(&self) -> bool {
        return matches!(self, Self::CollapsedSelection { .. } | Self::CrossNodeSelection { .. });
    }
}
