//! Span identifiers: stable when derived from source position, ephemeral otherwise.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Prefix carried by every ephemeral id so persisted ids can be classified again.
const EPHEMERAL_PREFIX: &str = "ephemeral-";

/// One-based line/column of a node's first character in the markdown source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// One-based column, counted in bytes like the parser reports it.
    pub column: usize,
    /// One-based line number.
    pub line: usize,
}

/// Identity of a renderable span.
///
/// `Stable` ids are derived from structural position and regenerate identically
/// when the same markdown is parsed again. `Ephemeral` ids are random and live
/// only as long as one render tree; annotations keyed by them are orphaned after
/// a reload, so callers can refuse to persist them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpanId {
    /// Random id, valid for one render pass.
    Ephemeral(String),
    /// `{kind}-{line}-{column}` id derived from source position.
    Stable(String),
}

/// Kind of a renderable text-bearing node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Paragraph inside a block quote.
    BlockQuote,
    /// Fenced or indented code block.
    CodeBlock,
    /// ATX or setext heading with its level (1-6).
    Heading(u8),
    /// Paragraph that is the body of a list item.
    ListItem,
    /// Top-level paragraph.
    Paragraph,
    /// Cell of a pipe table.
    TableCell,
}

/// Assigns span ids during one render pass.
///
/// Nodes without a source position get a random id the first time they are
/// seen; the id is cached under the caller's render-local node key so that
/// re-rendering the same tree hands out the same id.
#[derive(Debug, Default)]
pub struct SpanIdResolver {
    /// Ephemeral ids already issued, keyed by render-local node key.
    ephemeral: HashMap<usize, SpanId>,
}

impl SpanId {
    /// The raw id string, as persisted in `clientSideId`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        return match self {
            Self::Ephemeral(id) | Self::Stable(id) => id,
        };
    }

    /// Build a fresh random id.
    #[must_use]
    pub fn ephemeral() -> Self {
        return Self::Ephemeral(format!("{EPHEMERAL_PREFIX}{}", uuid::Uuid::new_v4()));
    }

    /// Whether annotations keyed by this id survive a reparse.
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        return matches!(self, Self::Stable(_));
    }

    /// Classify a persisted id string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        return Self::from(raw.to_string());
    }

    /// Derive the positional id for a node.
    #[must_use]
    pub fn stable(kind: SpanKind, position: SourcePosition) -> Self {
        return Self::Stable(format!("{}-{}-{}", kind.tag(), position.line, position.column));
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f.write_str(self.as_str());
    }
}

impl From<SpanId> for String {
    fn from(id: SpanId) -> Self {
        return match id {
            SpanId::Ephemeral(raw) | SpanId::Stable(raw) => raw,
        };
    }
}

impl From<String> for SpanId {
    fn from(raw: String) -> Self {
        if raw.starts_with(EPHEMERAL_PREFIX) {
            return Self::Ephemeral(raw);
        }
        return Self::Stable(raw);
    }
}

impl SpanKind {
    /// Short tag used as the id prefix, mirroring the HTML element a renderer emits.
    #[must_use]
    pub fn tag(self) -> String {
        return match self {
            Self::BlockQuote => "blockquote".to_string(),
            Self::CodeBlock => "pre".to_string(),
            Self::Heading(level) => format!("h{level}"),
            Self::ListItem => "li".to_string(),
            Self::Paragraph => "p".to_string(),
            Self::TableCell => "td".to_string(),
        };
    }
}

impl SpanIdResolver {
    /// Forget every ephemeral id; the next render pass hands out new ones.
    pub fn clear(&mut self) {
        self.ephemeral.clear();
    }

    /// Create a resolver for a new render pass.
    #[must_use]
    pub fn new() -> Self {
        return Self::default();
    }

    /// Resolve the id of one node.
    ///
    /// Positional ids are recomputed on every call and need no caching.
    pub fn resolve(
        &mut self,
        kind: SpanKind,
        position: Option<SourcePosition>,
        node_key: usize,
    ) -> SpanId {
        if let Some(position) = position {
            return SpanId::stable(kind, position);
        }
        return self.ephemeral.entry(node_key).or_insert_with(SpanId::ephemeral).clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_ids_are_deterministic() {
        let mut first = SpanIdResolver::new();
        let mut second = SpanIdResolver::new();
        let pos = Some(SourcePosition { column: 1, line: 3 });

        let a = first.resolve(SpanKind::Paragraph, pos, 0);
        let b = second.resolve(SpanKind::Paragraph, pos, 99);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "p-3-1");
        assert!(a.is_stable());
    }

    #[test]
    fn heading_level_is_part_of_the_id() {
        let pos = SourcePosition { column: 1, line: 1 };
        assert_eq!(SpanId::stable(SpanKind::Heading(2), pos).as_str(), "h2-1-1");
    }

    #[test]
    fn ephemeral_ids_are_cached_per_node_for_one_render() {
        let mut resolver = SpanIdResolver::new();
        let a = resolver.resolve(SpanKind::ListItem, None, 7);
        let again = resolver.resolve(SpanKind::ListItem, None, 7);
        let other = resolver.resolve(SpanKind::ListItem, None, 8);

        assert_eq!(a, again);
        assert_ne!(a, other);
        assert!(!a.is_stable());

        resolver.clear();
        assert_ne!(resolver.resolve(SpanKind::ListItem, None, 7), a);
    }

    #[test]
    fn parse_recovers_variant_from_prefix() {
        let eph = SpanId::ephemeral();
        assert_eq!(SpanId::parse(eph.as_str()), eph);
        assert_eq!(SpanId::parse("li-4-3"), SpanId::Stable("li-4-3".to_string()));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = SpanId::Stable("p-1-1".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p-1-1\"");
        let back: SpanId = serde_json::from_str("\"p-1-1\"").unwrap();
        assert_eq!(back, id);
    }
}
