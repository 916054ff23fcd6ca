//! Extract renderable text spans from markdown via tree-sitter-md.
//!
//! The block grammar finds paragraphs, headings, list items, quotes, code
//! blocks and table cells. Each span's inline content is re-parsed with the
//! inline grammar and flattened: emphasis and code-span delimiters, link
//! brackets and destinations, and escape backslashes are dropped, so offsets
//! count the characters a reader actually sees. Reference-style links whose
//! label has no definition in the document stay verbatim, brackets included.

use std::collections::HashSet;
use std::ops::Range;

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::Error;
use crate::span_id::{SourcePosition, SpanId, SpanIdResolver, SpanKind};

/// A rendered span with its resolved identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentifiedSpan {
    /// The span's id for this render pass.
    pub id: SpanId,
    /// The span itself.
    pub span: RenderedSpan,
}

/// Inline text being flattened, with the document's reference definitions.
struct InlineSource<'a> {
    /// Normalized labels defined anywhere in the document.
    definitions: &'a HashSet<String>,
    /// The inline text the tree was parsed from.
    text: &'a str,
}

/// One text-bearing node of a parsed document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedSpan {
    /// What kind of block the text came from.
    pub kind: SpanKind,
    /// Where the block starts in the source, when known.
    pub position: Option<SourcePosition>,
    /// Flattened text used for offset computation.
    pub text: String,
}

/// Normalized labels of every link reference definition under `node`.
fn collect_definitions(node: Node<'_>, source: &str, labels: &mut HashSet<String>) {
    if node.kind() == "link_reference_definition" {
        if let Some(label) = named_child(node, "link_label") {
            labels.insert(normalize_label(source.get(label.byte_range()).unwrap_or_default()));
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_definitions(child, source, labels);
    }
}

/// Collect the byte ranges of inline markup that a reader does not see.
fn collect_inline_markup(
    node: Node<'_>,
    inline: &InlineSource<'_>,
    drop: &mut Vec<Range<usize>>,
) {
    match node.kind() {
        "code_span_delimiter" | "emphasis_delimiter" => {
            drop.push(node.byte_range());
            return;
        },
        "hard_line_break" => {
            // Keep the newline, drop the backslash or spaces before it.
            drop.push(node.start_byte()..node.end_byte().saturating_sub(1));
            return;
        },
        "backslash_escape" => {
            drop.push(node.start_byte()..node.start_byte().saturating_add(1));
            return;
        },
        "collapsed_reference_link" | "full_reference_link" | "image" | "inline_link"
        | "shortcut_link" => {
            if is_resolved_link(node, inline) {
                keep_only_label(node, inline, drop);
                return;
            }
        },
        "uri_autolink" | "email_autolink" => {
            drop.push(node.start_byte()..node.start_byte().saturating_add(1));
            drop.push(node.end_byte().saturating_sub(1)..node.end_byte());
            return;
        },
        _ => {},
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_inline_markup(child, inline, drop);
    }
}

/// Remove `drop` byte ranges from `source`. Ranges may arrive unsorted.
fn cut_ranges(source: &str, mut drop: Vec<Range<usize>>) -> String {
    drop.sort_by_key(|r| return r.start);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0_usize;
    for range in drop {
        if range.start > cursor {
            out.push_str(source.get(cursor..range.start).unwrap_or_default());
        }
        cursor = cursor.max(range.end);
    }
    out.push_str(source.get(cursor..).unwrap_or_default());
    return out;
}

/// Flatten one block's inline content into reader-visible text.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the inline grammar cannot parse the text.
fn flatten_inline(raw: &str, definitions: &HashSet<String>) -> Result<String, Error> {
    let tree = parse_with(raw, &tree_sitter_md::INLINE_LANGUAGE.into())?;
    let inline = InlineSource { definitions, text: raw };
    let mut drop = Vec::new();
    collect_inline_markup(tree.root_node(), &inline, &mut drop);
    return Ok(cut_ranges(raw, drop));
}

/// Heading level from an ATX marker or setext underline child.
fn heading_level(heading: Node<'_>) -> u8 {
    let mut cursor = heading.walk();
    for child in heading.children(&mut cursor) {
        let level = match child.kind() {
            "atx_h1_marker" | "setext_h1_underline" => 1,
            "atx_h2_marker" | "setext_h2_underline" => 2,
            "atx_h3_marker" => 3,
            "atx_h4_marker" => 4,
            "atx_h5_marker" => 5,
            "atx_h6_marker" => 6,
            _ => continue,
        };
        return level;
    }
    return 1;
}

/// Raw text of a block-level `inline` node with block continuation markers
/// (quote markers, list indentation on continuation lines) removed.
fn inline_source(inline: Node<'_>, source: &str) -> String {
    let base = inline.start_byte();
    let raw = source.get(inline.byte_range()).unwrap_or_default();
    let mut drop = Vec::new();
    let mut cursor = inline.walk();
    for child in inline.children(&mut cursor) {
        if child.kind() == "block_continuation" {
            drop.push(child.start_byte().saturating_sub(base)..child.end_byte().saturating_sub(base));
        }
    }
    return cut_ranges(raw, drop);
}

/// Whether a link or image renders as one: inline forms always do, reference
/// forms only when their label is defined.
fn is_resolved_link(node: Node<'_>, inline: &InlineSource<'_>) -> bool {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    if node.kind() == "inline_link" || children.iter().any(|c| return c.kind() == "(") {
        return true;
    }
    let label = children
        .iter()
        .find(|c| return c.kind() == "link_label")
        .or_else(|| {
            return children
                .iter()
                .find(|c| return c.kind() == "link_text" || c.kind() == "image_description");
        });
    let Some(label) = label else {
        return false;
    };
    let raw = inline.text.get(label.byte_range()).unwrap_or_default();
    return inline.definitions.contains(&normalize_label(raw));
}

/// Drop everything of a link or image except its visible label.
fn keep_only_label(node: Node<'_>, inline: &InlineSource<'_>, drop: &mut Vec<Range<usize>>) {
    let mut cursor = node.walk();
    let label = node
        .children(&mut cursor)
        .find(|c| return c.kind() == "link_text" || c.kind() == "image_description");
    let Some(label) = label else {
        return;
    };
    drop.push(node.start_byte()..label.start_byte());
    drop.push(label.end_byte()..node.end_byte());

    let mut inner = label.walk();
    for child in label.children(&mut inner) {
        collect_inline_markup(child, inline, drop);
    }
}

/// The first direct child of the given kind.
fn named_child<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    return node.children(&mut cursor).find(|c| return c.kind() == kind);
}

/// Reference label with brackets removed, whitespace collapsed, and case folded.
fn normalize_label(raw: &str) -> String {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    return inner.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
}

/// Parse markdown and return its renderable spans in document order.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if tree-sitter cannot parse the source.
pub fn parse_spans(source: &str) -> Result<Vec<RenderedSpan>, Error> {
    let tree = parse_with(source, &tree_sitter_md::LANGUAGE.into())?;
    let mut definitions = HashSet::new();
    collect_definitions(tree.root_node(), source, &mut definitions);
    let mut spans = Vec::new();
    walk_blocks(tree.root_node(), source, &definitions, &mut spans)?;
    tracing::debug!(count = spans.len(), "markdown spans extracted");
    return Ok(spans);
}

/// Parse `source` with `language`.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the language cannot be set or parsing fails.
fn parse_with(source: &str, language: &Language) -> Result<Tree, Error> {
    let mut parser = Parser::new();
    parser.set_language(language).map_err(|e| {
        return Error::ParseFailed { reason: e.to_string() };
    })?;

    return parser.parse(source, None).ok_or_else(|| {
        return Error::ParseFailed { reason: "tree-sitter returned None".to_string() };
    });
}

/// Source position of a node, one-based.
fn position_of(node: Node<'_>) -> SourcePosition {
    let point = node.start_position();
    return SourcePosition {
        column: point.column.saturating_add(1),
        line: point.row.saturating_add(1),
    };
}

/// Parse markdown and assign span ids in one render pass.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if tree-sitter cannot parse the source.
pub fn render_spans(source: &str, resolver: &mut SpanIdResolver) -> Result<Vec<IdentifiedSpan>, Error> {
    let spans = parse_spans(source)?;
    return Ok(spans
        .into_iter()
        .enumerate()
        .map(|(node_key, span)| {
            let id = resolver.resolve(span.kind, span.position, node_key);
            return IdentifiedSpan { id, span };
        })
        .collect());
}

/// Push a span unless its flattened text is empty.
fn push_span(spans: &mut Vec<RenderedSpan>, kind: SpanKind, node: Node<'_>, text: &str) {
    let text = text.trim_end();
    if text.is_empty() {
        return;
    }
    spans.push(RenderedSpan {
        kind,
        position: Some(position_of(node)),
        text: text.to_string(),
    });
}

/// Recursively walk block nodes and collect spans.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if inline flattening fails.
fn walk_blocks(
    node: Node<'_>,
    source: &str,
    definitions: &HashSet<String>,
    spans: &mut Vec<RenderedSpan>,
) -> Result<(), Error> {
    match node.kind() {
        "atx_heading" | "setext_heading" => {
            let content = named_child(node, "inline").or_else(|| {
                return named_child(node, "paragraph").and_then(|p| return named_child(p, "inline"));
            });
            if let Some(inline) = content {
                let text = flatten_inline(&inline_source(inline, source), definitions)?;
                push_span(spans, SpanKind::Heading(heading_level(node)), node, text.trim_start());
            }
            return Ok(());
        },
        "paragraph" => {
            let kind = match node.parent().map(|p| return p.kind()) {
                Some("block_quote") => SpanKind::BlockQuote,
                Some("list_item") => SpanKind::ListItem,
                _ => SpanKind::Paragraph,
            };
            if let Some(inline) = named_child(node, "inline") {
                let text = flatten_inline(&inline_source(inline, source), definitions)?;
                push_span(spans, kind, node, &text);
            }
            return Ok(());
        },
        "fenced_code_block" => {
            if let Some(content) = named_child(node, "code_fence_content") {
                let text = source.get(content.byte_range()).unwrap_or_default();
                push_span(spans, SpanKind::CodeBlock, node, text);
            }
            return Ok(());
        },
        "indented_code_block" => {
            let text = source.get(node.byte_range()).unwrap_or_default();
            push_span(spans, SpanKind::CodeBlock, node, text.trim_start());
            return Ok(());
        },
        "pipe_table_cell" => {
            let raw = source.get(node.byte_range()).unwrap_or_default().trim();
            let text = flatten_inline(raw, definitions)?;
            push_span(spans, SpanKind::TableCell, node, &text);
            return Ok(());
        },
        _ => {},
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_blocks(child, source, definitions, spans)?;
    }
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<(String, String)> {
        let mut resolver = SpanIdResolver::new();
        render_spans(source, &mut resolver)
            .unwrap()
            .into_iter()
            .map(|s| (s.id.to_string(), s.span.text))
            .collect()
    }

    #[test]
    fn paragraphs_get_positional_ids() {
        let spans = texts("First paragraph.\n\nSecond one.\n");
        assert_eq!(
            spans,
            vec![
                ("p-1-1".to_string(), "First paragraph.".to_string()),
                ("p-3-1".to_string(), "Second one.".to_string()),
            ]
        );
    }

    #[test]
    fn heading_level_and_text() {
        let spans = texts("## Getting Started\n\nBody.\n");
        assert_eq!(spans.first(), Some(&("h2-1-1".to_string(), "Getting Started".to_string())));
    }

    #[test]
    fn list_items_are_tagged() {
        let spans = texts("- alpha\n- beta\n");
        let ids: Vec<&str> = spans.iter().map(|(id, _)| id.as_str()).collect();
        assert!(ids.iter().all(|id| id.starts_with("li-")), "{ids:?}");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans.get(1).map(|(_, t)| t.as_str()), Some("beta"));
    }

    #[test]
    fn emphasis_markers_are_not_counted() {
        let spans = texts("The *quick* brown **fox**\n");
        assert_eq!(spans.first().map(|(_, t)| t.as_str()), Some("The quick brown fox"));
    }

    #[test]
    fn links_keep_only_their_label() {
        let spans = texts("See [the docs](https://example.com) now\n");
        assert_eq!(spans.first().map(|(_, t)| t.as_str()), Some("See the docs now"));
    }

    #[test]
    fn undefined_reference_keeps_its_brackets() {
        let spans = texts("See a[0] and b[1] here\n");
        assert_eq!(spans.first().map(|(_, t)| t.as_str()), Some("See a[0] and b[1] here"));
    }

    #[test]
    fn defined_reference_keeps_only_its_label() {
        let source = "Read [the Docs] or [guide][G] now.\n\n\
            [the docs]: https://example.com\n\
            [g]: https://example.org\n";
        let spans = texts(source);
        assert_eq!(spans.first().map(|(_, t)| t.as_str()), Some("Read the Docs or guide now."));
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn reparse_yields_identical_ids() {
        let source = "# Title\n\nSome text.\n\n- item\n";
        assert_eq!(texts(source), texts(source));
    }

    #[test]
    fn cut_ranges_handles_overlap_and_order() {
        assert_eq!(cut_ranges("abcdefgh", vec![4..6, 0..2, 1..3]), "dgh");
    }
}
