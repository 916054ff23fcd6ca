//! CLI commands over session files: new, add-message, highlight, memo,
//! supplement, unhighlight, show, list, spans.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use marginalia::annotation::Annotation;
use marginalia::config::Config;
use marginalia::engine::AnnotationEngine;
use marginalia::error::Error;
use marginalia::markdown::{self, IdentifiedSpan};
use marginalia::message::{Message, MessageId, Role, Usage};
use marginalia::range::TextRange;
use marginalia::selection::{ResolvedSelection, SelectionMode};
use marginalia::session::{SerializeOptions, SessionRecord};
use marginalia::span_id::{SpanId, SpanIdResolver};
use marginalia::storage::{FileSessionStore, SessionStore};

/// A range inside one rendered span of one message, as given on the command line.
#[derive(Clone, Debug)]
pub struct Anchor {
    /// Exclusive end offset in characters.
    pub end: usize,
    /// Message id.
    pub message: u64,
    /// Span id.
    pub span: String,
    /// Inclusive start offset in characters.
    pub start: usize,
}

/// An anchor checked against the message it names.
struct ResolvedAnchor {
    /// The message.
    message: MessageId,
    /// The range inside the span.
    range: TextRange,
    /// The span.
    span: SpanId,
}

/// Config and session store of the working directory.
struct Workspace {
    /// Loaded `.marginalia.toml`.
    config: Config,
    /// Session files.
    store: FileSessionStore,
}

/// Append a message read from a file or stdin to a session.
///
/// # Errors
///
/// Returns errors from reading the content, parsing the role, or loading and
/// saving the session.
pub fn add_message(
    session: u64,
    source: &Path,
    role: &str,
    model: Option<String>,
    tokens: Option<(u64, u64)>,
) -> Result<(), Error> {
    let role: Role = role.parse()?;
    let content = if source == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(source)?
    };
    let usage = tokens.map(|(prompt_tokens, completion_tokens)| {
        return Usage { completion_tokens, prompt_tokens };
    });

    let mut ws = Workspace::open()?;
    let (mut engine, summary) = ws.load(session)?;
    let id = engine.push_message(role, &content, model, usage);
    ws.save(&engine, &summary)?;
    println!("{id}");
    return Ok(());
}

/// Validate an anchor against the rendered spans of its message.
///
/// # Errors
///
/// Returns `Error::MessageNotFound`, `Error::SpanNotFound`,
/// `Error::InvalidRange` or `Error::SelectionOutOfBounds`.
fn check_anchor(engine: &AnnotationEngine, anchor: &Anchor) -> Result<ResolvedAnchor, Error> {
    let message = engine
        .message(MessageId(anchor.message))
        .ok_or(Error::MessageNotFound { id: anchor.message })?;
    let spans = render(message)?;
    let span = spans
        .iter()
        .find(|s| return s.id.as_str() == anchor.span)
        .ok_or_else(|| {
            return Error::SpanNotFound { message_id: anchor.message, span_id: anchor.span.clone() };
        })?;

    let range = TextRange::new(anchor.start, anchor.end)?;
    let len = span.span.text.chars().count();
    if range.end() > len {
        return Err(Error::SelectionOutOfBounds { len, offset: range.end() });
    }
    return Ok(ResolvedAnchor { message: message.id, range, span: span.id.clone() });
}

/// Highlight a range. The highlight lives only until the process exits
/// unless an annotation is attached to it.
///
/// # Errors
///
/// Returns errors from loading the session or validating the anchor.
pub fn highlight(session: u64, anchor: &Anchor) -> Result<(), Error> {
    let ws = Workspace::open()?;
    let (mut engine, _) = ws.load(session)?;
    let target = check_anchor(&engine, anchor)?;
    engine.apply_selection(
        target.message,
        &target.span,
        ResolvedSelection { mode: SelectionMode::Add, range: target.range },
    );

    let merged = engine.highlights().query(target.message, &target.span);
    for range in merged {
        println!("{} {range}", target.span);
    }
    eprintln!(
        "note: highlights without a memo or supplementary thread are not saved; \
         attach one with `marginalia memo` or `marginalia supplement`"
    );
    return Ok(());
}

/// Print one page of sessions, newest first.
///
/// # Errors
///
/// Returns errors from loading config or reading session files.
pub fn list(cursor: Option<u64>, limit: Option<usize>) -> Result<(), Error> {
    let ws = Workspace::open()?;
    let page = ws.store.list_page(cursor, limit.unwrap_or(ws.config.page_size))?;
    for item in &page.items {
        println!("{}\t{} messages\t{}", item.id, item.message_count, item.summary);
    }
    if let Some(next) = page.next_cursor {
        eprintln!("more: marginalia list --cursor {next}");
    }
    return Ok(());
}

/// Attach or replace the memo on a range.
///
/// # Errors
///
/// Returns errors from loading, validating or saving.
pub fn memo(session: u64, anchor: &Anchor, text: &str) -> Result<(), Error> {
    let mut ws = Workspace::open()?;
    let (mut engine, summary) = ws.load(session)?;
    let target = check_anchor(&engine, anchor)?;
    let previous = engine.save_memo(target.message, &target.span, target.range, text);
    ws.save(&engine, &summary)?;

    if previous.is_some() {
        eprintln!("Replaced memo on {} {}", target.span, target.range);
    } else {
        eprintln!("Saved memo on {} {}", target.span, target.range);
    }
    return Ok(());
}

/// Create an empty session and print its id.
///
/// # Errors
///
/// Returns errors from loading config or writing the session file.
pub fn new(summary: &str) -> Result<(), Error> {
    let mut ws = Workspace::open()?;
    let mut record = SessionRecord { id: None, messages: Vec::new(), summary: summary.to_string() };
    let id = ws.store.save(&mut record)?;
    println!("{id}");
    return Ok(());
}

/// Rendered spans of a message's content.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the markdown cannot be parsed.
fn render(message: &Message) -> Result<Vec<IdentifiedSpan>, Error> {
    return markdown::render_spans(&message.content, &mut SpanIdResolver::new());
}

/// Render a span's text with highlighted segments wrapped in `==`.
fn render_marked(engine: &AnnotationEngine, message: MessageId, span: &IdentifiedSpan) -> String {
    let mut out = String::new();
    for segment in engine.segments(message, &span.id, &span.span.text) {
        if segment.highlighted {
            let _ = write!(out, "=={}==", segment.text);
        } else {
            out.push_str(segment.text);
        }
    }
    return out;
}

/// Render a session with highlights and annotations.
///
/// # Errors
///
/// Returns errors from loading the session or parsing message markdown.
pub fn show(session: u64) -> Result<(), Error> {
    let ws = Workspace::open()?;
    let (engine, summary) = ws.load(session)?;

    let mut out = String::new();
    let _ = writeln!(out, "# {summary} (session {session})");
    for message in engine.messages() {
        let model = message.model.as_deref().map(|m| return format!(" ({m})")).unwrap_or_default();
        let _ = writeln!(out, "\n## Message {} · {}{model}\n", message.id, message.role.as_str());

        let spans = render(message)?;
        for span in &spans {
            let _ = writeln!(out, "[{}] {}", span.id, render_marked(&engine, message.id, span));
            write_annotations(&mut out, &engine, message.id, &span.id);
        }

        let rendered: BTreeSet<&SpanId> = spans.iter().map(|s| return &s.id).collect();
        let mut orphaned: BTreeSet<&SpanId> = engine.memos().spans(message.id).into_iter().collect();
        orphaned.extend(engine.supplementary().spans(message.id));
        for span in orphaned.difference(&rendered) {
            let _ = writeln!(out, "[{span}] (not rendered)");
            write_annotations(&mut out, &engine, message.id, span);
        }
    }
    print!("{out}");
    return Ok(());
}

/// Print every span id of a markdown file with its flattened text.
///
/// # Errors
///
/// Returns errors from reading or parsing the file.
pub fn spans(file: &Path) -> Result<(), Error> {
    let source = std::fs::read_to_string(file)?;
    for span in markdown::render_spans(&source, &mut SpanIdResolver::new())? {
        println!("{}\t{}", span.id, span.span.text.replace('\n', " "));
    }
    return Ok(());
}

/// Append an assistant follow-up to the thread on a range.
///
/// # Errors
///
/// Returns errors from loading, validating or saving.
pub fn supplement(session: u64, anchor: &Anchor, model: Option<String>, text: &str) -> Result<(), Error> {
    let mut ws = Workspace::open()?;
    let (mut engine, summary) = ws.load(session)?;
    let target = check_anchor(&engine, anchor)?;
    let item = engine.draft_message(Role::Assistant, text, model, None);
    engine.append_supplementary(target.message, &target.span, target.range, vec![item]);
    ws.save(&engine, &summary)?;
    eprintln!("Added follow-up on {} {}", target.span, target.range);
    return Ok(());
}

/// Remove a highlighted range; annotations no longer fully highlighted go with it.
///
/// # Errors
///
/// Returns errors from loading, validating or saving.
pub fn unhighlight(session: u64, anchor: &Anchor) -> Result<(), Error> {
    let mut ws = Workspace::open()?;
    let (mut engine, summary) = ws.load(session)?;
    let target = check_anchor(&engine, anchor)?;
    engine.apply_selection(
        target.message,
        &target.span,
        ResolvedSelection { mode: SelectionMode::Remove, range: target.range },
    );
    ws.save(&engine, &summary)?;
    eprintln!("Removed {} from {}", target.range, target.span);
    return Ok(());
}

impl Workspace {
    /// Load one session into an engine, returning it with its summary.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` if no such session exists, or errors
    /// from reading and rebuilding the record.
    fn load(&self, id: u64) -> Result<(AnnotationEngine, String), Error> {
        let record = self.store.load_one(id)?.ok_or(Error::SessionNotFound { id })?;
        let engine = AnnotationEngine::from_record(&record)?;
        return Ok((engine, record.summary));
    }

    /// Load config from the current directory and open its session store.
    ///
    /// # Errors
    ///
    /// Returns errors from config loading.
    fn open() -> Result<Self, Error> {
        let root = PathBuf::from(".");
        let config = Config::load(&root)?;
        let store = FileSessionStore::new(config.sessions_dir.clone());
        return Ok(Self { config, store });
    }

    /// Persist an engine under its session id.
    ///
    /// # Errors
    ///
    /// Returns `Error::EphemeralSpan` under the reject policy, or write errors.
    fn save(&mut self, engine: &AnnotationEngine, summary: &str) -> Result<u64, Error> {
        let options = SerializeOptions { policy: self.config.ephemeral_spans, pricing: &self.config.pricing };
        let mut record = engine.to_record(summary, options)?;
        return self.store.save(&mut record);
    }
}

/// List the annotations of one span under its rendered text.
fn write_annotations(out: &mut String, engine: &AnnotationEngine, message: MessageId, span: &SpanId) {
    let mut ranges: BTreeSet<TextRange> =
        engine.memos().entries(message, span).iter().map(|e| return e.range).collect();
    ranges.extend(engine.supplementary().entries(message, span).iter().map(|e| return e.range));

    for range in ranges {
        for annotation in engine.annotations(message, span, range) {
            match annotation {
                Annotation::Memo(memo) => {
                    let _ = writeln!(out, "  - {range} memo: {memo}");
                },
                Annotation::Supplementary(thread) => {
                    let _ = writeln!(out, "  - {range} thread:");
                    for item in thread {
                        let _ = writeln!(out, "    - {}: {}", item.role.as_str(), item.content);
                    }
                },
            }
        }
    }
}
