use marginalia::Error;
use marginalia::config::CONFIG_FILE;

/// ANSI bold on.
const BOLD: &str = "\x1b[1m";
/// ANSI reset.
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Diagnostic for a persisted span id that cannot be reloaded.
fn render_ephemeral_span(message_id: u64, span_id: &str) -> String {
    return format!(
        "\
# Error: Ephemeral Span

An annotation on message {message_id} is keyed by `{span_id}`, a span id
generated at random for one render. It would not match any span after a reload.

## Fix

Annotate a span with a positional id (see `marginalia spans`), or drop such
annotations on save by adding this to `{CONFIG_FILE}`:

    ephemeral_spans = \"drop\"
"
    );
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where there is one,
/// how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigInvalid { path, reason } => format!(
            "\
# Error: Invalid Config

`{}`: {reason}
",
            path.display()
        ),
        Error::EphemeralSpan { message_id, span_id } => render_ephemeral_span(*message_id, span_id),
        Error::InvalidRange { end, start } => format!(
            "\
# Error: Invalid Range

Start {start} must be below end {end}.
"
        ),
        Error::MessageNotFound { id } => format!(
            "\
# Error: Message Not Found

The session has no message {id}.

## Fix

Run `marginalia show <session>` to see message ids.
"
        ),
        Error::SelectionOutOfBounds { len, offset } => format!(
            "\
# Error: Range Out Of Bounds

Offset {offset} lies past the end of a span of {len} characters.
"
        ),
        Error::SessionCorrupt { reason } => format!(
            "\
# Error: Session Corrupt

{reason}
"
        ),
        Error::SessionNotFound { id } => format!(
            "\
# Error: Session Not Found

No session with id {id}.

## Fix

Run `marginalia list` to see existing sessions.
"
        ),
        Error::SpanNotFound { message_id, span_id } => render_span_not_found(*message_id, span_id),
        Error::TomlDe(err) => format!(
            "\
# Error: Invalid TOML

{err}
"
        ),
        Error::CollapsedSelection { .. }
        | Error::CrossNodeSelection { .. }
        | Error::Io(_)
        | Error::Json(_)
        | Error::ParseFailed { .. }
        | Error::StaleOffsets { .. }
        | Error::UnknownRole { .. } => format!(
            "\
# Error

{e}
"
        ),
    };
}

/// Diagnostic for an anchor naming a span the message does not render.
fn render_span_not_found(message_id: u64, span_id: &str) -> String {
    return format!(
        "\
# Error: Span Not Found

Message {message_id} renders no span `{span_id}`.

## Fix

List the message's spans with `marginalia show <session>`.
"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_suggests_list() {
        let md = render_error(&Error::SessionNotFound { id: 4 });
        assert!(md.starts_with("# Error: Session Not Found"));
        assert!(md.contains("marginalia list"));
    }

    #[test]
    fn ephemeral_span_names_the_config_key() {
        let md = render_error(&Error::EphemeralSpan { message_id: 2, span_id: "ephemeral-x".to_string() });
        assert!(md.contains("`ephemeral-x`"));
        assert!(md.contains("ephemeral_spans = \"drop\""));
    }

    #[test]
    fn generic_variants_fall_back_to_display() {
        let md = render_error(&Error::UnknownRole { role: "system".to_string() });
        assert!(md.contains("unknown role: `system`"));
    }
}
