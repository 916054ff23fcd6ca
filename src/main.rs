mod commands;
mod diagnostics;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "MARGINALIA_LOG";

/// A character range inside one rendered span of one message.
#[derive(Args, Clone, Debug)]
struct AnchorArgs {
    /// Exclusive end offset in characters.
    #[arg(long)]
    end: usize,
    /// Message id (see `show`).
    #[arg(long)]
    message: u64,
    /// Span id, e.g. `p-3-1` (see `show` or `spans`).
    #[arg(long)]
    span: String,
    /// Inclusive start offset in characters.
    #[arg(long)]
    start: usize,
}

/// Command-line arguments.
#[derive(Parser)]
#[command(
    name = "marginalia",
    version,
    about = "Highlights, memos and follow-up threads on streamed markdown"
)]
struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Commands,
    /// Log at debug level unless MARGINALIA_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Append a message to a session
    AddMessage {
        /// Prompt tokens billed for the message.
        #[arg(long, requires = "output_tokens")]
        input_tokens: Option<u64>,
        /// Model that produced the message.
        #[arg(long)]
        model: Option<String>,
        /// Completion tokens billed for the message.
        #[arg(long, requires = "input_tokens")]
        output_tokens: Option<u64>,
        /// user, assistant or error.
        #[arg(long, default_value = "assistant")]
        role: String,
        /// Session id.
        session: u64,
        /// Message content file, or `-` for stdin.
        source: PathBuf,
    },
    /// Highlight a range (kept in memory only until annotated)
    Highlight {
        /// Range to act on.
        #[command(flatten)]
        anchor: AnchorArgs,
        /// Session id.
        session: u64,
    },
    /// List sessions, newest first
    List {
        /// Show sessions with ids below this one.
        #[arg(long)]
        cursor: Option<u64>,
        /// Sessions per page (defaults to `page_size` from config).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Attach or replace the memo on a range
    Memo {
        /// Range to act on.
        #[command(flatten)]
        anchor: AnchorArgs,
        /// Session id.
        session: u64,
        /// Memo text.
        text: String,
    },
    /// Create an empty session
    New {
        /// Session title.
        #[arg(long, default_value = "")]
        summary: String,
    },
    /// Render a session with highlights and annotations
    Show {
        /// Session id.
        session: u64,
    },
    /// List the span ids of a markdown file
    Spans {
        /// Markdown file.
        file: PathBuf,
    },
    /// Append a follow-up message to the thread on a range
    Supplement {
        /// Range to act on.
        #[command(flatten)]
        anchor: AnchorArgs,
        /// Model that produced the follow-up.
        #[arg(long)]
        model: Option<String>,
        /// Session id.
        session: u64,
        /// Follow-up text.
        text: String,
    },
    /// Remove a highlighted range and the annotations it carried
    Unhighlight {
        /// Range to act on.
        #[command(flatten)]
        anchor: AnchorArgs,
        /// Session id.
        session: u64,
    },
}

/// Install the stderr log subscriber.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| return EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::AddMessage { input_tokens, model, output_tokens, role, session, source } => {
            commands::add_message(session, &source, &role, model, input_tokens.zip(output_tokens))
        },
        Commands::Highlight { anchor, session } => commands::highlight(session, &anchor.into()),
        Commands::List { cursor, limit } => commands::list(cursor, limit),
        Commands::Memo { anchor, session, text } => commands::memo(session, &anchor.into(), &text),
        Commands::New { summary } => commands::new(&summary),
        Commands::Show { session } => commands::show(session),
        Commands::Spans { file } => commands::spans(&file),
        Commands::Supplement { anchor, model, session, text } => {
            commands::supplement(session, &anchor.into(), model, &text)
        },
        Commands::Unhighlight { anchor, session } => commands::unhighlight(session, &anchor.into()),
    };

    if let Err(e) = result {
        diagnostics::print_error(&e);
        return ExitCode::FAILURE;
    }
    return ExitCode::SUCCESS;
}

impl From<AnchorArgs> for commands::Anchor {
    fn from(args: AnchorArgs) -> Self {
        return Self {
            end: args.end,
            message: args.message,
            span: args.span,
            start: args.start,
        };
    }
}
