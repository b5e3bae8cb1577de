//! Inspect what the compression pipeline would send for a stored history.
//!
//! Reads a JSON array of messages, runs `prepare` at the given level, and
//! prints a summary. With usage numbers it also computes the level the next
//! turn would use.
//!
//! # Examples
//!
//! ```sh
//! # Summary at level 2
//! convoy --history thread.json --level 2
//!
//! # Pipe history from stdin, print the prepared messages as JSON
//! cat thread.json | convoy --history - --level 3 --json
//!
//! # Derive the next level from last turn's usage
//! convoy --history thread.json --usage-input 150000 --usage-output 2000 \
//!   --context-limit 200000
//! ```

use clap::Parser;
use convoy_rs::{ChatMessage, TokenUsage};
use convoy_rs::agent::config::RuntimeConfig;
use convoy_rs::context::{
    CompressionController, CompressionLevel, CompressionStats, PrepareResult,
    estimate_messages_tokens, update_stats,
};
use std::io::{self, Read};
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run the compression pipeline over a stored conversation history.
#[derive(Parser)]
#[command(name = "convoy")]
struct Cli {
    /// Path to a JSON array of messages, or `-` for stdin
    #[arg(long)]
    history: String,

    /// Compression level to apply (0-4)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=4))]
    level: u8,

    /// Path to a JSON runtime config
    #[arg(long)]
    config: Option<String>,

    // ── Usage ──────────────────────────────────────────────────
    /// Input tokens reported for the last turn
    #[arg(long)]
    usage_input: Option<u64>,

    /// Output tokens reported for the last turn
    #[arg(long, default_value_t = 0)]
    usage_output: u64,

    /// Model context limit in tokens
    #[arg(long, default_value_t = 200_000)]
    context_limit: u64,

    // ── Output mode ────────────────────────────────────────────
    /// Print the prepared messages and stats as JSON
    #[arg(long)]
    json: bool,

    /// Log pipeline decisions to stderr (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_history(source: &str) -> Result<Vec<ChatMessage>, String> {
    let text = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(source).map_err(|e| format!("Failed to read {source}: {e}"))?
    };
    serde_json::from_str(&text).map_err(|e| format!("Invalid history: {e}"))
}

fn render_summary(
    history: &[ChatMessage],
    prepared: &PrepareResult,
    next: Option<&CompressionStats>,
) -> String {
    let mut out = format!(
        "level {}: {} -> {} message(s), ~{} -> ~{} tokens\n\
         removed {}, truncated {} call(s), cleared {} result(s), replaced {} image(s)\n",
        prepared.applied_level,
        history.len(),
        prepared.messages.len(),
        estimate_messages_tokens(history),
        estimate_messages_tokens(&prepared.messages),
        prepared.removed_messages,
        prepared.truncated_tool_calls,
        prepared.cleared_tool_results,
        prepared.replaced_images,
    );
    if let Some(stats) = next {
        out.push_str(&format!("next turn: {}\n", stats.to_log_string()));
    }
    out
}

fn run(cli: &Cli) -> Result<String, String> {
    let config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    let history = read_history(&cli.history)?;

    let controller = CompressionController::new(config.compression);
    let prepared = controller.prepare(&history, CompressionLevel::from(cli.level));

    let next = cli.usage_input.map(|input| {
        update_stats(
            &TokenUsage::new(input, cli.usage_output),
            cli.context_limit,
            None,
            history.len(),
        )
    });

    if cli.json {
        let value = serde_json::json!({
            "applied_level": prepared.applied_level,
            "removed_messages": prepared.removed_messages,
            "truncated_tool_calls": prepared.truncated_tool_calls,
            "cleared_tool_results": prepared.cleared_tool_results,
            "replaced_images": prepared.replaced_images,
            "messages": prepared.messages,
            "next": next,
        });
        serde_json::to_string_pretty(&value).map_err(|e| format!("Failed to encode output: {e}"))
    } else {
        Ok(render_summary(&history, &prepared, next.as_ref()))
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
