//! Run one compaction pass over a saved conversation and print the result.
//!
//! The conversation is a JSON array of OpenAI-style messages. Reads the API
//! key from the `OPENROUTER_KEY` environment variable (not needed with
//! `--dry-run`).
//!
//! # Examples
//!
//! ```sh
//! # Compact once usage passes 80% of a 128k window, keeping the last 10 messages
//! condense session.json --trigger fraction:0.8 --keep messages:10 \
//!   --max-input-tokens 128000 --max-output-tokens 8192
//!
//! # See what would happen without calling the model
//! condense session.json --trigger messages:40 --dry-run
//!
//! # Several triggers, token-based keep, stats on stderr
//! condense session.json --trigger tokens:100000 --trigger messages:200 \
//!   --keep tokens:20000 --stats > compacted.json
//! ```

use clap::Parser;
use condense_rs::DEFAULT_MODEL;
use condense_rs::api::model::ModelFuture;
use condense_rs::context::CompactionPlan;
use condense_rs::prelude::*;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Compact an LLM conversation by summarizing its oldest messages.
#[derive(Parser)]
#[command(name = "condense")]
struct Cli {
    /// JSON file holding the conversation (an array of messages)
    conversation: PathBuf,

    // ── When to compact ────────────────────────────────────────
    /// Trigger condition: fraction:<f>, tokens:<n> or messages:<n> (repeatable)
    #[arg(long = "trigger", value_name = "KIND:VALUE")]
    triggers: Vec<String>,

    // ── How much to keep ───────────────────────────────────────
    /// Recent history kept verbatim: fraction:<f>, tokens:<n> or messages:<n>
    #[arg(long, value_name = "KIND:VALUE", default_value = "messages:5")]
    keep: String,

    /// Model input ceiling in tokens
    #[arg(long)]
    max_input_tokens: Option<usize>,

    /// Tokens reserved for the model's reply
    #[arg(long)]
    max_output_tokens: Option<usize>,

    /// Cap on tokens of history sent to the summarizer
    #[arg(long)]
    trim_tokens: Option<usize>,

    // ── Summarization model ────────────────────────────────────
    /// Model used to write the summary
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Give up on the summary after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retries for transient API errors
    #[arg(long, default_value_t = 2)]
    retries: u32,

    // ── Output ─────────────────────────────────────────────────
    /// Evaluate the trigger and cutoff only; never call the model
    #[arg(long)]
    dry_run: bool,

    /// Print compaction statistics to stderr
    #[arg(long)]
    stats: bool,

    /// Log debug details to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// How the run failed. Configuration problems exit with 2, everything else with 1.
enum Failure {
    Config(ConfigError),
    Run(String),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Config(_) => 2,
            Failure::Run(_) => 1,
        }
    }
}

impl From<ConfigError> for Failure {
    fn from(e: ConfigError) -> Self {
        Failure::Config(e)
    }
}

impl From<String> for Failure {
    fn from(e: String) -> Self {
        Failure::Run(e)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Config(e) => write!(f, "invalid configuration: {e}"),
            Failure::Run(e) => write!(f, "{e}"),
        }
    }
}

/// Stand-in model for `--dry-run`. Never reached: dry runs stop after planning.
struct DryRunModel;

impl SummaryModel for DryRunModel {
    fn complete_async<'a>(&'a self, _prompt: &'a str) -> ModelFuture<'a> {
        Box::pin(async { Err("dry run: model calls are disabled".to_string()) })
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn load_conversation(path: &Path) -> Result<Vec<Message>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse '{}': {e}", path.display()))
}

fn build_config(cli: &Cli) -> Result<CompactionConfig, ConfigError> {
    let triggers = cli
        .triggers
        .iter()
        .map(|t| t.parse::<ContextSize>())
        .collect::<Result<Vec<_>, _>>()?;
    let mut config = CompactionConfig::default()
        .with_triggers(triggers)
        .with_keep(cli.keep.parse()?);
    if let Some(tokens) = cli.max_input_tokens {
        config = config.with_max_input_tokens(tokens);
    }
    if let Some(tokens) = cli.max_output_tokens {
        config = config.with_max_output_tokens(tokens);
    }
    if cli.trim_tokens.is_some() {
        config = config.with_trim_tokens(cli.trim_tokens);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_summary_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

fn build_model(cli: &Cli) -> Result<Arc<dyn SummaryModel>, String> {
    if cli.dry_run {
        return Ok(Arc::new(DryRunModel));
    }
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable not set".to_string())?;
    let client = OpenRouterClient::new(api_key)?;
    Ok(Arc::new(
        OpenRouterSummaryModel::new(client, &cli.model)
            .with_retry(RetryConfig::with_retries(cli.retries)),
    ))
}

fn describe_plan(compactor: &Compactor, plan: &CompactionPlan) -> String {
    let part = plan.partition();
    let trigger = plan
        .triggered
        .map(|t| t.to_string())
        .unwrap_or_else(|| "none".to_string());
    match plan.skip {
        Some(reason) => format!(
            "{} messages, {} tokens, trigger: {trigger}; no compaction ({reason:?})",
            plan.messages.len(),
            plan.usage.tokens,
        ),
        None => format!(
            "{} messages, {} tokens, trigger: {trigger}; would summarize {} and keep {} \
             (keep: {}, cutoff {})",
            plan.messages.len(),
            plan.usage.tokens,
            part.to_summarize.len(),
            part.preserved.len(),
            compactor.config().keep,
            plan.cutoff,
        ),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level);
    tracing_subscriber::registry().with(layer).init();
}

async fn run(cli: &Cli) -> Result<String, Failure> {
    let conversation = load_conversation(&cli.conversation)?;
    let config = build_config(cli)?;
    let model = build_model(cli)?;
    let compactor = Compactor::new(config, model)?;

    if cli.dry_run {
        let plan = compactor.plan(&conversation);
        return Ok(format!("{}\n", describe_plan(&compactor, &plan)));
    }

    match compactor.before_model_async(&conversation).await {
        CompactionOutcome::NoOp => {
            eprintln!("No compaction needed.");
            Ok(String::new())
        }
        CompactionOutcome::Replace { messages, result } => {
            if cli.stats {
                eprintln!(
                    "  summarized: {} → {} tokens ({:.1}% of original, saved {})",
                    result.tokens_before,
                    result.tokens_after,
                    result.ratio * 100.0,
                    result.tokens_saved()
                );
                eprintln!("  messages: {} → {}", conversation.len(), messages.len());
            }
            let json = serde_json::to_string_pretty(&messages)
                .map_err(|e| format!("failed to serialize conversation: {e}"))?;
            Ok(format!("{json}\n"))
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(e.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_cli(args: &[&str]) -> Cli {
        let mut argv = vec!["condense", "conversation.json"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn config_from_flags() {
        let cli = make_cli(&[
            "--trigger",
            "fraction:0.8",
            "--trigger",
            "messages:40",
            "--keep",
            "tokens:2000",
            "--max-input-tokens",
            "1000",
            "--timeout-secs",
            "30",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(
            config.triggers,
            vec![ContextSize::Fraction(0.8), ContextSize::MessageCount(40)]
        );
        assert_eq!(config.keep, ContextSize::Tokens(2000));
        assert_eq!(config.max_input_tokens, Some(1000));
        assert_eq!(config.summary_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.trim_tokens, Some(8192));
    }

    #[test]
    fn bad_trigger_is_a_config_error() {
        let cli = make_cli(&["--trigger", "bytes:10"]);
        let failure = Failure::from(build_config(&cli).unwrap_err());
        assert_eq!(failure.exit_code(), 2);
        assert_eq!(Failure::Run("io".into()).exit_code(), 1);
    }

    #[test]
    fn loads_openai_style_conversation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"role": "system", "content": "sys"}},
                {{"role": "user", "content": "hi"}},
                {{"role": "assistant", "content": null, "tool_calls": [
                    {{"id": "c1", "type": "function", "function": {{"name": "ls", "arguments": "{{}}"}}}}
                ]}},
                {{"role": "tool", "tool_call_id": "c1", "content": "a.txt"}}
            ]"#
        )
        .unwrap();
        let messages = load_conversation(file.path()).unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].tool_calls()[0].id, "c1");
        assert_eq!(messages[3].answered_call_id(), Some("c1"));
    }

    #[test]
    fn missing_file_is_a_run_error() {
        let err = load_conversation(Path::new("/nonexistent/conversation.json")).unwrap_err();
        assert!(err.starts_with("failed to read"));
    }

    #[test]
    fn dry_run_describes_plan() {
        let cli = make_cli(&["--trigger", "messages:3", "--keep", "messages:1", "--dry-run"]);
        let compactor =
            Compactor::new(build_config(&cli).unwrap(), build_model(&cli).unwrap()).unwrap();
        let conversation = vec![
            Message::system("sys"),
            Message::user("a"),
            Message::assistant_text("b"),
            Message::user("c"),
        ];
        let description = describe_plan(&compactor, &compactor.plan(&conversation));
        assert!(description.contains("trigger: messages:3"));
        assert!(description.contains("would summarize 2 and keep 1"));
        assert!(description.contains("keep: messages:1"));
    }
}
