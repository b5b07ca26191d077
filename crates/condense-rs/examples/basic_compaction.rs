//! Minimal compaction example: a simulated agent loop with real summaries.
//!
//! Grows a conversation turn by turn and lets the compactor fold old turns
//! into an OpenRouter-generated summary once it passes 20 messages.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example basic_compaction
//! ```

use condense_rs::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), String> {
    // 1. Create the summarization model.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let client = OpenRouterClient::new(api_key)?;
    let model = Arc::new(OpenRouterSummaryModel::with_default_model(client));

    // 2. Configure when to compact and how much to keep.
    let config = CompactionConfig::default()
        .with_trigger(ContextSize::MessageCount(20))
        .with_keep(ContextSize::MessageCount(6))
        .with_summary_timeout(Duration::from_secs(60));
    let compactor = Compactor::new(config, model).map_err(|e| e.to_string())?;

    // 3. Run the loop. A real agent would call its model after the hook.
    let mut conversation = vec![Message::system(
        "You are a helpful coding assistant. Be concise.",
    )];
    for turn in 1..=8 {
        let call_id = format!("call_{turn}");
        conversation.push(Message::user(format!("Check module {turn} for unused imports.")));
        conversation.push(Message::assistant_tool_calls(vec![ToolCall::function(
            &call_id,
            "read_file",
            format!(r#"{{"path":"src/module_{turn}.rs"}}"#),
        )]));
        conversation.push(
            Message::tool_result(&call_id, format!("use std::fmt;\nuse std::io;\n// module {turn}"))
                .with_tool_name("read_file"),
        );
        conversation.push(Message::assistant_text(format!(
            "Module {turn}: `std::io` is unused."
        )));

        match compactor.before_model_async(&conversation).await {
            CompactionOutcome::NoOp => println!("turn {turn}: {} messages", conversation.len()),
            CompactionOutcome::Replace { messages, result } => {
                println!(
                    "turn {turn}: compacted {} → {} messages, saved {} tokens",
                    conversation.len(),
                    messages.len(),
                    result.tokens_saved()
                );
                conversation = messages;
            }
        }
    }

    println!("\n{}", conversation[1].text());
    Ok(())
}
