//! Plugging in a custom summarization model and observer.
//!
//! The model here is an offline stand-in that lists the user requests it was
//! shown; swap in any client that turns a prompt into text. The observer
//! tallies tokens saved across compactions.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example custom_model
//! ```

use condense_rs::api::model::ModelFuture;
use condense_rs::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Summarizes by echoing the user requests found in the rendered history.
struct RequestLister;

impl SummaryModel for RequestLister {
    fn complete_async<'a>(&'a self, prompt: &'a str) -> ModelFuture<'a> {
        let requests: Vec<&str> = prompt
            .lines()
            .filter_map(|line| line.split_once("] User: ").map(|(_, text)| text))
            .collect();
        Box::pin(async move {
            Ok(format!(
                "1. Primary Request and Intent:\n- {}",
                requests.join("\n- ")
            ))
        })
    }

    fn profile(&self) -> ModelProfile {
        ModelProfile {
            max_input_tokens: Some(400),
            max_output_tokens: Some(100),
        }
    }
}

fn main() -> Result<(), String> {
    let saved = Arc::new(AtomicUsize::new(0));
    let tally = saved.clone();

    // Fractions resolve against the model's profile: (400 - 100) × 0.5 = 150 tokens.
    let config = CompactionConfig::default()
        .with_trigger(ContextSize::Fraction(0.5))
        .with_keep(ContextSize::Tokens(60));
    let compactor = Compactor::new(config, Arc::new(RequestLister))
        .map_err(|e| e.to_string())?
        .with_observer(FnObserver::new(move |event: &CompactionEvent<'_>| {
            if let CompactionEvent::Compacted { result, .. } = event {
                tally.fetch_add(result.tokens_saved(), Ordering::Relaxed);
            }
        }));

    let mut conversation = vec![Message::system("You answer questions about Rust.")];
    for question in [
        "What does the borrow checker enforce?",
        "When should I reach for Rc instead of Arc?",
        "How do I share a HashMap between tokio tasks?",
        "Why does my trait object need Send + Sync?",
        "What is the difference between impl Trait and dyn Trait?",
        "How do lifetimes in struct fields work?",
    ] {
        conversation.push(Message::user(question));
        conversation.push(Message::assistant_text(
            "A fairly long answer that walks through the rules, shows a short example, \
             and points at the relevant chapter of the book.",
        ));
        if let CompactionOutcome::Replace { messages, .. } = compactor.before_model(&conversation) {
            conversation = messages;
        }
    }

    for msg in &conversation {
        println!("{:>9}: {}", msg.role().to_string(), msg.text());
    }
    println!("\ntokens saved: {}", saved.load(Ordering::Relaxed));
    Ok(())
}
