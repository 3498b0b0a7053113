//! Branching Chat Example
//!
//! This example demonstrates the session API end to end:
//! 1. Start a conversation against OpenRouter
//! 2. Run a plain turn and a streaming turn
//! 3. Rewind the cursor and branch from an earlier reply
//! 4. Retry a user message to collect an alternative reply
//!
//! # Running
//!
//! Set the required environment variable:
//! ```bash
//! export OPENROUTER_API_KEY="sk-or-..."
//! ```
//!
//! Then run with:
//! ```bash
//! cargo run --example branching_chat
//! ```

use std::sync::Arc;
use tangent::{ChatSession, EngineConfig, EngineContext, MemoryStore, OpenRouterModel, StreamingUpdate};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tangent=debug".parse().unwrap()),
        )
        .init();

    let config = EngineConfig::default();
    let model = match OpenRouterModel::new(config.model.clone()) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Failed to create model adapter: {}", e);
            eprintln!("Please set the required environment variable:");
            eprintln!("  OPENROUTER_API_KEY");
            return Err(e.into());
        }
    };
    let ctx = EngineContext::new(config, Arc::new(MemoryStore::new()), Arc::new(model))?;
    let _sweeper = ctx.start_sweeper();

    let mut session = ChatSession::new(ctx);
    session
        .start("You are a terse assistant. One sentence per answer.")
        .await?;
    println!(
        "conversation: {}",
        session.conversation_id().unwrap_or("?")
    );

    // Plain turn
    let reply = session
        .continue_turn("Suggest a weekend city trip in Europe")
        .await?;
    println!("assistant: {}", reply.content);

    // Streaming turn: print each cumulative snapshot as it lands
    let (tx, mut rx) = mpsc::channel::<StreamingUpdate>(32);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            println!("  [stream] {}", update.content);
        }
    });
    let streamed = session
        .continue_turn_streaming("What should I pack?", tx)
        .await?;
    printer.await?;
    println!("assistant: {}", streamed.content);

    // Branch: go back to the first reply and take the conversation
    // somewhere else. The packing branch stays in the tree.
    let first_reply_id = session.current_path()[2].clone();
    session.select(&first_reply_id)?;
    let branched = session
        .continue_turn("How do I get there by train?")
        .await?;
    println!("assistant (branch): {}", branched.content);

    // Retry: ask for a second opinion on the same question. The first
    // answer stays addressable as a sibling.
    let branched_user_id = session.current_path()[3].clone();
    let alternative = session.retry(&branched_user_id).await?;
    println!("assistant (retry): {}", alternative.content);

    println!("active path now holds {} messages", session.current_path().len());
    Ok(())
}
