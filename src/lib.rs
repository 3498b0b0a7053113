//! Tangent - branching conversation engine for LLM chats
//!
//! This library keeps multi-turn chat history as a tree instead of a
//! flat transcript. Editing a message or retrying a reply starts a new
//! branch; nothing is overwritten, and any earlier fork stays
//! addressable. A cursor tracks the active branch, and only the
//! root-to-cursor path is ever sent to the model.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: Conversation tree, session cursor, message cache, turn
//!   orchestration, and streaming assembly
//! - `providers`: Chat model abstraction and the OpenRouter adapter
//! - `storage`: Persistence trait with in-memory and sled backends
//! - `context`: Shared handles that sessions are created from
//! - `config`: Configuration loading and validation
//! - `error`: Error types and result alias
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tangent::{ChatSession, EngineConfig, EngineContext, OpenRouterModel, SledStore};
//!
//! #[tokio::main]
//! async fn main() -> tangent::Result<()> {
//!     let config = EngineConfig::load("tangent.yaml")?;
//!     let model = OpenRouterModel::new(config.model.clone())?;
//!     let store = Arc::new(SledStore::open_default()?);
//!     let ctx = EngineContext::new(config, store, Arc::new(model))?;
//!     let _sweeper = ctx.start_sweeper();
//!
//!     let mut session = ChatSession::new(ctx);
//!     session.start("You are a concise assistant").await?;
//!     let reply = session.continue_turn("Name three uses for a tree").await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod providers;
pub mod storage;

// Re-export commonly used types
pub use chat::{
    CacheSweeper, ChatSession, ConversationTree, CursorState, MessageCache, SessionCursor,
    StreamingAssembler, StreamingUpdate,
};
pub use config::EngineConfig;
pub use context::EngineContext;
pub use error::{ModelFailure, Result, TangentError};
pub use message::{MessageDraft, MessageRecord, Provenance, Role, TokenUsage};
pub use providers::{ChatModel, ChunkStream, ModelReply, ModelTurn, OpenRouterModel};
pub use storage::{ConversationRecord, ConversationStore, MemoryStore, SledStore};
