//! Model service adapters
//!
//! This module contains the chat-model abstraction and the OpenRouter
//! implementation. The engine only ever talks to [`ChatModel`], so
//! alternative backends slot in without touching session code.

pub mod base;
pub mod openrouter;

pub use base::{ChatModel, ChunkStream, ModelReply, ModelTurn};
pub use openrouter::OpenRouterModel;
