//! Model service port and common types
//!
//! This module defines the [`ChatModel`] trait that all model service
//! adapters implement, along with the turn and reply types exchanged
//! with the orchestrator. Turns are flat `{role, text}` pairs: the
//! branching structure never crosses this boundary, only the path that
//! was selected for the request.

use crate::error::Result;
use crate::message::{Role, TokenUsage};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// One turn of conversation history sent to a model service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTurn {
    /// Speaker of this turn
    pub role: Role,
    /// Text of this turn
    pub text: String,
}

impl ModelTurn {
    /// Creates a turn.
    ///
    /// # Examples
    ///
    /// ```
    /// use tangent::{ModelTurn, Role};
    ///
    /// let turn = ModelTurn::new(Role::User, "hello");
    /// assert_eq!(turn.role, Role::User);
    /// ```
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Creates a system turn.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Creates a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Creates an assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// A completed model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    /// Reply text; may be empty, the orchestrator decides what that means
    pub text: String,
    /// Model identifier the service reported, when it did
    pub model: Option<String>,
    /// Token accounting, when the service reported it
    pub usage: Option<TokenUsage>,
}

/// Stream of partial reply text.
///
/// Items are text deltas in arrival order; empty deltas are legal and
/// skipped downstream. An `Err` item ends the stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Interface to a chat model service.
///
/// Implementations are shared process-wide behind an `Arc` and must be
/// safe to call from many sessions at once.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Requests a complete reply for the given history.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::ModelService`](crate::TangentError::ModelService)
    /// classified by [`ModelFailure`](crate::ModelFailure); adapters must
    /// keep timeouts distinguishable from malformed payloads.
    async fn complete(&self, turns: &[ModelTurn]) -> Result<ModelReply>;

    /// Requests a streamed reply for the given history.
    ///
    /// The returned stream yields text deltas; dropping it cancels the
    /// request.
    async fn complete_stream(&self, turns: &[ModelTurn]) -> Result<ChunkStream>;
}
