//! Message roles, records, and drafts
//!
//! This module defines the payload types that flow between the tree,
//! the cache, storage, and model services. The tree itself only stores
//! node ids; these types carry the actual text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a message.
///
/// The engine only understands these three roles. Keeping the set closed
/// lets the compiler reject role typos that stringly-typed messages would
/// carry all the way to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation
    System,
    /// The human side of the exchange
    User,
    /// The model side of the exchange
    Assistant,
}

impl Role {
    /// Wire-format name of the role.
    ///
    /// # Examples
    ///
    /// ```
    /// use tangent::Role;
    ///
    /// assert_eq!(Role::User.as_str(), "user");
    /// assert_eq!(Role::Assistant.as_str(), "assistant");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage information from a completion
///
/// Tracks the number of tokens used in prompts and completions,
/// as reported by the model service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Arguments
    ///
    /// * `prompt_tokens` - Number of prompt tokens
    /// * `completion_tokens` - Number of completion tokens
    ///
    /// # Examples
    ///
    /// ```
    /// use tangent::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        let total_tokens = prompt_tokens + completion_tokens;
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// Where an assistant message came from.
///
/// Attached to assistant records so a conversation can later be audited
/// for which backend produced which branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Model identifier reported by the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token accounting, when the service reported it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// A message that has not been persisted yet.
///
/// The store assigns the id and timestamp when the draft is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// Optional provenance (model name, token usage)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl MessageDraft {
    /// Creates a new system draft
    ///
    /// # Examples
    ///
    /// ```
    /// use tangent::{MessageDraft, Role};
    ///
    /// let draft = MessageDraft::system("You are a helpful assistant");
    /// assert_eq!(draft.role, Role::System);
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            provenance: None,
        }
    }

    /// Creates a new user draft
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            provenance: None,
        }
    }

    /// Creates a new assistant draft with optional provenance
    pub fn assistant(content: impl Into<String>, provenance: Option<Provenance>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            provenance,
        }
    }
}

/// A persisted message.
///
/// The id doubles as the node id in the owning conversation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique message id (UUID v4)
    pub id: String,
    /// Id of the conversation this message belongs to
    pub conversation_id: String,
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// Optional provenance (model name, token usage)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    /// When the message was persisted
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Stamps a draft with a fresh id and the current time.
    ///
    /// Storage backends call this at save time so id allocation lives in
    /// one place.
    pub fn from_draft(conversation_id: impl Into<String>, draft: MessageDraft) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: draft.role,
            content: draft.content,
            provenance: draft.provenance,
            created_at: Utc::now(),
        }
    }
}
