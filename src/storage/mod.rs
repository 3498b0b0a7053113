//! Conversation persistence
//!
//! The engine talks to storage through the [`ConversationStore`] trait.
//! Two backends ship with the crate: [`MemoryStore`] keeps everything in
//! process memory for tests and ephemeral sessions, and [`SledStore`]
//! persists to an embedded key-value database on disk.
//!
//! Both backends store tree layouts as serialized JSON, messages as
//! individual records keyed by id, and an append-order timeline per
//! conversation so the most recent message can be recovered after a
//! restart.

use crate::chat::ConversationTree;
use crate::error::Result;
use crate::message::{MessageDraft, MessageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod disk;
pub mod memory;

pub use disk::SledStore;
pub use memory::MemoryStore;

/// Metadata for a stored conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique identifier for the conversation
    pub id: String,
    /// Generated title, absent until the first completed turn
    pub title: Option<String>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation last changed
    pub updated_at: DateTime<Utc>,
}

/// Storage backend for conversations, trees, and messages.
///
/// Implementations allocate ids, stamp timestamps, and keep a per
/// conversation timeline of message ids in append order. The engine
/// never writes a message without recording it on the timeline, so
/// [`ConversationStore::latest_message_id`] always names the most
/// recently persisted message.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates a conversation seeded with its root message.
    ///
    /// Persists the conversation record, the root message, and a
    /// single-node tree, then returns the tree along with the stored
    /// root record.
    async fn create_conversation(
        &self,
        root: MessageDraft,
    ) -> Result<(ConversationTree, MessageRecord)>;

    /// Loads the tree layout for a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::ConversationNotFound`] when the
    /// conversation does not exist, and decoding errors when the stored
    /// layout is unreadable.
    ///
    /// [`TangentError::ConversationNotFound`]: crate::error::TangentError::ConversationNotFound
    async fn load_tree(&self, conversation_id: &str) -> Result<ConversationTree>;

    /// Persists the current tree layout, replacing the previous one.
    async fn save_tree(&self, tree: &ConversationTree) -> Result<()>;

    /// Returns the id of the most recently persisted message.
    async fn latest_message_id(&self, conversation_id: &str) -> Result<String>;

    /// Persists a message and appends it to the conversation timeline.
    ///
    /// The store allocates the id and creation timestamp; the returned
    /// record is the durable form of the draft.
    async fn save_message(
        &self,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageRecord>;

    /// Fetches message payloads by id, preserving the requested order.
    ///
    /// Ids with no stored payload are skipped rather than failing the
    /// whole batch; callers decide whether a gap is fatal.
    async fn fetch_messages(&self, ids: &[String]) -> Result<Vec<MessageRecord>>;

    /// Deletes stored messages and their timeline entries.
    ///
    /// Missing ids are ignored so deletion stays idempotent.
    async fn delete_messages(&self, conversation_id: &str, ids: &[String]) -> Result<()>;

    /// Sets the conversation title.
    async fn save_title(&self, conversation_id: &str, title: &str) -> Result<()>;

    /// Lists stored conversations, most recently updated first.
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>>;
}
