//! In-memory storage backend
//!
//! Keeps conversations in process memory behind an `RwLock`. Tree
//! layouts go through the same serialized form the disk backend uses,
//! so codec regressions show up in fast tests instead of on disk.

use crate::chat::ConversationTree;
use crate::error::{Result, TangentError};
use crate::message::{MessageDraft, MessageRecord};
use crate::storage::{ConversationRecord, ConversationStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryInner {
    conversations: HashMap<String, ConversationRecord>,
    /// Tree layouts in serialized form, keyed by conversation id.
    trees: HashMap<String, Vec<u8>>,
    messages: HashMap<String, MessageRecord>,
    /// Message ids per conversation, in append order.
    timelines: HashMap<String, Vec<String>>,
}

/// Volatile [`ConversationStore`] used by tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_inner(&self) -> Result<RwLockReadGuard<'_, MemoryInner>> {
        self.inner
            .read()
            .map_err(|_| TangentError::Storage("conversation store lock poisoned".to_string()))
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, MemoryInner>> {
        self.inner
            .write()
            .map_err(|_| TangentError::Storage("conversation store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(
        &self,
        root: MessageDraft,
    ) -> Result<(ConversationTree, MessageRecord)> {
        let conversation_id = Uuid::new_v4().to_string();
        let record = MessageRecord::from_draft(&conversation_id, root);
        let tree = ConversationTree::new(&conversation_id, &record.id);
        let tree_bytes = tree.to_bytes()?;

        let now = Utc::now();
        let mut inner = self.write_inner()?;
        inner.conversations.insert(
            conversation_id.clone(),
            ConversationRecord {
                id: conversation_id.clone(),
                title: None,
                created_at: now,
                updated_at: now,
            },
        );
        inner.trees.insert(conversation_id.clone(), tree_bytes);
        inner
            .timelines
            .insert(conversation_id.clone(), vec![record.id.clone()]);
        inner.messages.insert(record.id.clone(), record.clone());

        Ok((tree, record))
    }

    async fn load_tree(&self, conversation_id: &str) -> Result<ConversationTree> {
        let inner = self.read_inner()?;
        let bytes = inner
            .trees
            .get(conversation_id)
            .ok_or_else(|| TangentError::ConversationNotFound(conversation_id.to_string()))?;
        ConversationTree::from_bytes(conversation_id, bytes)?.ok_or_else(|| {
            TangentError::Integrity(format!(
                "conversation {} has no stored tree layout",
                conversation_id
            ))
        })
    }

    async fn save_tree(&self, tree: &ConversationTree) -> Result<()> {
        let bytes = tree.to_bytes()?;
        let mut inner = self.write_inner()?;
        let conversation_id = tree.conversation_id();
        let record = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| TangentError::ConversationNotFound(conversation_id.to_string()))?;
        record.updated_at = Utc::now();
        inner.trees.insert(conversation_id.to_string(), bytes);
        Ok(())
    }

    async fn latest_message_id(&self, conversation_id: &str) -> Result<String> {
        let inner = self.read_inner()?;
        let timeline = inner
            .timelines
            .get(conversation_id)
            .ok_or_else(|| TangentError::ConversationNotFound(conversation_id.to_string()))?;
        timeline.last().cloned().ok_or_else(|| {
            TangentError::Integrity(format!("conversation {} has an empty timeline", conversation_id))
        })
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageRecord> {
        let mut inner = self.write_inner()?;
        if !inner.conversations.contains_key(conversation_id) {
            return Err(TangentError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }
        let record = MessageRecord::from_draft(conversation_id, draft);
        inner
            .timelines
            .entry(conversation_id.to_string())
            .or_default()
            .push(record.id.clone());
        inner.messages.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn fetch_messages(&self, ids: &[String]) -> Result<Vec<MessageRecord>> {
        let inner = self.read_inner()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .collect())
    }

    async fn delete_messages(&self, conversation_id: &str, ids: &[String]) -> Result<()> {
        let mut inner = self.write_inner()?;
        for id in ids {
            inner.messages.remove(id);
        }
        if let Some(timeline) = inner.timelines.get_mut(conversation_id) {
            timeline.retain(|id| !ids.contains(id));
        }
        if let Some(record) = inner.conversations.get_mut(conversation_id) {
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn save_title(&self, conversation_id: &str, title: &str) -> Result<()> {
        let mut inner = self.write_inner()?;
        let record = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| TangentError::ConversationNotFound(conversation_id.to_string()))?;
        record.title = Some(title.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let inner = self.read_inner()?;
        let mut records: Vec<ConversationRecord> = inner.conversations.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}
