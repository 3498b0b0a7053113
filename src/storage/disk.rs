//! Sled-backed storage backend
//!
//! Persists conversations to an embedded key-value database. Records
//! are serialized as JSON into four keyspaces: conversation metadata,
//! tree layouts, message payloads, and per-conversation timelines.
//! Every mutation flushes, so a process crash after a reported save
//! cannot lose the write.

use crate::chat::ConversationTree;
use crate::error::{Result, TangentError};
use crate::message::{MessageDraft, MessageRecord};
use crate::storage::{ConversationRecord, ConversationStore};
use async_trait::async_trait;
use chrono::Utc;
use directories::ProjectDirs;
use std::path::Path;
use uuid::Uuid;

/// Environment override for the database path.
const DB_PATH_ENV: &str = "TANGENT_DB";

const CONVERSATIONS_KEYSPACE: &str = "conversations";
const LAYOUTS_KEYSPACE: &str = "trees";
const MESSAGES_KEYSPACE: &str = "messages";
const TIMELINES_KEYSPACE: &str = "timeline";

/// Durable [`ConversationStore`] backed by a sled database.
pub struct SledStore {
    db: sled::Db,
    conversations: sled::Tree,
    layouts: sled::Tree,
    messages: sled::Tree,
    timelines: sled::Tree,
}

impl SledStore {
    /// Opens (or creates) a database at the given path.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tangent::SledStore;
    ///
    /// let store = SledStore::open("/tmp/tangent-test.db").unwrap();
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            TangentError::Storage(format!(
                "failed to open database at {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let conversations = open_keyspace(&db, CONVERSATIONS_KEYSPACE)?;
        let layouts = open_keyspace(&db, LAYOUTS_KEYSPACE)?;
        let messages = open_keyspace(&db, MESSAGES_KEYSPACE)?;
        let timelines = open_keyspace(&db, TIMELINES_KEYSPACE)?;
        Ok(Self {
            db,
            conversations,
            layouts,
            messages,
            timelines,
        })
    }

    /// Opens the database in the user's data directory.
    ///
    /// The `TANGENT_DB` environment variable overrides the location,
    /// which makes it easy to point a process at a test database or an
    /// alternate file without touching the user's application data dir.
    pub fn open_default() -> Result<Self> {
        if let Ok(override_path) = std::env::var(DB_PATH_ENV) {
            return Self::open(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "tangent", "tangent")
            .ok_or_else(|| TangentError::Storage("could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir).map_err(|e| {
            TangentError::Storage(format!("failed to create data directory: {}", e))
        })?;

        Self::open(data_dir.join("conversations.db"))
    }

    fn load_record(&self, conversation_id: &str) -> Result<ConversationRecord> {
        let bytes = self
            .conversations
            .get(conversation_id)
            .map_err(|e| TangentError::Storage(format!("failed to read conversation: {}", e)))?
            .ok_or_else(|| TangentError::ConversationNotFound(conversation_id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TangentError::Storage(format!("undecodable conversation record: {}", e))
        })
    }

    fn put_record(&self, record: &ConversationRecord) -> Result<()> {
        self.conversations
            .insert(record.id.as_str(), serde_json::to_vec(record)?)
            .map_err(|e| TangentError::Storage(format!("failed to write conversation: {}", e)))?;
        Ok(())
    }

    /// Bumps the conversation's `updated_at`, failing if it is unknown.
    fn touch(&self, conversation_id: &str) -> Result<()> {
        let mut record = self.load_record(conversation_id)?;
        record.updated_at = Utc::now();
        self.put_record(&record)
    }

    fn load_timeline(&self, conversation_id: &str) -> Result<Vec<String>> {
        let bytes = self
            .timelines
            .get(conversation_id)
            .map_err(|e| TangentError::Storage(format!("failed to read timeline: {}", e)))?
            .ok_or_else(|| TangentError::ConversationNotFound(conversation_id.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TangentError::Storage(format!("undecodable timeline: {}", e)))
    }

    fn put_timeline(&self, conversation_id: &str, timeline: &[String]) -> Result<()> {
        self.timelines
            .insert(conversation_id, serde_json::to_vec(timeline)?)
            .map_err(|e| TangentError::Storage(format!("failed to write timeline: {}", e)))?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| TangentError::Storage(format!("failed to flush database: {}", e)))?;
        Ok(())
    }
}

fn open_keyspace(db: &sled::Db, name: &str) -> Result<sled::Tree> {
    db.open_tree(name)
        .map_err(|e| TangentError::Storage(format!("failed to open {} keyspace: {}", name, e)))
}

#[async_trait]
impl ConversationStore for SledStore {
    async fn create_conversation(
        &self,
        root: MessageDraft,
    ) -> Result<(ConversationTree, MessageRecord)> {
        let conversation_id = Uuid::new_v4().to_string();
        let record = MessageRecord::from_draft(&conversation_id, root);
        let tree = ConversationTree::new(&conversation_id, &record.id);

        let now = Utc::now();
        self.put_record(&ConversationRecord {
            id: conversation_id.clone(),
            title: None,
            created_at: now,
            updated_at: now,
        })?;
        self.layouts
            .insert(conversation_id.as_str(), tree.to_bytes()?)
            .map_err(|e| TangentError::Storage(format!("failed to write tree layout: {}", e)))?;
        self.messages
            .insert(record.id.as_str(), serde_json::to_vec(&record)?)
            .map_err(|e| TangentError::Storage(format!("failed to write message: {}", e)))?;
        self.put_timeline(&conversation_id, &[record.id.clone()])?;
        self.flush().await?;

        Ok((tree, record))
    }

    async fn load_tree(&self, conversation_id: &str) -> Result<ConversationTree> {
        let bytes = self
            .layouts
            .get(conversation_id)
            .map_err(|e| TangentError::Storage(format!("failed to read tree layout: {}", e)))?
            .ok_or_else(|| TangentError::ConversationNotFound(conversation_id.to_string()))?;
        ConversationTree::from_bytes(conversation_id, &bytes)?.ok_or_else(|| {
            TangentError::Integrity(format!(
                "conversation {} has no stored tree layout",
                conversation_id
            ))
        })
    }

    async fn save_tree(&self, tree: &ConversationTree) -> Result<()> {
        self.touch(tree.conversation_id())?;
        self.layouts
            .insert(tree.conversation_id(), tree.to_bytes()?)
            .map_err(|e| TangentError::Storage(format!("failed to write tree layout: {}", e)))?;
        self.flush().await
    }

    async fn latest_message_id(&self, conversation_id: &str) -> Result<String> {
        let timeline = self.load_timeline(conversation_id)?;
        timeline.last().cloned().ok_or_else(|| {
            TangentError::Integrity(format!(
                "conversation {} has an empty timeline",
                conversation_id
            ))
        })
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageRecord> {
        // Loading the timeline doubles as the existence check.
        let mut timeline = self.load_timeline(conversation_id)?;
        let record = MessageRecord::from_draft(conversation_id, draft);
        timeline.push(record.id.clone());

        self.messages
            .insert(record.id.as_str(), serde_json::to_vec(&record)?)
            .map_err(|e| TangentError::Storage(format!("failed to write message: {}", e)))?;
        self.put_timeline(conversation_id, &timeline)?;
        self.flush().await?;

        Ok(record)
    }

    async fn fetch_messages(&self, ids: &[String]) -> Result<Vec<MessageRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let found = self
                .messages
                .get(id)
                .map_err(|e| TangentError::Storage(format!("failed to read message: {}", e)))?;
            if let Some(bytes) = found {
                let record: MessageRecord = serde_json::from_slice(&bytes).map_err(|e| {
                    TangentError::Storage(format!("undecodable message record: {}", e))
                })?;
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn delete_messages(&self, conversation_id: &str, ids: &[String]) -> Result<()> {
        for id in ids {
            self.messages
                .remove(id.as_str())
                .map_err(|e| TangentError::Storage(format!("failed to delete message: {}", e)))?;
        }
        match self.load_timeline(conversation_id) {
            Ok(mut timeline) => {
                timeline.retain(|id| !ids.contains(id));
                self.put_timeline(conversation_id, &timeline)?;
                self.touch(conversation_id)?;
            }
            // Unknown conversations keep deletion idempotent.
            Err(TangentError::ConversationNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.flush().await
    }

    async fn save_title(&self, conversation_id: &str, title: &str) -> Result<()> {
        let mut record = self.load_record(conversation_id)?;
        record.title = Some(title.to_string());
        record.updated_at = Utc::now();
        self.put_record(&record)?;
        self.flush().await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let mut records: Vec<ConversationRecord> = Vec::new();
        for entry in self.conversations.iter() {
            let (_, bytes) = entry
                .map_err(|e| TangentError::Storage(format!("failed to scan conversations: {}", e)))?;
            records.push(serde_json::from_slice(&bytes).map_err(|e| {
                TangentError::Storage(format!("undecodable conversation record: {}", e))
            })?);
        }
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}
