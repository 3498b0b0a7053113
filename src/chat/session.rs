//! Chat session orchestration
//!
//! [`ChatSession`] drives one conversation end to end: it owns a cursor
//! over the tree and coordinates storage, the message cache, and the
//! model service. Side effects happen in a fixed order, and the user
//! message is persisted before the model is invoked. A failed model
//! call is never rolled back, so the user's text survives as a branch
//! point that [`ChatSession::retry`] can pick up later.

use crate::chat::cursor::{CursorState, SessionCursor};
use crate::chat::streaming::{StreamingAssembler, StreamingUpdate};
use crate::chat::title;
use crate::context::EngineContext;
use crate::error::{ModelFailure, Result, TangentError};
use crate::message::{MessageDraft, MessageRecord, Provenance, Role, TokenUsage};
use crate::providers::{ModelReply, ModelTurn};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A single conversation in progress.
///
/// Sessions are cheap: they hold a clone of the shared
/// [`EngineContext`] and a cursor. Create one per conversation and per
/// consumer; concurrent sessions over the same context share the cache
/// and storage safely.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tangent::{ChatSession, EngineConfig, EngineContext, MemoryStore, OpenRouterModel};
///
/// # async fn example() -> tangent::Result<()> {
/// let config = EngineConfig::default();
/// let model = OpenRouterModel::new(config.model.clone())?;
/// let ctx = EngineContext::new(config, Arc::new(MemoryStore::new()), Arc::new(model))?;
///
/// let mut session = ChatSession::new(ctx);
/// session.start("You are a concise assistant").await?;
/// let reply = session.continue_turn("What is a red-black tree?").await?;
/// println!("{}", reply.content);
/// # Ok(())
/// # }
/// ```
pub struct ChatSession {
    ctx: EngineContext,
    cursor: SessionCursor,
}

impl ChatSession {
    /// Creates a session with no conversation loaded.
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            cursor: SessionCursor::new(),
        }
    }

    /// Current cursor state.
    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }

    /// Id of the loaded conversation, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        self.cursor.tree().ok().map(|tree| tree.conversation_id())
    }

    /// Id of the node the cursor points at, if positioned.
    pub fn current_id(&self) -> Option<&str> {
        self.cursor.current_id()
    }

    /// Node ids from the root to the current position.
    ///
    /// Empty when the session has no position yet.
    pub fn current_path(&self) -> Vec<String> {
        self.cursor.current_path()
    }

    /// Starts a new conversation rooted at a system message.
    ///
    /// The root text may be empty; the root node exists either way so
    /// every later message has a parent. Leaves the cursor positioned on
    /// the root.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::InvalidState`] when the session already
    /// has a conversation loaded.
    pub async fn start(&mut self, system_text: impl Into<String>) -> Result<MessageRecord> {
        if self.cursor.state() != CursorState::Empty {
            return Err(TangentError::InvalidState(
                "session already has a conversation loaded".to_string(),
            ));
        }

        let (tree, root) = self
            .ctx
            .store()
            .create_conversation(MessageDraft::system(system_text))
            .await?;
        info!("started conversation {}", tree.conversation_id());

        self.ctx.cache().set(root.clone());
        self.cursor.load(tree);
        self.cursor.position_at(&root.id)?;
        Ok(root)
    }

    /// Resumes a stored conversation at its most recent message.
    ///
    /// Only the tree layout is loaded eagerly; message payloads are
    /// pulled in on demand when a turn assembles its history.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::InvalidState`] when a conversation is
    /// already loaded, [`TangentError::ConversationNotFound`] when the
    /// id is unknown, and [`TangentError::NodeNotFound`] when the stored
    /// latest message is missing from the tree.
    pub async fn resume(&mut self, conversation_id: &str) -> Result<()> {
        if self.cursor.state() != CursorState::Empty {
            return Err(TangentError::InvalidState(
                "session already has a conversation loaded".to_string(),
            ));
        }

        let tree = self.ctx.store().load_tree(conversation_id).await?;
        let latest = self.ctx.store().latest_message_id(conversation_id).await?;
        self.cursor.load(tree);
        self.cursor.resolve_latest(&latest)?;
        info!(
            "resumed conversation {} at message {}",
            conversation_id, latest
        );
        Ok(())
    }

    /// Moves the cursor to an existing node.
    ///
    /// Selection is the branch-switch primitive: position the cursor on
    /// any node and the next turn extends the conversation from there.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::NodeNotFound`] for ids outside the tree.
    pub fn select(&mut self, node_id: &str) -> Result<()> {
        self.cursor.position_at(node_id)
    }

    /// Runs one user turn: persists the user message, invokes the
    /// model, and persists the reply as a child of the user node.
    ///
    /// On model failure the user node stays in the tree and the cursor
    /// stays on it, so the turn can be retried without retyping.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::Validation`] for blank input,
    /// [`TangentError::InvalidState`] when the cursor has no position,
    /// and [`TangentError::ModelService`] when the model call fails or
    /// produces an empty reply.
    pub async fn continue_turn(&mut self, user_text: impl Into<String>) -> Result<MessageRecord> {
        let (conversation_id, turns) = self.push_user_turn(user_text.into()).await?;

        let reply = self.invoke_model(&turns).await?;
        let record = self
            .push_assistant_reply(&conversation_id, reply.text, reply.model, reply.usage)
            .await?;

        self.maybe_generate_title(&conversation_id, &turns).await;
        Ok(record)
    }

    /// Streaming variant of [`ChatSession::continue_turn`].
    ///
    /// Forwards a cumulative snapshot through `updates` for every
    /// non-empty delta. Snapshots carry a provisional id that is
    /// discarded when the reply is persisted; the returned record holds
    /// the durable id. If the receiver goes away the stream is dropped
    /// and the turn fails with [`ModelFailure::Cancelled`], leaving the
    /// user node in place and nothing of the reply persisted.
    pub async fn continue_turn_streaming(
        &mut self,
        user_text: impl Into<String>,
        updates: mpsc::Sender<StreamingUpdate>,
    ) -> Result<MessageRecord> {
        let (conversation_id, turns) = self.push_user_turn(user_text.into()).await?;
        let chunk_deadline = self.ctx.config().model.request_timeout();

        let mut stream = tokio::time::timeout(
            chunk_deadline,
            self.ctx.model().complete_stream(&turns),
        )
        .await
        .map_err(|_| stall_error(chunk_deadline))??;

        let mut assembler = StreamingAssembler::new();
        loop {
            let chunk = match tokio::time::timeout(chunk_deadline, stream.next()).await {
                Err(_) => return Err(stall_error(chunk_deadline)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(chunk))) => chunk,
            };
            if let Some(update) = assembler.on_chunk(&chunk)? {
                if updates.send(update).await.is_err() {
                    debug!("update receiver dropped, cancelling stream");
                    return Err(TangentError::model(
                        ModelFailure::Cancelled,
                        "consumer dropped the update channel",
                    ));
                }
            }
        }

        let text = assembler.finalize()?;
        let record = self
            .push_assistant_reply(&conversation_id, text, None, None)
            .await?;

        self.maybe_generate_title(&conversation_id, &turns).await;
        Ok(record)
    }

    /// Requests a fresh reply for an already-persisted user message.
    ///
    /// The new reply becomes another child of the user node; earlier
    /// replies stay in the tree as siblings. The cursor ends on the new
    /// reply.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::NodeNotFound`] for unknown ids,
    /// [`TangentError::Validation`] when the node is not a user message,
    /// and [`TangentError::Integrity`] when the tree references a
    /// payload that storage no longer has.
    pub async fn retry(&mut self, node_id: &str) -> Result<MessageRecord> {
        self.cursor.position_at(node_id)?;
        let record = self.fetch_message(node_id).await?;
        if record.role != Role::User {
            return Err(TangentError::Validation(format!(
                "retry requires a user message, {} is {}",
                node_id, record.role
            )));
        }
        let conversation_id = self.cursor.tree()?.conversation_id().to_string();

        let turns = self.assemble_history().await?;
        let reply = self.invoke_model(&turns).await?;
        self.push_assistant_reply(&conversation_id, reply.text, reply.model, reply.usage)
            .await
    }

    /// Deletes a node and all of its descendants.
    ///
    /// Removes the subtree from the tree, deletes the message payloads
    /// from storage, and drops them from the cache. If the cursor was
    /// inside the removed subtree it moves to the removed node's parent.
    /// Returns the number of deleted nodes.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::Validation`] when targeting the root and
    /// [`TangentError::NodeNotFound`] for unknown ids.
    pub async fn delete_subtree(&mut self, node_id: &str) -> Result<usize> {
        let removed = self.cursor.remove_subtree(node_id)?;
        let conversation_id = self.cursor.tree()?.conversation_id().to_string();

        self.ctx
            .store()
            .delete_messages(&conversation_id, &removed)
            .await?;
        self.ctx.store().save_tree(self.cursor.tree()?).await?;
        for id in &removed {
            self.ctx.cache().remove(id);
        }
        debug!(
            "deleted {} message(s) from conversation {}",
            removed.len(),
            conversation_id
        );
        Ok(removed.len())
    }

    /// Validates and persists the user half of a turn, then assembles
    /// the prompt history ending in it.
    async fn push_user_turn(&mut self, user_text: String) -> Result<(String, Vec<ModelTurn>)> {
        if user_text.trim().is_empty() {
            return Err(TangentError::Validation(
                "user text must not be empty".to_string(),
            ));
        }
        if self.cursor.state() != CursorState::Positioned {
            return Err(TangentError::InvalidState(
                "session has no active position in a conversation".to_string(),
            ));
        }
        let conversation_id = self.cursor.tree()?.conversation_id().to_string();

        let record = self
            .ctx
            .store()
            .save_message(&conversation_id, MessageDraft::user(user_text))
            .await?;
        self.ctx.cache().set(record.clone());
        self.cursor.append(record.id.clone())?;
        self.ctx.store().save_tree(self.cursor.tree()?).await?;

        let turns = self.assemble_history().await?;
        Ok((conversation_id, turns))
    }

    /// Persists an assistant reply under the current node and moves the
    /// cursor onto it.
    async fn push_assistant_reply(
        &mut self,
        conversation_id: &str,
        text: String,
        model: Option<String>,
        usage: Option<TokenUsage>,
    ) -> Result<MessageRecord> {
        let provenance = Provenance {
            model: model.or_else(|| Some(self.ctx.config().model.model.clone())),
            usage,
        };
        let record = self
            .ctx
            .store()
            .save_message(conversation_id, MessageDraft::assistant(text, Some(provenance)))
            .await?;
        self.ctx.cache().set(record.clone());
        self.cursor.append(record.id.clone())?;
        self.ctx.store().save_tree(self.cursor.tree()?).await?;
        Ok(record)
    }

    /// Builds the model prompt from the root-to-cursor path.
    ///
    /// Payloads come from the cache where possible; the rest are fetched
    /// from storage in one batch and cached for next time. Path entries
    /// whose payload is gone are skipped with a warning rather than
    /// failing the turn.
    async fn assemble_history(&self) -> Result<Vec<ModelTurn>> {
        let path = self.cursor.current_path();
        let cached: Vec<Option<MessageRecord>> =
            path.iter().map(|id| self.ctx.cache().get(id)).collect();

        let missing: Vec<String> = path
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(id, _)| id.clone())
            .collect();

        let mut fetched: HashMap<String, MessageRecord> = HashMap::new();
        if !missing.is_empty() {
            debug!("warming {} message(s) from storage", missing.len());
            for record in self.ctx.store().fetch_messages(&missing).await? {
                self.ctx.cache().set(record.clone());
                fetched.insert(record.id.clone(), record);
            }
        }

        let mut turns = Vec::with_capacity(path.len());
        for (id, hit) in path.iter().zip(cached) {
            match hit.or_else(|| fetched.remove(id)) {
                Some(record) => turns.push(ModelTurn::new(record.role, record.content)),
                None => warn!("message {} missing from storage, skipping", id),
            }
        }
        Ok(turns)
    }

    /// Fetches one payload, cache first, then storage.
    async fn fetch_message(&self, id: &str) -> Result<MessageRecord> {
        if let Some(record) = self.ctx.cache().get(id) {
            return Ok(record);
        }
        let fetched = self
            .ctx
            .store()
            .fetch_messages(&[id.to_string()])
            .await?;
        match fetched.into_iter().next() {
            Some(record) => {
                self.ctx.cache().set(record.clone());
                Ok(record)
            }
            None => Err(TangentError::Integrity(format!(
                "message {} is in the tree but missing from storage",
                id
            ))),
        }
    }

    /// Invokes the model with a deadline and rejects empty replies.
    async fn invoke_model(&self, turns: &[ModelTurn]) -> Result<ModelReply> {
        let deadline = self.ctx.config().model.request_timeout();
        let reply = tokio::time::timeout(deadline, self.ctx.model().complete(turns))
            .await
            .map_err(|_| {
                TangentError::model(
                    ModelFailure::Timeout,
                    format!("model call exceeded {}s deadline", deadline.as_secs()),
                )
            })??;

        if reply.text.trim().is_empty() {
            return Err(TangentError::model(
                ModelFailure::EmptyResponse,
                "model returned an empty reply",
            ));
        }
        Ok(reply)
    }

    /// Titles the conversation after its first completed turn.
    ///
    /// Runs only when the prompt history carries no assistant turn yet.
    /// Failures are logged and fall back to the user's text; a turn
    /// never fails because of its title.
    async fn maybe_generate_title(&self, conversation_id: &str, turns: &[ModelTurn]) {
        let config = &self.ctx.config().title;
        if !config.enabled {
            return;
        }
        if turns.iter().any(|turn| turn.role == Role::Assistant) {
            return;
        }

        let request = title::build_request(turns);
        let generated =
            match tokio::time::timeout(config.timeout(), self.ctx.model().complete(&request)).await
            {
                Ok(Ok(reply)) => title::sanitize(&reply.text),
                Ok(Err(e)) => {
                    warn!("title generation failed: {}", e);
                    None
                }
                Err(_) => {
                    warn!("title generation timed out");
                    None
                }
            };

        if let Some(text) = generated.or_else(|| title::fallback(turns)) {
            match self.ctx.store().save_title(conversation_id, &text).await {
                Ok(()) => debug!("conversation {} titled {:?}", conversation_id, text),
                Err(e) => warn!("failed to save conversation title: {}", e),
            }
        }
    }
}

fn stall_error(deadline: std::time::Duration) -> TangentError {
    TangentError::model(
        ModelFailure::Timeout,
        format!("stream stalled for {}s without a chunk", deadline.as_secs()),
    )
}
