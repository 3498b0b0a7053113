//! Shared engine state
//!
//! [`EngineContext`] bundles configuration, storage, the model service,
//! and the message cache behind `Arc`s. Sessions clone the context, so
//! any number of them can run concurrently against the same backends.

use crate::chat::{CacheSweeper, MessageCache};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::providers::ChatModel;
use crate::storage::ConversationStore;
use std::sync::Arc;

/// Shared handles for everything a chat session needs.
#[derive(Clone)]
pub struct EngineContext {
    config: Arc<EngineConfig>,
    store: Arc<dyn ConversationStore>,
    model: Arc<dyn ChatModel>,
    cache: Arc<MessageCache>,
}

impl EngineContext {
    /// Creates a context from configuration and backends.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration fails validation.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ConversationStore>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = MessageCache::from_config(&config.cache)?;
        Ok(Self {
            config: Arc::new(config),
            store,
            model,
            cache: Arc::new(cache),
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Storage backend.
    pub fn store(&self) -> &dyn ConversationStore {
        self.store.as_ref()
    }

    /// Model service.
    pub fn model(&self) -> &dyn ChatModel {
        self.model.as_ref()
    }

    /// Message payload cache shared by all sessions on this context.
    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// Starts the background expiry sweeper for this context's cache.
    ///
    /// The returned handle stops the sweeper when dropped; long-lived
    /// embedders typically hold it for the life of the process.
    pub fn start_sweeper(&self) -> CacheSweeper {
        CacheSweeper::spawn(Arc::clone(&self.cache), self.config.cache.sweep_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::error::TangentError;
    use crate::message::Role;
    use crate::providers::{ChunkStream, ModelReply, ModelTurn};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    struct EchoModel;

    #[async_trait]
    impl crate::providers::ChatModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, turns: &[ModelTurn]) -> Result<ModelReply> {
            let text = turns
                .iter()
                .rev()
                .find(|t| t.role == Role::User)
                .map(|t| t.text.clone())
                .unwrap_or_default();
            Ok(ModelReply {
                text,
                model: None,
                usage: None,
            })
        }

        async fn complete_stream(&self, _turns: &[ModelTurn]) -> Result<ChunkStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    #[test]
    fn test_context_rejects_invalid_config() {
        let config = EngineConfig {
            cache: CacheConfig {
                capacity: 0,
                ..CacheConfig::default()
            },
            ..EngineConfig::default()
        };
        // EngineContext is not Debug, so unwrap_err cannot be used here.
        let err = EngineContext::new(config, Arc::new(MemoryStore::new()), Arc::new(EchoModel))
            .err()
            .unwrap();
        assert!(matches!(err, TangentError::Config(_)));
    }

    #[test]
    fn test_context_clones_share_cache() {
        let ctx = EngineContext::new(
            EngineConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(EchoModel),
        )
        .unwrap();
        let clone = ctx.clone();

        let record = crate::message::MessageRecord::from_draft(
            "c-1",
            crate::message::MessageDraft::user("hello"),
        );
        ctx.cache().set(record.clone());
        assert_eq!(clone.cache().get(&record.id).unwrap().content, "hello");
    }
}
