use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tangent::config::TitleConfig;
use tangent::{
    ChatModel, ChunkStream, EngineConfig, EngineContext, MemoryStore, ModelFailure, ModelReply,
    ModelTurn, Result, TangentError,
};

/// One scripted model response.
#[allow(dead_code)]
pub enum Scripted {
    Text(String),
    Chunks(Vec<String>),
    Empty,
    Fail(ModelFailure),
}

#[allow(dead_code)]
impl Scripted {
    pub fn text(reply: &str) -> Self {
        Scripted::Text(reply.to_string())
    }

    pub fn chunks(parts: &[&str]) -> Self {
        Scripted::Chunks(parts.iter().map(|p| p.to_string()).collect())
    }
}

/// Model double that plays back scripted replies in order and records
/// every prompt it receives.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<Vec<ModelTurn>>>,
}

#[allow(dead_code)]
impl ScriptedModel {
    pub fn new(replies: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<Vec<ModelTurn>> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn push_reply(&self, reply: Scripted) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next_reply(&self, turns: &[ModelTurn]) -> Scripted {
        self.prompts.lock().unwrap().push(turns.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted reply available")
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, turns: &[ModelTurn]) -> Result<ModelReply> {
        match self.next_reply(turns) {
            Scripted::Text(text) => Ok(ModelReply {
                text,
                model: Some("scripted/v1".to_string()),
                usage: None,
            }),
            Scripted::Chunks(chunks) => Ok(ModelReply {
                text: chunks.concat(),
                model: Some("scripted/v1".to_string()),
                usage: None,
            }),
            Scripted::Empty => Ok(ModelReply {
                text: String::new(),
                model: None,
                usage: None,
            }),
            Scripted::Fail(kind) => Err(TangentError::model(kind, "scripted failure")),
        }
    }

    async fn complete_stream(&self, turns: &[ModelTurn]) -> Result<ChunkStream> {
        match self.next_reply(turns) {
            Scripted::Chunks(chunks) => {
                let items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Scripted::Text(text) => Ok(Box::pin(futures::stream::iter(vec![Ok(text)]))),
            Scripted::Empty => Ok(Box::pin(futures::stream::empty())),
            Scripted::Fail(kind) => Err(TangentError::model(kind, "scripted failure")),
        }
    }
}

/// Engine configuration with title generation turned off, so tests
/// that do not script a title reply stay deterministic.
#[allow(dead_code)]
pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        title: TitleConfig {
            enabled: false,
            ..TitleConfig::default()
        },
        ..EngineConfig::default()
    }
}

/// Context over an in-memory store with titles off.
#[allow(dead_code)]
pub fn memory_context(model: Arc<ScriptedModel>) -> EngineContext {
    EngineContext::new(quiet_config(), Arc::new(MemoryStore::new()), model)
        .expect("failed to build context")
}
