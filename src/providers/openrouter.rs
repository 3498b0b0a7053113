//! OpenRouter model service adapter
//!
//! Implements [`ChatModel`] over the OpenRouter chat-completions API.
//! One instance is shared process-wide; the underlying HTTP client is
//! built lazily on first use and reused for every request after that.
//!
//! Streaming replies arrive as server-sent events: a spawned task parses
//! the byte stream into `data:` payloads and forwards each text delta
//! through a channel, so dropping the returned stream cancels the
//! request without tearing down the shared client.

use crate::config::ModelConfig;
use crate::error::{ModelFailure, Result, TangentError};
use crate::message::TokenUsage;
use crate::providers::base::{ChatModel, ChunkStream, ModelReply, ModelTurn};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, OnceCell};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Appended to the configured base URL for every request.
const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
/// Environment fallback for the API key.
const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
/// SSE payload that terminates a stream.
const DONE_MARKER: &str = "[DONE]";

/// OpenRouter-backed [`ChatModel`] implementation.
pub struct OpenRouterModel {
    config: ModelConfig,
    api_key: String,
    client: OnceCell<reqwest::Client>,
}

impl OpenRouterModel {
    /// Creates an adapter from configuration.
    ///
    /// The API key comes from the config, falling back to the
    /// `OPENROUTER_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::Config`] when no API key is available.
    pub fn new(config: ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                TangentError::Config(format!(
                    "no API key in model config or {} environment variable",
                    API_KEY_ENV
                ))
            })?;
        Ok(Self {
            config,
            api_key,
            client: OnceCell::new(),
        })
    }

    /// Lazily builds the shared HTTP client; the first caller wins and
    /// everyone else reuses the same connection pool.
    async fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .connect_timeout(self.config.request_timeout())
                    .build()
                    .map_err(|e| {
                        TangentError::Config(format!("failed to build HTTP client: {}", e))
                    })
            })
            .await
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        )
    }

    fn request_body<'a>(&'a self, turns: &'a [ModelTurn], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: turns
                .iter()
                .map(|turn| WireMessage {
                    role: turn.role.as_str(),
                    content: &turn.text,
                })
                .collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        }
    }

    async fn send(&self, turns: &[ModelTurn], stream: bool) -> Result<reqwest::Response> {
        let client = self.client().await?;
        let response = client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(turns, stream))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TangentError::model(
                ModelFailure::Transport,
                format!("service returned HTTP {}: {}", status, body),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenRouterModel {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, turns: &[ModelTurn]) -> Result<ModelReply> {
        debug!(model = %self.config.model, turns = turns.len(), "requesting completion");
        let exchange = async {
            let response = self.send(turns, false).await?;
            let payload: ChatResponse = response.json().await.map_err(|e| {
                TangentError::model(
                    ModelFailure::MalformedResponse,
                    format!("undecodable completion payload: {}", e),
                )
            })?;
            extract_reply(payload)
        };

        tokio::time::timeout(self.config.request_timeout(), exchange)
            .await
            .map_err(|_| {
                TangentError::model(
                    ModelFailure::Timeout,
                    format!(
                        "completion exceeded {}s deadline",
                        self.config.request_timeout_secs
                    ),
                )
            })?
    }

    async fn complete_stream(&self, turns: &[ModelTurn]) -> Result<ChunkStream> {
        debug!(model = %self.config.model, turns = turns.len(), "opening completion stream");
        let response = tokio::time::timeout(self.config.request_timeout(), self.send(turns, true))
            .await
            .map_err(|_| {
                TangentError::model(
                    ModelFailure::Timeout,
                    format!(
                        "stream connect exceeded {}s deadline",
                        self.config.request_timeout_secs
                    ),
                )
            })??;

        let byte_stream = response.bytes_stream();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            forward_sse_deltas(byte_stream, tx).await;
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// Parses an SSE byte stream and forwards each text delta.
///
/// Events are separated by blank lines; splitting happens on raw bytes
/// so multi-byte characters crossing a network chunk boundary survive.
/// Ends on `[DONE]`, a transport error (forwarded as the final item),
/// or the receiver going away.
async fn forward_sse_deltas(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    deltas: mpsc::UnboundedSender<Result<String>>,
) {
    use futures::StreamExt;

    let mut buffer = BytesMut::new();

    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                let _ = deltas.send(Err(classify_request_error(e)));
                return;
            }
        };
        buffer.extend_from_slice(&chunk);

        while let Some(pos) = find_event_boundary(&buffer) {
            let event = buffer.split_to(pos + 2);
            let event_text = String::from_utf8_lossy(&event[..pos]).into_owned();
            if !forward_event(&event_text, &deltas) {
                return;
            }
        }
    }

    // Flush a trailing partial event, if the stream ended without the
    // closing blank line.
    if !buffer.is_empty() {
        let event_text = String::from_utf8_lossy(&buffer).into_owned();
        forward_event(&event_text, &deltas);
    }
}

fn find_event_boundary(buffer: &BytesMut) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

/// Processes one SSE event block. Returns `false` when the stream is
/// finished (`[DONE]` seen or the receiver dropped).
fn forward_event(event_block: &str, deltas: &mpsc::UnboundedSender<Result<String>>) -> bool {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in event_block.lines() {
        // Comment lines (": keep-alive") and non-data fields are ignored.
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start());
        }
    }
    if data_lines.is_empty() {
        return true;
    }
    let data = data_lines.join("\n");
    if data.trim() == DONE_MARKER {
        return false;
    }

    match serde_json::from_str::<StreamEvent>(&data) {
        Ok(event) => {
            let delta = event
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content);
            match delta {
                Some(content) => deltas.send(Ok(content)).is_ok(),
                None => true,
            }
        }
        Err(e) => {
            debug!(error = %e, "skipping undecodable stream event");
            true
        }
    }
}

fn classify_request_error(e: reqwest::Error) -> TangentError {
    if e.is_timeout() || e.is_connect() {
        TangentError::model(ModelFailure::Timeout, format!("request timed out: {}", e))
    } else {
        TangentError::model(ModelFailure::Transport, format!("request failed: {}", e))
    }
}

fn extract_reply(payload: ChatResponse) -> Result<ModelReply> {
    let text = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| {
            TangentError::model(
                ModelFailure::MalformedResponse,
                "completion payload contained no choices",
            )
        })?
        .message
        .content
        .ok_or_else(|| {
            TangentError::model(
                ModelFailure::MalformedResponse,
                "completion choice had no content field",
            )
        })?;
    let usage = payload
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));
    Ok(ModelReply {
        text,
        model: payload.model,
        usage,
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
