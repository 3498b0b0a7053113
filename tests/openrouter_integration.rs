use futures::StreamExt;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;
use tangent::config::ModelConfig;
use tangent::{ChatModel, ModelFailure, ModelTurn, OpenRouterModel, TangentError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ModelConfig {
    ModelConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        ..ModelConfig::default()
    }
}

fn turns() -> Vec<ModelTurn> {
    vec![ModelTurn::system("be brief"), ModelTurn::user("hi")]
}

#[tokio::test]
async fn test_complete_happy_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "openai/gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Hello from the mock"}}],
            "model": "openai/gpt-4o-mini",
            "usage": {"prompt_tokens": 9, "completion_tokens": 3}
        })))
        .mount(&server)
        .await;

    let model = OpenRouterModel::new(config_for(&server)).unwrap();
    let reply = model.complete(&turns()).await.unwrap();

    assert_eq!(reply.text, "Hello from the mock");
    assert_eq!(reply.model.as_deref(), Some("openai/gpt-4o-mini"));
    assert_eq!(reply.usage.unwrap().total_tokens, 12);
}

#[tokio::test]
async fn test_http_error_maps_to_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let model = OpenRouterModel::new(config_for(&server)).unwrap();
    let err = model.complete(&turns()).await.unwrap_err();

    assert!(matches!(
        err,
        TangentError::ModelService {
            kind: ModelFailure::Transport,
            ..
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_missing_content_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {}}]
        })))
        .mount(&server)
        .await;

    let model = OpenRouterModel::new(config_for(&server)).unwrap();
    let err = model.complete(&turns()).await.unwrap_err();

    assert!(matches!(
        err,
        TangentError::ModelService {
            kind: ModelFailure::MalformedResponse,
            ..
        }
    ));
    // Malformed payloads are the one failure not worth retrying.
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_empty_choices_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let model = OpenRouterModel::new(config_for(&server)).unwrap();
    let err = model.complete(&turns()).await.unwrap_err();
    assert!(matches!(
        err,
        TangentError::ModelService {
            kind: ModelFailure::MalformedResponse,
            ..
        }
    ));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]})),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.request_timeout_secs = 1;
    let model = OpenRouterModel::new(config).unwrap();

    let err = model.complete(&turns()).await.unwrap_err();
    assert!(matches!(
        err,
        TangentError::ModelService {
            kind: ModelFailure::Timeout,
            ..
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_stream_forwards_deltas_and_skips_garbage() {
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {not json}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            // set_body_raw keeps the Content-Type at text/event-stream.
            ResponseTemplate::new(200)
                .set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let model = OpenRouterModel::new(config_for(&server)).unwrap();
    let mut stream = model.complete_stream(&turns()).await.unwrap();

    let mut deltas = Vec::new();
    while let Some(item) = stream.next().await {
        deltas.push(item.unwrap());
    }
    // Unparseable events and comments are skipped; empty deltas are
    // forwarded for the session layer to ignore.
    assert_eq!(deltas, vec!["Hi", "", " there"]);
}

#[tokio::test]
async fn test_stream_http_error_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let model = OpenRouterModel::new(config_for(&server)).unwrap();
    // The Ok stream is not Debug, so unwrap_err cannot be used here.
    let err = model.complete_stream(&turns()).await.err().unwrap();
    assert!(matches!(
        err,
        TangentError::ModelService {
            kind: ModelFailure::Transport,
            ..
        }
    ));
}

#[tokio::test]
#[serial]
async fn test_api_key_from_environment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer key-from-env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "authorized"}}]
        })))
        .mount(&server)
        .await;

    std::env::set_var("OPENROUTER_API_KEY", "key-from-env");
    let config = ModelConfig {
        base_url: server.uri(),
        api_key: None,
        ..ModelConfig::default()
    };
    let model = OpenRouterModel::new(config).unwrap();
    std::env::remove_var("OPENROUTER_API_KEY");

    let reply = model.complete(&turns()).await.unwrap();
    assert_eq!(reply.text, "authorized");
}
