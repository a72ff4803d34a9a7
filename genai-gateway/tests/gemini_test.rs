//! Gemini provider tests against a local mock of the generateContent API.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use genai_gateway::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use genai_gateway::services::providers::{FinishReason, ProviderError, TextProvider};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Captured {
    method_path: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    reply: Value,
    delay: Option<Duration>,
    captured: Arc<Mutex<Vec<Captured>>>,
}

async fn generate_content(
    State(state): State<MockState>,
    Path(method_path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.captured.lock().unwrap().push(Captured {
        method_path,
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        body,
    });

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    (state.status, Json(state.reply.clone()))
}

/// Start a mock Gemini server and return its base URL plus the request log.
async fn spawn_mock_gemini(
    status: StatusCode,
    reply: Value,
    delay: Option<Duration>,
) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        status,
        reply,
        delay,
        captured: captured.clone(),
    };

    let app = Router::new()
        .route("/v1beta/models/:method_path", post(generate_content))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v1beta", addr), captured)
}

fn provider(base_url: &str, timeout: Duration) -> GeminiTextProvider {
    GeminiTextProvider::new(GeminiConfig {
        api_key: Secret::new("test-api-key".to_string()),
        model: "gemini-1.5-flash".to_string(),
        base_url: base_url.to_string(),
        request_timeout: timeout,
    })
    .unwrap()
}

fn text_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 2, "totalTokenCount": 3}
    })
}

#[tokio::test]
async fn generate_sends_prompt_and_returns_text() {
    let (base_url, captured) =
        spawn_mock_gemini(StatusCode::OK, text_reply("Hi there"), None).await;
    let gemini = provider(&base_url, Duration::from_secs(5));

    let response = gemini.generate("hello").await.unwrap();

    assert_eq!(response.text, "Hi there");
    assert_eq!(response.input_tokens, 1);
    assert_eq!(response.output_tokens, 2);
    assert_eq!(response.finish_reason, FinishReason::Complete);

    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].method_path, "gemini-1.5-flash:generateContent");
    assert_eq!(captured[0].api_key.as_deref(), Some("test-api-key"));
    assert_eq!(
        captured[0].body,
        json!({"contents": [{"role": "user", "parts": [{"text": "hello"}]}]})
    );
}

#[tokio::test]
async fn rate_limit_is_reported() {
    let (base_url, _) = spawn_mock_gemini(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"code": 429, "message": "quota"}}),
        None,
    )
    .await;

    let err = provider(&base_url, Duration::from_secs(5))
        .generate("hello")
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::RateLimited);
}

#[tokio::test]
async fn upstream_error_keeps_status_but_not_body() {
    let (base_url, _) = spawn_mock_gemini(
        StatusCode::FORBIDDEN,
        json!({"error": {"code": 403, "message": "API key not valid"}}),
        None,
    )
    .await;

    let err = provider(&base_url, Duration::from_secs(5))
        .generate("hello")
        .await
        .unwrap_err();

    match err {
        ProviderError::ApiError(msg) => {
            assert!(msg.contains("403"));
            assert!(!msg.contains("API key not valid"));
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_body_is_api_error() {
    let (base_url, _) = spawn_mock_gemini(StatusCode::OK, json!("not an object"), None).await;

    let err = provider(&base_url, Duration::from_secs(5))
        .generate("hello")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::ApiError(_)));
}

#[tokio::test]
async fn safety_block_is_content_filtered() {
    let (base_url, _) = spawn_mock_gemini(
        StatusCode::OK,
        json!({"candidates": [{"finishReason": "SAFETY"}]}),
        None,
    )
    .await;

    let err = provider(&base_url, Duration::from_secs(5))
        .generate("hello")
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::ContentFiltered);
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let (base_url, _) = spawn_mock_gemini(
        StatusCode::OK,
        text_reply("late"),
        Some(Duration::from_secs(5)),
    )
    .await;

    let err = provider(&base_url, Duration::from_secs(1))
        .generate("hello")
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::Timeout(1));
}

#[tokio::test]
async fn unreachable_upstream_is_network_error() {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = provider(&format!("http://{}/v1beta", addr), Duration::from_secs(5))
        .generate("hello")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::NetworkError(_)));
}
