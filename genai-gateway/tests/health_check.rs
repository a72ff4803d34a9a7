//! Integration tests that run the gateway on a real socket.

use axum::{routing::post, Json, Router};
use genai_gateway::config::{GatewayConfig, GoogleConfig, ModelConfig, ObservabilityConfig};
use genai_gateway::services::providers::mock::MockTextProvider;
use genai_gateway::services::providers::ProviderError;
use genai_gateway::startup::Application;
use reqwest::Client;
use secrecy::Secret;
use serde_json::json;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use std::time::Duration;

fn test_config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        common: CoreConfig { port: 0 }, // Random port
        google: GoogleConfig {
            api_key: Secret::new("test-api-key".to_string()),
            base_url: base_url.to_string(),
            request_timeout_secs: 5,
        },
        models: ModelConfig {
            text_model: "gemini-1.5-flash".to_string(),
        },
        observability: ObservabilityConfig {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        },
    }
}

/// Spawn the application with `provider` and return its port.
async fn spawn_app(provider: MockTextProvider) -> u16 {
    let app =
        Application::build_with_provider(test_config("http://127.0.0.1:1"), Arc::new(provider))
            .await
            .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        let _ = app.run_until_stopped().await;
    });

    port
}

/// A Gemini stand-in that upper-cases the prompt it receives.
async fn spawn_mock_gemini() -> String {
    async fn upper(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_uppercase();
        Json(json!({
            "candidates": [{"content": {"parts": [{"text": prompt}]}, "finishReason": "STOP"}]
        }))
    }

    let app = Router::new().route("/v1beta/models/:method_path", post(upper));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/v1beta", addr)
}

#[tokio::test]
async fn health_check_returns_ok() {
    let port = spawn_app(MockTextProvider::echo()).await;
    let client = Client::new();

    let response = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "genai-gateway");
}

#[tokio::test]
async fn root_and_ai_over_http() {
    let port = spawn_app(MockTextProvider::with_responses([("hello", "HELLO")])).await;
    let client = Client::new();

    let root: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(root, json!({"status": "AI model started"}));

    let response = client
        .get(format!("http://127.0.0.1:{}/ai", port))
        .query(&[("prompt", "hello")])
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), r#"{"response":"HELLO"}"#);
}

#[tokio::test]
async fn failing_provider_does_not_stop_server() {
    let port = spawn_app(MockTextProvider::failing(ProviderError::ApiError(
        "boom".to_string(),
    )))
    .await;
    let client = Client::new();

    let response = client
        .get(format!("http://127.0.0.1:{}/ai?prompt=x", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_server_error());

    let response = client
        .get(format!("http://127.0.0.1:{}/", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn metrics_endpoint_exposes_prompt_counters() {
    let port = spawn_app(MockTextProvider::echo()).await;
    let client = Client::new();

    client
        .get(format!("http://127.0.0.1:{}/ai?prompt=count-me", port))
        .send()
        .await
        .expect("Failed to send request");

    let metrics = client
        .get(format!("http://127.0.0.1:{}/metrics", port))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .unwrap();

    assert!(metrics.contains("genai_requests_total"));
    assert!(metrics.contains("http_requests_total"));
}

#[tokio::test]
async fn gemini_backed_application_round_trip() {
    let base_url = spawn_mock_gemini().await;
    let app = Application::build(test_config(&base_url))
        .await
        .expect("Failed to build application");
    let port = app.port();
    tokio::spawn(async move {
        let _ = app.run_until_stopped().await;
    });

    let body: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/ai?prompt=shout", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(body, json!({"response": "SHOUT"}));
}
