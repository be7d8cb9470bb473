//! API integration tests.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use parley::protocol::Role;
use parley::provider::CompletionTurn;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{ScriptedProvider, Step, collect_content, test_app};

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .uri("/api/chat")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_root_liveness() {
    let app = test_app(ScriptedProvider::fragments(&[]));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json, json!({"message": "LLM API is running"}));
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(ScriptedProvider::fragments(&[]));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_empty_messages_rejected_without_upstream_call() {
    let provider = ScriptedProvider::fragments(&["never"]);
    let app = test_app(provider.clone());

    let response = app
        .oneshot(chat_request(json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["error"], "Messages are required");
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_missing_messages_rejected() {
    let provider = ScriptedProvider::fragments(&["never"]);
    let app = test_app(provider.clone());

    let response = app.oneshot(chat_request(json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["error"], "Messages are required");
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let provider = ScriptedProvider::fragments(&["never"]);
    let app = test_app(provider.clone());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chat")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"messages\": [ {\"role\": \"user\""))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["code"], "BAD_REQUEST");

    let app = test_app(provider.clone());
    let response = app
        .oneshot(chat_request(
            json!({"messages": [{"role": "system", "content": "hi"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_setup_failure_returns_generic_500() {
    let app = test_app(ScriptedProvider::failing());

    let response = app
        .oneshot(chat_request(
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["error"], "Failed to process request");
    assert_eq!(json["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_failure_before_first_fragment_returns_500() {
    let app = test_app(ScriptedProvider::new(vec![Step::Fail]));

    let response = app
        .oneshot(chat_request(
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(response).await;
    assert!(!text.contains("data:"));
}

#[tokio::test]
async fn test_fragments_streamed_with_empties_omitted() {
    let provider = ScriptedProvider::fragments(&["Hel", "", "lo", " world", ""]);
    let app = test_app(provider.clone());

    let response = app
        .oneshot(chat_request(
            json!({"messages": [{"role": "user", "content": "Say hello"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let text = body_text(response).await;
    let (content, events) = collect_content(&text);
    assert_eq!(content, "Hello world");
    assert_eq!(events, 3);
    assert!(text.contains("data: {\"content\":\"Hel\"}\n\n"));

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec![CompletionTurn::new(Role::User, "Say hello")]);
}

#[tokio::test]
async fn test_history_order_and_file_inlining() {
    let provider = ScriptedProvider::fragments(&["ok"]);
    let app = test_app(provider.clone());

    let response = app
        .oneshot(chat_request(json!({
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"},
                {
                    "role": "user",
                    "content": "Summarize",
                    "file": {"name": "notes.txt", "type": "text/plain", "data": "aGVsbG8gd29ybGQ="}
                }
            ]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let _ = body_text(response).await;

    let calls = provider.calls();
    assert_eq!(
        calls[0],
        vec![
            CompletionTurn::new(Role::User, "Hi"),
            CompletionTurn::new(Role::Assistant, "Hello!"),
            CompletionTurn::new(
                Role::User,
                "Summarize\n\nFile: notes.txt (text/plain)\nData: aGVsbG8gd29ybGQ="
            ),
        ]
    );
}

#[tokio::test]
async fn test_mid_stream_failure_emits_terminal_error_event() {
    let provider = ScriptedProvider::new(vec![
        Step::Fragment("partial"),
        Step::Fail,
        Step::Fragment("never"),
    ]);
    let app = test_app(provider);

    let response = app
        .oneshot(chat_request(
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    let (content, _) = collect_content(&text);
    assert_eq!(content, "partial");
    assert!(text.contains("event: error\ndata: {\"error\":\"Upstream stream interrupted\"}"));
    assert!(!text.contains("never"));
    assert!(!text.contains("connection reset"));
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let app = test_app(ScriptedProvider::fragments(&[]));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chat")
                .method(Method::OPTIONS)
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|h| h.to_str().ok()),
        Some("*")
    );
}
