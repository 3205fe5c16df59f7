//! HTTP-level tests for the chat-completion client against a local mock server.
//!
//! The client is blocking, so each request runs on a blocking thread while the
//! mock server runs on the tokio runtime.

use aitag::completion::{
    ChatOptions, CompletionClientBuilder, CompletionClientTrait, CompletionError,
    CompletionResult, SinkError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Runs one completion against `base_url`, collecting fragments seen by the sink.
async fn complete(
    base_url: String,
    prompt: &'static str,
    options: ChatOptions,
) -> (Result<CompletionResult, CompletionError>, Vec<String>) {
    tokio::task::spawn_blocking(move || {
        let client = CompletionClientBuilder::new()
            .base_url(base_url)
            .api_key("sk-test")
            .model("test-model")
            .build()
            .expect("Failed to create client");

        let mut seen = Vec::new();
        let mut sink = |fragment: &str| -> Result<(), SinkError> {
            seen.push(fragment.to_string());
            Ok(())
        };
        let result = client.complete(prompt, Some(&mut sink), &options);
        (result, seen)
    })
    .await
    .expect("blocking task panicked")
}

fn sse_body(events: &[&str]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn streams_sse_fragments_in_order() {
    let mock_server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
        r#"{"choices":[{"delta":{"content":"lo, "}}]}"#,
        r#"{"choices":[{"delta":{"content":"world"}}]}"#,
        "[DONE]",
        r#"{"choices":[{"delta":{"content":"ignored"}}]}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(header("Accept", "text/event-stream"))
        .and(body_partial_json(json!({"model": "test-model", "stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "text/event-stream; charset=utf-8"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (result, seen) = complete(
        format!("{}/v1", mock_server.uri()),
        "Say hello",
        ChatOptions::default(),
    )
    .await;

    let result = result.expect("completion should succeed");
    assert_eq!(result.full_text, "Hello, world");
    assert_eq!(seen, vec!["Hel", "lo, ", "world"]);
    assert_eq!(result.fragments, seen);
}

#[tokio::test(flavor = "multi_thread")]
async fn json_response_is_delivered_as_one_fragment() {
    let mock_server = MockServer::start().await;
    let response = json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "{\"title\":\"T\",\"tags\":[\"a\"]}"}
        }]
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Accept", "application/json"))
        .and(body_partial_json(json!({
            "stream": false,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "Summarise"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (result, seen) = complete(
        mock_server.uri(),
        "Summarise",
        ChatOptions::non_streaming("be brief"),
    )
    .await;

    let result = result.expect("completion should succeed");
    assert_eq!(result.full_text, r#"{"title":"T","tags":["a"]}"#);
    assert_eq!(seen.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_success_status_carries_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&mock_server)
        .await;

    let (result, seen) = complete(mock_server.uri(), "hi", ChatOptions::default()).await;

    match result {
        Err(CompletionError::Http { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "invalid api key");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
    assert!(seen.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn model_override_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "other-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let options = ChatOptions {
        model: Some("other-model".to_string()),
        ..ChatOptions::non_streaming("system")
    };
    let (result, _) = complete(mock_server.uri(), "hi", options).await;

    assert_eq!(result.expect("completion should succeed").full_text, "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_is_a_network_error() {
    // Nothing listens on port 1
    let (result, _) = complete(
        "http://127.0.0.1:1".to_string(),
        "hi",
        ChatOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(CompletionError::Network(_))));
}
