use std::collections::BTreeMap;

use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;

use ifrit::config::{CapabilitiesConfig, ExecutorConfig, ProviderKeys};
use ifrit::domains::execution::ExecuteRequest;
use ifrit::providers::{build_key_handlers, ProviderEndpoint, ProviderKind};
use ifrit::services::executor::CapabilityExecutor;

fn executor_for(server: &MockServer, kinds: &[ProviderKind]) -> CapabilityExecutor {
    let endpoints: BTreeMap<ProviderKind, ProviderEndpoint> = kinds
        .iter()
        .map(|kind| {
            (
                *kind,
                ProviderEndpoint {
                    base_url: Some(server.base_url()),
                    model: None,
                },
            )
        })
        .collect();
    CapabilityExecutor::new(ExecutorConfig {
        endpoints,
        ..ExecutorConfig::default()
    })
}

fn gemini_reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}],
        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 30}
    })
}

fn chat_reply(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "deepseek-chat",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 21, "total_tokens": 30}
    })
}

#[tokio::test]
async fn gemini_handler_returns_text_and_usage() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.0-flash:generateContent")
                .header("x-goog-api-key", "gem-key")
                .body_includes("bonsai");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(gemini_reply("Bonsai care basics"));
        })
        .await;

    let executor = executor_for(&server, &[ProviderKind::Gemini]);
    let keys = ProviderKeys::new().with_key(ProviderKind::Gemini, "gem-key");
    let result = executor
        .execute_with_keys(
            &ExecuteRequest::new("generate", "write about bonsai"),
            &keys,
            &CapabilitiesConfig::default(),
        )
        .await
        .unwrap();

    mock.assert_calls(1);
    assert!(result.success);
    assert_eq!(result.text.as_deref(), Some("Bonsai care basics"));
    assert_eq!(result.handler_used.as_deref(), Some("gemini"));
    let usage = result.usage.unwrap();
    assert_eq!((usage.input_tokens, usage.output_tokens), (12, 30));
}

#[tokio::test]
async fn chat_completions_handler_sends_bearer_and_max_tokens() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer ds-key")
                .body_includes("\"max_tokens\":256")
                .body_includes("deepseek-chat");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(chat_reply("An outline"));
        })
        .await;

    let executor = executor_for(&server, &[ProviderKind::DeepSeek]);
    let keys = ProviderKeys::new().with_key(ProviderKind::DeepSeek, "ds-key");
    let mut request = ExecuteRequest::new("generate", "outline a post");
    request.max_tokens = Some(256);
    let result = executor
        .execute_with_keys(&request, &keys, &CapabilitiesConfig::default())
        .await
        .unwrap();

    mock.assert_calls(1);
    assert!(result.success);
    assert_eq!(result.text.as_deref(), Some("An outline"));
    let log = executor.diagnostics_log();
    assert_eq!(log[0].provider_id, "deepseek");
    assert_eq!(log[0].tokens_output, 21);
}

#[tokio::test]
async fn second_key_takes_over_after_server_error() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.0-flash:generateContent")
                .header("x-goog-api-key", "key-one");
            then.status(500).body("internal error");
        })
        .await;
    let working = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.0-flash:generateContent")
                .header("x-goog-api-key", "key-two");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(gemini_reply("Recovered"));
        })
        .await;

    let executor = executor_for(&server, &[ProviderKind::Gemini]);
    let keys = ProviderKeys::new()
        .with_key(ProviderKind::Gemini, "key-one")
        .with_key(ProviderKind::Gemini, "key-two");
    let result = executor
        .execute_with_keys(
            &ExecuteRequest::new("generate", "bonsai").with_max_retries(0),
            &keys,
            &CapabilitiesConfig::default(),
        )
        .await
        .unwrap();

    failing.assert_calls(1);
    working.assert_calls(1);
    assert!(result.success);
    assert_eq!(result.handler_used.as_deref(), Some("gemini#2"));
    assert_eq!(result.fallbacks_attempted, vec!["gemini"]);

    let stats = executor.provider_stats();
    assert_eq!(stats["gemini"].calls, 2);
    assert_eq!(stats["gemini"].errors, 1);
    assert_eq!(stats["gemini"].success_rate, 50);
}

#[tokio::test]
async fn perplexity_citations_land_in_data() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "Findings"}}],
                    "citations": ["https://example.org/bonsai"]
                }));
        })
        .await;

    let executor = executor_for(&server, &[ProviderKind::Perplexity]);
    let keys = ProviderKeys::new().with_key(ProviderKind::Perplexity, "pplx-key");
    let result = executor
        .execute_with_keys(
            &ExecuteRequest::new("research", "bonsai trends"),
            &keys,
            &CapabilitiesConfig::default(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.handler_used.as_deref(), Some("perplexity"));
    assert_eq!(
        result.data.unwrap()["citations"][0],
        json!("https://example.org/bonsai")
    );
}

#[tokio::test]
async fn no_keys_means_no_handlers() {
    let executor = CapabilityExecutor::default();
    let result = executor
        .execute_with_keys(
            &ExecuteRequest::new("generate", "bonsai"),
            &ProviderKeys::new(),
            &CapabilitiesConfig::default(),
        )
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("No handlers available"));
}

#[tokio::test]
async fn provider_errors_do_not_leak_keys() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401)
                .body("{\"error\": \"Incorrect API key provided: sk-live-abcdef\"}");
        })
        .await;

    let executor = executor_for(&server, &[ProviderKind::OpenAi]);
    let keys = ProviderKeys::new().with_key(ProviderKind::OpenAi, "sk-live-abcdef");
    let result = executor
        .execute_with_keys(
            &ExecuteRequest::new("generate", "bonsai").with_max_retries(0),
            &keys,
            &CapabilitiesConfig::default(),
        )
        .await
        .unwrap();

    let error = result.error.unwrap();
    assert!(error.contains("401"));
    assert!(!error.contains("abcdef"));
}

#[tokio::test]
async fn echoed_keys_of_any_format_are_scrubbed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401)
                .body("{\"error\": \"API key zz-custom-123 is not valid\"}");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.0-flash:generateContent");
            then.status(400)
                .body("{\"error\": \"key gm.private.789 expired\"}");
        })
        .await;

    let executor = executor_for(&server, &[ProviderKind::DeepSeek, ProviderKind::Gemini]);
    let keys = ProviderKeys::new()
        .with_key(ProviderKind::DeepSeek, "zz-custom-123")
        .with_key(ProviderKind::Gemini, "gm.private.789");
    let result = executor
        .execute_with_keys(
            &ExecuteRequest::new("generate", "bonsai").with_max_retries(0),
            &keys,
            &CapabilitiesConfig::default(),
        )
        .await
        .unwrap();

    assert!(!result.success);
    let mut messages: Vec<String> = executor
        .diagnostics_log()
        .into_iter()
        .filter_map(|record| record.error)
        .collect();
    messages.push(result.error.unwrap());
    assert!(messages.len() >= 3);
    for message in &messages {
        assert!(!message.contains("zz-custom-123"), "{message}");
        assert!(!message.contains("gm.private.789"), "{message}");
    }
    assert!(messages.iter().any(|m| m.contains("[REDACTED]")));
}

#[tokio::test]
async fn health_checks_hit_model_endpoints() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models/gemini-2.0-flash");
            then.status(200).json_body(json!({"name": "models/gemini-2.0-flash"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(403).body("forbidden");
        })
        .await;

    let endpoint = ProviderEndpoint {
        base_url: Some(server.base_url()),
        model: None,
    };
    let keys = ProviderKeys::new()
        .with_key(ProviderKind::Gemini, "gem-key")
        .with_key(ProviderKind::OpenAi, "oa-key");
    let handlers = build_key_handlers(&keys, |_| endpoint.clone()).unwrap();
    let mut health = BTreeMap::new();
    for handler in &handlers {
        health.insert(
            handler.id().to_string(),
            handler.invoker().health_check().await.unwrap(),
        );
    }
    assert!(health["gemini"]);
    assert!(!health["openai"]);
}
