//! Mock Provider Tests
//!
//! Tests using mockall for the Provider trait to verify
//! that the trait can be mocked and its envelopes parsed.

use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Value};
use toolloop_provider::{
    parse_response, ConverseRequest, Message, Provider, ProviderError, StopReason, Tool,
    ToolChoice, ToolConfig,
};

// Create a mock implementation of the Provider trait
mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn converse(&self, request: ConverseRequest) -> Result<Value, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

fn text_envelope(text: &str) -> Value {
    json!({
        "output": { "message": { "role": "assistant", "content": [{ "text": text }] } },
        "stopReason": "end_turn",
        "usage": { "inputTokens": 5, "outputTokens": 2, "totalTokens": 7 }
    })
}

#[tokio::test]
async fn test_mock_provider_returns_envelope() {
    let mut mock = MockProvider::new();

    mock.expect_converse()
        .times(1)
        .returning(|_| Ok(text_envelope("Hello from mock!")));

    let payload = mock.converse(ConverseRequest::default()).await.unwrap();
    let response = parse_response(&payload).unwrap();

    assert_eq!(response.content, "Hello from mock!");
    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert!(!response.has_tool_calls());
}

#[tokio::test]
async fn test_mock_provider_returns_error() {
    let mut mock = MockProvider::new();

    mock.expect_converse().times(1).returning(|_| {
        Err(ProviderError::Api {
            status: 400,
            message: "Mock API error".to_string(),
        })
    });

    let result = mock.converse(ConverseRequest::default()).await;

    match result {
        Err(ProviderError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Mock API error");
        }
        _ => panic!("Expected Api error"),
    }
}

#[tokio::test]
async fn test_mock_provider_with_tool_calls() {
    let mut mock = MockProvider::new();

    mock.expect_converse()
        .times(1)
        .withf(|request| {
            request.messages.len() == 1
                && request
                    .tool_config
                    .as_ref()
                    .map(|c| c.tool_choice == ToolChoice::Auto)
                    .unwrap_or(false)
        })
        .returning(|_| {
            Ok(json!({
                "output": { "message": { "role": "assistant", "content": [
                    { "text": "I'll look that up" },
                    { "toolUse": { "toolUseId": "mock_call_1", "name": "mock_tool", "input": { "arg": "value" } } }
                ] } },
                "stopReason": "tool_use",
                "usage": { "inputTokens": 10, "outputTokens": 5, "totalTokens": 15 }
            }))
        });

    let request = ConverseRequest {
        model_id: "test-model".to_string(),
        messages: vec![Message::user("Do something")],
        tool_config: Some(ToolConfig::auto(vec![Tool::new(
            "mock_tool",
            "A mock tool",
            json!({ "type": "object" }),
        )])),
        ..Default::default()
    };

    let payload = mock.converse(request).await.unwrap();
    let response = parse_response(&payload).unwrap();

    assert!(response.has_tool_calls());
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "mock_tool");
    assert_eq!(response.tool_calls[0].parameters, json!({ "arg": "value" }));
    assert_eq!(response.usage.total_tokens, 15);
}

#[tokio::test]
async fn test_mock_provider_malformed_envelope() {
    let mut mock = MockProvider::new();

    mock.expect_converse()
        .times(1)
        .returning(|_| Ok(json!({ "unexpected": true })));

    let payload = mock.converse(ConverseRequest::default()).await.unwrap();
    let result = parse_response(&payload);

    assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
}

#[test]
fn test_mock_provider_default_model() {
    let mut mock = MockProvider::new();

    mock.expect_default_model()
        .times(1)
        .returning(|| "mock-model-v1".to_string());

    assert_eq!(mock.default_model(), "mock-model-v1");
}

#[test]
fn test_mock_provider_is_configured() {
    let mut mock = MockProvider::new();

    mock.expect_is_configured().times(1).returning(|| false);

    assert!(!mock.is_configured());
}

#[tokio::test]
async fn test_mock_provider_rate_limited() {
    let mut mock = MockProvider::new();

    mock.expect_converse()
        .times(1)
        .returning(|_| Err(ProviderError::RateLimited));

    let result = mock.converse(ConverseRequest::default()).await;

    assert!(matches!(result, Err(ProviderError::RateLimited)));
}

// Test using a struct that contains a Provider trait object
struct ProviderConsumer {
    provider: Box<dyn Provider>,
}

impl ProviderConsumer {
    async fn ask(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ConverseRequest {
            model_id: "test-model".to_string(),
            messages: vec![Message::user(prompt)],
            ..Default::default()
        };

        let payload = self.provider.converse(request).await?;
        Ok(parse_response(&payload)?.content)
    }
}

#[tokio::test]
async fn test_mock_provider_in_consumer() {
    let mut mock = MockProvider::new();

    mock.expect_converse().times(1).returning(|request| {
        let prompt = request
            .messages
            .first()
            .map(|m| m.text())
            .unwrap_or_default();
        Ok(text_envelope(&format!("Echo: {}", prompt)))
    });

    let consumer = ProviderConsumer {
        provider: Box::new(mock),
    };

    let result = consumer.ask("Hello").await.unwrap();
    assert_eq!(result, "Echo: Hello");
}
