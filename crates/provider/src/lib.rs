//! Model provider protocol
//!
//! Request/response types for a Converse-style chat protocol with native
//! tool use, the parser that normalizes a raw provider payload, and the
//! `Provider` trait the tool-call loop talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use thiserror::Error;
use tracing::trace;

pub mod converse;

pub use converse::ConverseProvider;

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("no API key configured")]
    NoApiKey,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("rate limited by provider")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation emitted by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlock {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

/// Outcome tag carried by every tool result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// Payload inside a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultContent {
    Text(String),
    Json(Value),
}

/// The answer to one `ToolUseBlock`, echoing its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: Vec<ToolResultContent>,
    pub status: ToolResultStatus,
}

impl ToolResultBlock {
    pub fn text(
        tool_use_id: impl Into<String>,
        text: impl Into<String>,
        status: ToolResultStatus,
    ) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: vec![ToolResultContent::Text(text.into())],
            status,
        }
    }
}

/// One block of message content.
///
/// Serializes externally tagged, e.g. `{"text": "..."}` or
/// `{"toolUse": {"toolUseId": ..., "name": ..., "input": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
    Text(String),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

/// A conversational turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    /// Assistant turn that requested tools. Empty text is left out.
    pub fn assistant_tool_uses(text: &str, calls: &[ToolCall]) -> Self {
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentBlock::Text(text.to_string()));
        }
        content.extend(calls.iter().map(|call| {
            ContentBlock::ToolUse(ToolUseBlock {
                tool_use_id: call.id.clone(),
                name: call.name.clone(),
                input: call.parameters.clone(),
            })
        }));
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// User turn carrying tool results, in the given order
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self {
            role: Role::User,
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
        }
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse(tool_use) => Some(tool_use),
            _ => None,
        })
    }

    pub fn tool_result_blocks(&self) -> impl Iterator<Item = &ToolResultBlock> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

/// System prompt block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemContent {
    Text(String),
}

/// Tool specification sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "toolSpec")]
    pub spec: ToolSpec,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            spec: ToolSpec {
                name: name.into(),
                description: description.into(),
                input_schema: InputSchema { json: parameters },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    pub json: Value,
}

/// Tool selection mode
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides whether to call a tool
    #[default]
    Auto,
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let value = match self {
            ToolChoice::Auto => json!({ "auto": {} }),
        };
        value.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub tools: Vec<Tool>,
    pub tool_choice: ToolChoice,
}

impl ToolConfig {
    pub fn auto(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            tool_choice: ToolChoice::Auto,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl InferenceConfig {
    pub fn is_empty(&self) -> bool {
        self.max_tokens.is_none() && self.temperature.is_none()
    }
}

/// One provider request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    pub model_id: String,
    pub system: Vec<SystemContent>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    #[serde(skip_serializing_if = "InferenceConfig::is_empty")]
    pub inference_config: InferenceConfig,
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    GuardrailIntervened,
    ContentFiltered,
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::GuardrailIntervened => "guardrail_intervened",
            StopReason::ContentFiltered => "content_filtered",
            StopReason::Other(other) => other,
        }
    }
}

impl From<&str> for StopReason {
    fn from(value: &str) -> Self {
        match value {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "guardrail_intervened" => StopReason::GuardrailIntervened,
            "content_filtered" => StopReason::ContentFiltered,
            other => StopReason::Other(other.to_string()),
        }
    }
}

impl From<String> for StopReason {
    fn from(value: String) -> Self {
        StopReason::from(value.as_str())
    }
}

impl From<StopReason> for String {
    fn from(value: StopReason) -> Self {
        value.as_str().to_string()
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default)]
    pub latency_ms: u64,
}

/// Tool invocation request extracted from a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub parameters: Value,
}

/// Normalized model reply for a single round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub stop_reason: StopReason,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
            metrics: Metrics::default(),
            tool_calls: Vec::new(),
        }
    }
}

/// Model provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one request and return the raw response envelope
    async fn converse(&self, request: ConverseRequest) -> Result<Value>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

fn malformed(what: &str) -> ProviderError {
    ProviderError::MalformedResponse(format!("missing `{}`", what))
}

/// Normalize a raw response envelope.
///
/// Text blocks are concatenated in document order and every `toolUse` block
/// becomes a `ToolCall` in declared order. Missing envelope fields fail the
/// whole parse; an empty content list is a valid, empty reply.
pub fn parse_response(payload: &Value) -> Result<ModelResponse> {
    let blocks = payload
        .pointer("/output/message/content")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("output.message.content"))?;
    let stop_reason = payload
        .get("stopReason")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("stopReason"))?;
    let usage = payload
        .get("usage")
        .filter(|usage| usage.is_object())
        .ok_or_else(|| malformed("usage"))?;
    let usage: Usage = serde_json::from_value(usage.clone())
        .map_err(|e| ProviderError::MalformedResponse(format!("usage: {}", e)))?;
    let metrics: Metrics = match payload.get("metrics") {
        Some(metrics) if metrics.is_object() => serde_json::from_value(metrics.clone())
            .map_err(|e| ProviderError::MalformedResponse(format!("metrics: {}", e)))?,
        _ => Metrics::default(),
    };

    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        if let Some(text) = block.get("text").and_then(Value::as_str) {
            content.push_str(text);
        } else if let Some(tool_use) = block.get("toolUse") {
            let id = tool_use
                .get("toolUseId")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("toolUse.toolUseId"))?;
            let name = tool_use
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("toolUse.name"))?;
            tool_calls.push(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                parameters: tool_use.get("input").cloned().unwrap_or_else(|| json!({})),
            });
        }
    }

    trace!(
        "parsed response: {} chars, {} tool calls, stop reason {}",
        content.len(),
        tool_calls.len(),
        stop_reason
    );

    Ok(ModelResponse {
        content,
        stop_reason: StopReason::from(stop_reason),
        usage,
        metrics,
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(content: Value) -> Value {
        json!({
            "output": { "message": { "role": "assistant", "content": content } },
            "stopReason": "end_turn",
            "usage": { "inputTokens": 12, "outputTokens": 3, "totalTokens": 15 },
            "metrics": { "latencyMs": 420 }
        })
    }

    // ========== parse_response Tests ==========

    #[test]
    fn test_parse_text_blocks_concatenated_in_order() {
        let payload = envelope(json!([{ "text": "Hello, " }, { "text": "world" }]));
        let response = parse_response(&payload).unwrap();

        assert_eq!(response.content, "Hello, world");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert!(!response.has_tool_calls());
        assert_eq!(response.usage.total_tokens, 15);
        assert_eq!(response.metrics.latency_ms, 420);
    }

    #[test]
    fn test_parse_empty_content_is_empty_reply() {
        let response = parse_response(&envelope(json!([]))).unwrap();
        assert_eq!(response.content, "");
        assert!(response.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_tool_calls_preserve_declared_order() {
        let payload = json!({
            "output": { "message": { "role": "assistant", "content": [
                { "text": "Let me check." },
                { "toolUse": { "toolUseId": "t-2", "name": "second", "input": { "a": 1 } } },
                { "toolUse": { "toolUseId": "t-1", "name": "first", "input": {} } }
            ] } },
            "stopReason": "tool_use",
            "usage": {}
        });

        let response = parse_response(&payload).unwrap();
        assert_eq!(response.content, "Let me check.");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        let ids: Vec<&str> = response.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["t-2", "t-1"]);
        assert_eq!(response.tool_calls[0].parameters, json!({ "a": 1 }));
    }

    #[test]
    fn test_parse_tool_use_without_input_defaults_to_empty_object() {
        let payload = envelope(json!([
            { "toolUse": { "toolUseId": "t-1", "name": "list" } }
        ]));
        let response = parse_response(&payload).unwrap();
        assert_eq!(response.tool_calls[0].parameters, json!({}));
    }

    #[test]
    fn test_parse_missing_metrics_defaults() {
        let payload = json!({
            "output": { "message": { "content": [{ "text": "ok" }] } },
            "stopReason": "end_turn",
            "usage": { "inputTokens": 1 }
        });
        let response = parse_response(&payload).unwrap();
        assert_eq!(response.metrics, Metrics::default());
        assert_eq!(response.usage.input_tokens, 1);
        assert_eq!(response.usage.output_tokens, 0);
    }

    #[test]
    fn test_parse_missing_content_is_malformed() {
        let payload = json!({ "stopReason": "end_turn", "usage": {} });
        let err = parse_response(&payload).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
        assert!(err.to_string().contains("output.message.content"));
    }

    #[test]
    fn test_parse_missing_stop_reason_is_malformed() {
        let payload = json!({
            "output": { "message": { "content": [] } },
            "usage": {}
        });
        let err = parse_response(&payload).unwrap_err();
        assert!(err.to_string().contains("stopReason"));
    }

    #[test]
    fn test_parse_missing_usage_is_malformed() {
        let payload = json!({
            "output": { "message": { "content": [] } },
            "stopReason": "end_turn"
        });
        let err = parse_response(&payload).unwrap_err();
        assert!(err.to_string().contains("usage"));
    }

    #[test]
    fn test_parse_unknown_stop_reason_kept_verbatim() {
        let mut payload = envelope(json!([]));
        payload["stopReason"] = json!("something_new");
        let response = parse_response(&payload).unwrap();
        assert_eq!(
            response.stop_reason,
            StopReason::Other("something_new".to_string())
        );
        assert_eq!(response.stop_reason.as_str(), "something_new");
    }

    // ========== Wire Shape Tests ==========

    #[test]
    fn test_message_serializes_as_content_blocks() {
        let msg = Message::user("hi");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "role": "user", "content": [{ "text": "hi" }] })
        );
    }

    #[test]
    fn test_assistant_tool_uses_skips_empty_text() {
        let calls = vec![ToolCall {
            id: "t-1".to_string(),
            name: "lookup".to_string(),
            parameters: json!({ "q": "x" }),
        }];
        let msg = Message::assistant_tool_uses("", &calls);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "role": "assistant",
                "content": [{ "toolUse": { "toolUseId": "t-1", "name": "lookup", "input": { "q": "x" } } }]
            })
        );

        let msg = Message::assistant_tool_uses("thinking", &calls);
        assert_eq!(msg.content.len(), 2);
        assert_eq!(msg.text(), "thinking");
    }

    #[test]
    fn test_tool_result_serialization() {
        let msg = Message::tool_results(vec![ToolResultBlock::text(
            "t-1",
            "{\"ok\":true}",
            ToolResultStatus::Error,
        )]);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "role": "user",
                "content": [{ "toolResult": {
                    "toolUseId": "t-1",
                    "content": [{ "text": "{\"ok\":true}" }],
                    "status": "error"
                } }]
            })
        );
    }

    #[test]
    fn test_tool_spec_shape() {
        let tool = Tool::new("analyze", "Analyze things", json!({ "type": "object" }));
        assert_eq!(
            serde_json::to_value(&tool).unwrap(),
            json!({ "toolSpec": {
                "name": "analyze",
                "description": "Analyze things",
                "inputSchema": { "json": { "type": "object" } }
            } })
        );
    }

    #[test]
    fn test_tool_choice_serializes_auto() {
        assert_eq!(serde_json::to_value(ToolChoice::Auto).unwrap(), json!({ "auto": {} }));
        assert_eq!(ToolChoice::default(), ToolChoice::Auto);
    }

    #[test]
    fn test_request_omits_tool_config_when_absent() {
        let request = ConverseRequest {
            model_id: "m".to_string(),
            system: vec![SystemContent::Text("be brief".to_string())],
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["modelId"], "m");
        assert_eq!(value["system"], json!([{ "text": "be brief" }]));
        assert!(value.get("toolConfig").is_none());
        assert!(value.get("inferenceConfig").is_none());
    }

    #[test]
    fn test_request_with_tool_config() {
        let request = ConverseRequest {
            model_id: "m".to_string(),
            tool_config: Some(ToolConfig::auto(vec![Tool::new("t", "d", json!({}))])),
            inference_config: InferenceConfig {
                max_tokens: Some(512),
                temperature: None,
            },
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["toolConfig"]["toolChoice"], json!({ "auto": {} }));
        assert_eq!(value["toolConfig"]["tools"][0]["toolSpec"]["name"], "t");
        assert_eq!(value["inferenceConfig"], json!({ "maxTokens": 512 }));
    }

    #[test]
    fn test_message_round_trips_through_serde() {
        let msg = Message::assistant_tool_uses(
            "x",
            &[ToolCall {
                id: "1".to_string(),
                name: "n".to_string(),
                parameters: json!({}),
            }],
        );
        let back: Message = serde_json::from_value(serde_json::to_value(&msg).unwrap()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.tool_uses().count(), 1);
    }

    #[test]
    fn test_model_response_text_builder() {
        let response = ModelResponse::text("done");
        assert_eq!(response.content, "done");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert!(!response.has_tool_calls());
    }

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::NoApiKey.to_string(), "no API key configured");
        assert_eq!(
            ProviderError::Api {
                status: 400,
                message: "bad".to_string()
            }
            .to_string(),
            "provider rejected request (400): bad"
        );
        assert_eq!(ProviderError::RateLimited.to_string(), "rate limited by provider");
    }
}
