//! Tool-call loop - core processing engine
//!
//! Sends the conversation to the model, runs any requested tools, feeds the
//! results back and repeats until the model answers without tool calls or the
//! round limit is hit.

use tracing::{debug, info};

use toolloop_provider::{
    parse_response, ConverseRequest, InferenceConfig, Message, ModelResponse, Provider,
    SystemContent, ToolCall, ToolConfig, ToolResultBlock,
};

use crate::tools::ToolRegistry;
use crate::{AgentError, Result};

pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Final state of a successful loop run
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The tool-call-free reply that ended the loop
    pub response: ModelResponse,
    /// Every message sent to the model in the last round
    pub messages: Vec<Message>,
    pub rounds: u32,
}

/// One loop run over borrowed session state
pub struct ToolLoop<'a, P: Provider + ?Sized> {
    provider: &'a P,
    tools: &'a ToolRegistry,
    model_id: &'a str,
    system_prompt: &'a str,
    inference: InferenceConfig,
    max_rounds: u32,
}

impl<'a, P: Provider + ?Sized> ToolLoop<'a, P> {
    pub fn new(
        provider: &'a P,
        tools: &'a ToolRegistry,
        model_id: &'a str,
        system_prompt: &'a str,
    ) -> Self {
        Self {
            provider,
            tools,
            model_id,
            system_prompt,
            inference: InferenceConfig::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Request for the current message list. `toolConfig` is sent only when
    /// at least one tool is registered.
    pub fn build_request(&self, messages: &[Message]) -> ConverseRequest {
        let system = if self.system_prompt.is_empty() {
            Vec::new()
        } else {
            vec![SystemContent::Text(self.system_prompt.to_string())]
        };

        let tool_config = if self.tools.is_empty() {
            None
        } else {
            Some(ToolConfig::auto(self.tools.definitions()))
        };

        ConverseRequest {
            model_id: self.model_id.to_string(),
            system,
            messages: messages.to_vec(),
            tool_config,
            inference_config: self.inference.clone(),
        }
    }

    /// Drive the conversation to a final answer
    pub async fn run(&self, mut messages: Vec<Message>) -> Result<LoopOutcome> {
        for round in 1..=self.max_rounds {
            debug!("tool loop round {}/{}", round, self.max_rounds);

            let payload = self
                .provider
                .converse(self.build_request(&messages))
                .await?;
            let response = parse_response(&payload)?;

            debug!(
                "round {}: stop_reason={}, {} tool call(s), {} tokens",
                round,
                response.stop_reason.as_str(),
                response.tool_calls.len(),
                response.usage.total_tokens
            );

            if !response.has_tool_calls() {
                return Ok(LoopOutcome {
                    response,
                    messages,
                    rounds: round,
                });
            }

            let results = self.execute_tool_calls(&response.tool_calls).await;
            messages.push(Message::assistant_tool_uses(
                &response.content,
                &response.tool_calls,
            ));
            messages.push(Message::tool_results(results));
        }

        info!("giving up after {} tool rounds", self.max_rounds);
        Err(AgentError::RoundLimitExceeded(self.max_rounds))
    }

    /// Run calls one at a time in the order the model listed them
    async fn execute_tool_calls(&self, calls: &[ToolCall]) -> Vec<ToolResultBlock> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.tools.dispatch(call).await);
        }
        results
    }
}
