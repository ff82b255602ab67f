//! Conversational session: provider, tool set and history for one conversation

use tracing::{debug, info, warn};

use toolloop_config::{expand_home, Config};
use toolloop_provider::{InferenceConfig, Message, ModelResponse, Provider};

use crate::context::ContextBuilder;
use crate::loop_agent::{ToolLoop, DEFAULT_MAX_ROUNDS};
use crate::tools::{self, ToolRegistry, ToolTrait};
use crate::Result;

/// Per-call overrides for [`ConversationSession::invoke_with`]
#[derive(Debug, Clone, Copy)]
pub struct InvokeOptions {
    pub include_history: bool,
    pub max_rounds: Option<u32>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            include_history: true,
            max_rounds: None,
        }
    }
}

/// One logical conversation.
///
/// Owns its tools and history. `invoke` takes `&mut self`, so a session is
/// driven by one caller at a time.
pub struct ConversationSession<P: Provider> {
    provider: P,
    model_id: String,
    system_prompt: String,
    tools: ToolRegistry,
    history: Vec<Message>,
    max_rounds: u32,
    inference: InferenceConfig,
}

impl<P: Provider> ConversationSession<P> {
    /// An empty model id falls back to the provider's default model
    pub fn new(provider: P, model_id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let mut model_id = model_id.into();
        if model_id.is_empty() {
            model_id = provider.default_model();
        }

        Self {
            provider,
            model_id,
            system_prompt: system_prompt.into(),
            tools: ToolRegistry::new(),
            history: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            inference: InferenceConfig::default(),
        }
    }

    /// Session wired from config: prompt with reference docs, default tools,
    /// round limit and inference settings
    pub async fn from_config(provider: P, config: &Config) -> Self {
        if !provider.is_configured() {
            warn!("provider has no API key; model requests will be rejected");
        }

        let system_prompt = ContextBuilder::new()
            .with_prompt(config.agent.system_prompt.clone())
            .with_doc_dirs(config.agent.doc_dirs.iter().map(|d| expand_home(d)))
            .build_system_prompt()
            .await;

        let mut session = Self::new(provider, config.model_id(), system_prompt)
            .with_max_rounds(config.agent.max_tool_rounds)
            .with_inference(InferenceConfig {
                max_tokens: Some(config.provider.max_tokens),
                temperature: config.provider.temperature,
            });
        tools::register_default_tools(&mut session.tools, config);

        info!(
            "session ready: model={}, tools={:?}",
            session.model_id,
            session.tools.names()
        );
        session
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    /// Add a tool; a tool with the same name is replaced
    pub fn register_tool<T: ToolTrait + 'static>(&mut self, tool: T) {
        self.tools.register(tool);
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub async fn invoke(&mut self, prompt: &str, include_history: bool) -> Result<ModelResponse> {
        self.invoke_with(
            prompt,
            InvokeOptions {
                include_history,
                max_rounds: None,
            },
        )
        .await
    }

    /// Send `prompt` and run tools until the model gives a final answer.
    ///
    /// With history enabled the conversation so far is sent along, and on
    /// success the stored history becomes everything sent plus the final
    /// answer. Failed calls leave the history untouched.
    pub async fn invoke_with(
        &mut self,
        prompt: &str,
        options: InvokeOptions,
    ) -> Result<ModelResponse> {
        let mut messages = if options.include_history {
            self.history.clone()
        } else {
            Vec::new()
        };
        messages.push(Message::user(prompt));

        let outcome = ToolLoop::new(
            &self.provider,
            &self.tools,
            &self.model_id,
            &self.system_prompt,
        )
        .with_inference(self.inference.clone())
        .with_max_rounds(options.max_rounds.unwrap_or(self.max_rounds))
        .run(messages)
        .await?;

        debug!("invoke finished after {} round(s)", outcome.rounds);

        if options.include_history {
            let mut history = outcome.messages;
            history.push(Message::assistant(outcome.response.content.clone()));
            self.history = history;
        }

        Ok(outcome.response)
    }
}
