//! Tool set and dispatch

pub mod services;
pub mod storage;

pub use services::{DisputeTool, PolicyTool};
pub use storage::{LocalObjectStore, ObjectStore, StorageClient, StorageTool};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use toolloop_config::Config;
use toolloop_provider::{Tool, ToolCall, ToolResultBlock, ToolResultStatus};

/// Unexpected tool failures. Expected domain errors are `ToolOutput::error`.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result of one tool invocation.
///
/// `status` is what the model sees; error outputs carry `{"error": message}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub status: ToolResultStatus,
    pub content: Value,
}

impl ToolOutput {
    pub fn success(content: Value) -> Self {
        Self {
            status: ToolResultStatus::Success,
            content,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolResultStatus::Error,
            content: json!({ "error": message.into() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolResultStatus::Error
    }

    /// Text sent back to the model
    pub fn render(&self) -> String {
        render_content(&self.content)
    }
}

/// Objects and arrays become compact JSON, strings pass through verbatim,
/// everything else uses its JSON literal form.
pub fn render_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Object(_) | Value::Array(_) => content.to_string(),
        other => other.to_string(),
    }
}

/// A capability the model may invoke
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError>;
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

type ToolFn = dyn Fn(Value) -> Result<ToolOutput, ToolError> + Send + Sync;

/// Tool backed by a plain function, for pluggable capabilities
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl ToolTrait for FnTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn parameters(&self) -> Value {
        self.parameters.clone()
    }
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        (self.func)(args)
    }
}

/// Tools owned by one session, kept in registration order
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolTrait>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool; an existing tool with the same name is replaced in place
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn ToolTrait>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => {
                debug!("replacing tool {}", tool.name());
                *slot = tool;
            }
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolTrait> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| to_provider_tool(t.as_ref()))
            .collect()
    }

    /// Run one tool call and turn the outcome into a tool result.
    ///
    /// Never fails: unknown tools and tool errors become error results so the
    /// model can adapt on the next round.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResultBlock {
        let Some(tool) = self.get(&call.name) else {
            warn!("model requested unknown tool: {}", call.name);
            return ToolResultBlock::text(
                &call.id,
                format!("Unknown tool: {}", call.name),
                ToolResultStatus::Error,
            );
        };

        debug!("executing tool {} ({})", call.name, call.id);

        match tool.execute(call.parameters.clone()).await {
            Ok(output) => {
                if output.is_error() {
                    debug!("tool {} reported an error", call.name);
                }
                ToolResultBlock::text(&call.id, output.render(), output.status)
            }
            Err(e) => {
                warn!("tool {} failed: {}", call.name, e);
                ToolResultBlock::text(&call.id, e.to_string(), ToolResultStatus::Error)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the storage tool plus every REST lookup tool the config enables
pub fn register_default_tools(registry: &mut ToolRegistry, config: &Config) {
    let store = LocalObjectStore::new(config.storage_root());
    let client = StorageClient::new(Arc::new(store))
        .with_presign_expiration(config.storage.default_presign_expiration);
    registry.register(StorageTool::new(client));

    if let Some(api_key) = config.dispute_api_key() {
        registry.register(DisputeTool::new(
            api_key,
            Some(config.services.dispute.base_url.clone()),
        ));
    }

    if config.policy_enabled() {
        let policy = &config.services.policy;
        registry.register(PolicyTool::new(
            policy.api_key.clone(),
            policy.base_url.clone(),
            policy.space.clone(),
        ));
    }
}
