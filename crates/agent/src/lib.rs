//! Tool-augmented conversation agent
//!
//! A [`ConversationSession`] owns a provider, a [`ToolRegistry`] and the
//! conversation history; each `invoke` runs the [`ToolLoop`] until the model
//! answers without requesting tools.

use thiserror::Error;

use toolloop_provider::ProviderError;

pub mod context;
pub mod loop_agent;
pub mod session;
pub mod tools;

pub use context::{ContextBuilder, DEFAULT_SYSTEM_PROMPT};
pub use loop_agent::{LoopOutcome, ToolLoop, DEFAULT_MAX_ROUNDS};
pub use session::{ConversationSession, InvokeOptions};
pub use tools::{FnTool, ToolError, ToolOutput, ToolRegistry, ToolTrait};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Exceeded maximum tool rounds ({0})")]
    RoundLimitExceeded(u32),
}

pub type Result<T> = std::result::Result<T, AgentError>;
