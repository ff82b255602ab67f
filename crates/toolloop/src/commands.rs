//! toolloop command implementations

use anyhow::{Context, Result};
use std::io::Write;
use tracing::{debug, info};

use toolloop_agent::{ConversationSession, InvokeOptions};
use toolloop_config::{self, Config};
use toolloop_provider::converse::ConverseProvider;

/// Options for the chat command
#[derive(Debug, Default)]
pub struct ChatArgs {
    pub message: Option<String>,
    pub no_history: bool,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub doc_dirs: Vec<String>,
    pub max_rounds: Option<u32>,
}

impl ChatArgs {
    /// Fold command-line overrides into the loaded config
    fn apply(&self, config: &mut Config) {
        if let Some(prompt) = &self.system_prompt {
            config.agent.system_prompt = Some(prompt.clone());
        }
        if let Some(model) = &self.model {
            config.provider.model_id = model.clone();
        }
        if !self.doc_dirs.is_empty() {
            config.agent.doc_dirs = self.doc_dirs.clone();
        }
        if let Some(rounds) = self.max_rounds {
            config.agent.max_tool_rounds = rounds;
        }
        if self.no_history {
            config.agent.include_history = false;
        }
    }
}

/// Initialize config and storage root
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing toolloop...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = toolloop_config::init().await?;

    println!("Config:  {}", toolloop_config::config_path().display());
    println!("Buckets: {}", config.storage_root().display());
    println!("\n◆ toolloop initialized");
    println!("\nNext steps:");
    println!(
        "  1. Add your API key to {} or set {}",
        toolloop_config::config_path().display(),
        toolloop_config::API_KEY_ENV
    );
    println!("  2. Start chatting: toolloop chat -m \"What buckets are there?\"");

    Ok(())
}

fn marker(ok: bool, yes: &'static str, no: &'static str) -> &'static str {
    if ok {
        yes
    } else {
        no
    }
}

/// Show configuration status
pub async fn status_command() -> Result<()> {
    let config_path = toolloop_config::config_path();

    println!("◆ toolloop Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config:    {} {}",
        config_path.display(),
        marker(config_path.exists(), "[OK]", "[Missing]")
    );

    let config = Config::load().await?;
    let storage_root = config.storage_root();

    println!("Model:     {}", config.model_id());
    println!(
        "API Key:   {}",
        marker(config.has_api_key(), "[Set]", "[Missing]")
    );
    println!(
        "Buckets:   {} {}",
        storage_root.display(),
        marker(storage_root.exists(), "[OK]", "[Missing]")
    );
    println!(
        "Disputes:  {}",
        marker(config.dispute_api_key().is_some(), "[Enabled]", "[Disabled]")
    );
    println!(
        "Policies:  {}",
        marker(config.policy_enabled(), "[Enabled]", "[Disabled]")
    );
    println!("Max tool rounds: {}", config.agent.max_tool_rounds);

    Ok(())
}

/// Chat with the model, once or interactively
pub async fn chat_command(args: ChatArgs) -> Result<()> {
    let mut config = Config::load().await?;
    args.apply(&mut config);

    let api_key = config.api_key().with_context(|| {
        format!(
            "No API key configured. Set one in {} or {}",
            toolloop_config::config_path().display(),
            toolloop_config::API_KEY_ENV
        )
    })?;

    let provider = ConverseProvider::new(
        api_key,
        Some(config.provider.region.clone()),
        config.provider.endpoint.clone(),
        Some(config.model_id()),
    );
    debug!("converse endpoint: {}", provider.endpoint());

    let mut session = ConversationSession::from_config(provider, &config).await;
    let options = InvokeOptions {
        include_history: config.agent.include_history,
        max_rounds: None,
    };

    if let Some(message) = args.message {
        let response = session.invoke_with(&message, options).await?;
        println!("{}", response.content);
        return Ok(());
    }

    println!("◆ Interactive mode (type 'exit' to quit)");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    loop {
        print!("Prompt> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match session.invoke_with(input, options).await {
            Ok(response) => println!("\n{}\n", response.content),
            Err(e) => println!("\nError: {}\n", e),
        }
    }

    info!("chat ended after {} messages", session.history().len());
    Ok(())
}
