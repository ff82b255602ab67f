//! toolloop - tool-augmented conversations from the terminal

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{chat_command, init_command, status_command, ChatArgs};

/// toolloop - chat with a model that can call tools
#[derive(Parser)]
#[command(name = "toolloop")]
#[command(about = "◆ Tool-augmented conversations with a Converse-style model")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and storage root
    Init,
    /// Show configuration status
    Status,
    /// Chat with the model
    Chat {
        /// Single prompt to send; interactive mode when omitted
        #[arg(short, long)]
        message: Option<String>,
        /// Send each prompt without prior turns
        #[arg(long)]
        no_history: bool,
        /// Override the base system prompt
        #[arg(long)]
        system_prompt: Option<String>,
        /// Override the model id
        #[arg(long)]
        model: Option<String>,
        /// Reference documentation directory (repeatable)
        #[arg(long = "doc-dir")]
        doc_dirs: Vec<String>,
        /// Maximum tool rounds per prompt
        #[arg(long)]
        max_rounds: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Status => status_command().await,
        Commands::Chat {
            message,
            no_history,
            system_prompt,
            model,
            doc_dirs,
            max_rounds,
        } => {
            chat_command(ChatArgs {
                message,
                no_history,
                system_prompt,
                model,
                doc_dirs,
                max_rounds,
            })
            .await
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
