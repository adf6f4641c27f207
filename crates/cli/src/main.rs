//! dockerboot CLI
//!
//! A command-line tool for inspecting the containers a dockerboot daemon
//! manages and for sending them start, stop and remove events.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{containers, health};

/// dockerboot CLI
#[derive(Parser)]
#[command(name = "dbctl")]
#[command(author, version, about = "CLI for the dockerboot container lifecycle daemon", long_about = None)]
pub struct Cli {
    /// Daemon API URL (can also be set via DBCTL_API_URL env var)
    #[arg(long, env = "DBCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List managed containers
    List,

    /// Show one managed container
    Status {
        /// Container key from the daemon configuration
        key: String,
    },

    /// Create and start a container, replacing any previous one
    Start {
        /// Container key from the daemon configuration
        key: String,
    },

    /// Stop a container
    Stop {
        /// Container key from the daemon configuration
        key: String,
    },

    /// Remove a stopped container
    Remove {
        /// Container key from the daemon configuration
        key: String,
    },

    /// Send an event to every managed container
    Broadcast {
        /// Action to broadcast
        action: BroadcastAction,
    },

    /// Show daemon health and readiness
    Health,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BroadcastAction {
    Start,
    Stop,
    Remove,
}

impl BroadcastAction {
    fn as_str(&self) -> &'static str {
        match self {
            BroadcastAction::Start => "START",
            BroadcastAction::Stop => "STOP",
            BroadcastAction::Remove => "REMOVE",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::List => {
            containers::list_containers(&client, cli.format).await?;
        }
        Commands::Status { key } => {
            containers::show_container(&client, &key, cli.format).await?;
        }
        Commands::Start { key } => {
            containers::send_event(&client, &key, "START", cli.format).await?;
        }
        Commands::Stop { key } => {
            containers::send_event(&client, &key, "STOP", cli.format).await?;
        }
        Commands::Remove { key } => {
            containers::send_event(&client, &key, "REMOVE", cli.format).await?;
        }
        Commands::Broadcast { action } => {
            containers::broadcast(&client, action.as_str(), cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
