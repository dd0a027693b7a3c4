//! Command-line interface for the loopgate binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::LoopConfig;
use crate::error::LoopError;

/// Agentic chat loop with human approval for risky tools.
#[derive(Parser, Debug)]
#[command(name = "loopgate", version, about = "Tool-using chat loop with approval gating")]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true, env = "LOOPGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP/SSE API
    Serve(ServeArgs),
    /// Run one turn in the terminal, asking before risky tools run
    Chat(ChatArgs),
    /// Print the registered tools and their risk levels
    Tools(Overrides),
}

/// Values that override the loaded configuration.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Provider round-trips allowed per turn
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Root directory for file and shell tools
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,
}

impl Overrides {
    /// Apply the code layer on top of file and environment values.
    pub fn apply(&self, config: &mut LoopConfig) -> Result<(), LoopError> {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max) = self.max_iterations {
            if max == 0 {
                return Err(LoopError::Configuration(
                    "max_iterations must be at least 1".into(),
                ));
            }
            config.max_iterations = max;
        }
        if let Some(root) = &self.workspace_root {
            config.workspace_root = root.clone();
        }
        Ok(())
    }
}

/// Arguments for `loopgate serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Arguments for `loopgate chat`.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// User prompt (positional)
    pub prompt: Option<String>,
}
