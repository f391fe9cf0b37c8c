use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "dispatch-ai",
    about = "Chat-driven workspace automation assistant"
)]
pub struct Cli {
    /// TOML config file; built-in defaults when omitted.
    #[arg(long, env = "DISPATCH_AI_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[arg(long, default_value = "console")]
    pub conversation: String,

    #[arg(long, default_value = "local-user")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Interactive session on the console (default).
    Chat,
    /// Handle a single message and print the reply.
    Ask {
        #[arg(long, short)]
        message: String,
        /// Command label used by the repeated-failure guard.
        #[arg(long, default_value = "ask")]
        command_id: String,
    },
    /// Load and validate the configuration, then print a summary.
    CheckConfig,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
