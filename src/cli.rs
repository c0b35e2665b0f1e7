//! CLI argument parsing with subcommand architecture.

use clap::{Parser, Subcommand};
use ferrule_core::env::Environment;

#[derive(Parser)]
#[command(name = "ferrule", version, about = "HTTP service with a managed request lifecycle")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the server (default when no subcommand is given)
    Run(RunArgs),
    /// Load and validate the config file, then print the effective settings
    Check(RunArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml", env = "FERRULE_CONFIG")]
    pub config: String,

    /// Listen host
    #[arg(long, env = "FERRULE_HOST")]
    pub host: Option<String>,

    /// Listen port
    #[arg(long, env = "FERRULE_PORT")]
    pub port: Option<u16>,

    /// Deployment environment: dev, fat, uat or pro
    #[arg(long, env = "FERRULE_ENV")]
    pub env: Option<Environment>,

    /// Log level (overrides config)
    #[arg(long, env = "FERRULE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Graceful shutdown timeout in seconds (overrides config)
    #[arg(long)]
    pub shutdown_timeout: Option<u64>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: "config.yaml".to_string(),
            host: None,
            port: None,
            env: None,
            log_level: None,
            shutdown_timeout: None,
        }
    }
}
