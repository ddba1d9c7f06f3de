//! CLI module for Edgewatch
//!
//! Command-line interface definitions and handlers for the relay.
//!
//! # Commands
//!
//! - `serve` - Start the relay server
//! - `devices` - List active devices on a running relay
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Start server with default config
//! edgewatch serve
//!
//! # Show streaming devices only
//! edgewatch devices --status streaming
//!
//! # Generate shell completions
//! edgewatch completions bash > ~/.bash_completion.d/edgewatch
//! ```

pub mod completions;
pub mod config;
pub mod devices;
pub mod output;
pub mod serve;

pub use completions::handle_completions;
pub use config::handle_config_init;
pub use devices::handle_devices;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Edgewatch - live frame relay for road hazard sensing units
#[derive(Parser, Debug)]
#[command(
    name = "edgewatch",
    version,
    about = "Real-time frame relay and device sessions for edge-AI sensing units"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the relay server
    Serve(ServeArgs),
    /// List active devices on a running relay
    Devices(DevicesArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "edgewatch.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "EDGEWATCH_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "EDGEWATCH_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "EDGEWATCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override the liveness window in seconds
    #[arg(short = 'w', long)]
    pub liveness_window: Option<u64>,

    /// Disable detection persistence
    #[arg(long)]
    pub no_persistence: bool,

    /// Disable the background liveness sweep
    #[arg(long)]
    pub no_sweep: bool,
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Filter by status (streaming, idle, offline)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Base URL of the running relay
    #[arg(short, long, default_value = "http://localhost:5000", env = "EDGEWATCH_URL")]
    pub url: String,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "edgewatch.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
