//! CLI command definitions for the `volpina` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod message;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat message store with per-conversation retention.
#[derive(Parser)]
#[command(name = "volpina", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Port to listen on (overrides config and PORT).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config).
        #[arg(long)]
        host: Option<String>,
    },

    /// Inspect and maintain stored messages.
    #[command(alias = "msg")]
    Messages {
        #[command(subcommand)]
        action: message::MessageCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Map `-v`/`--quiet` to the fallback log filter used when RUST_LOG is unset.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,volpina=debug",
        _ => "trace",
    }
}
