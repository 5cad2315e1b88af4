//! CLI command definitions for the `sentinel` binary.
//!
//! Uses clap derive macros for argument parsing. Workflow operations live
//! under `sentinel workflow <verb>`.

pub mod workflow;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use workflow::WorkflowCommand;

/// Run dependency-ordered workflows with retries and checkpointing.
#[derive(Parser)]
#[command(name = "sentinel", version, about, long_about = None)]
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

    /// Emit log events as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to `[server] port`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to `[server] host`).
        #[arg(long)]
        host: Option<String>,
    },

    /// Manage workflow definitions and executions.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Default log filter derived from `-v` / `--quiet`.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,sentinel_core=debug,sentinel_api=debug",
            _ => "trace",
        }
    }
}
