//! Terraformer
//!
//! Runs terraform inside a pod for configuration, variables and state stored
//! in the cluster.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use terraformer_core::{Operation, TerraformerError};

mod commands;
mod logging;

use commands::run::{self, RunArgs};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Terraformer - run terraform against cluster-stored configuration
#[derive(Parser)]
#[command(name = "terraformer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Console log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "TERRAFORMER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Additionally write JSON logs to a daily rotating file in this directory
    #[arg(long, global = true, env = "TERRAFORMER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run terraform apply
    Apply(RunArgs),

    /// Run terraform destroy
    Destroy(RunArgs),

    /// Run terraform validate followed by terraform plan
    Validate(RunArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match logging::init(cli.verbose, cli.log_format, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Apply(args) => run::run(Operation::Apply, args).await,
        Commands::Destroy(args) => run::run(Operation::Destroy, args).await,
        Commands::Validate(args) => run::run(Operation::Validate, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            exit_code(&e)
        }
    }
}

/// Exit with the failing terraform command's status when there is one.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<TerraformerError>()
        .and_then(TerraformerError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}
