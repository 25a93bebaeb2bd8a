//! execlone CLI - diagnostics for sealed executable clones
//!
//! This is the CLI binary that exercises the execlone library: it clones and
//! verifies binaries, inspects seal state, and checks platform support.

mod cli;
mod output;

use clap::Parser;
use cli::{CheckArgs, Cli, Commands, InspectArgs, SupportArgs};
use execlone::{CloneError, CloneReport, SealReport};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Errors surfaced by the CLI
#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Clone of {} failed verification", .0.display())]
    Unverified(PathBuf),

    #[error("Sealed memfds are not supported: {0}")]
    Unsupported(String),
}

type Result<T> = std::result::Result<T, CliError>;

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        error!("{}", e);
        eprintln!("execlone: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check(args) => {
            output::print_banner(cli.silent || args.json);
            run_check(args)
        }
        Commands::Inspect(args) => run_inspect(args),
        Commands::Support(args) => run_support(args),
    }
}

/// Clone a binary, then re-read both sides and compare
fn run_check(args: CheckArgs) -> Result<()> {
    let clone = execlone::clone_binary(&args.path)?;
    debug!("Clone available at {}", clone.path().display());

    let report = CloneReport::capture(&args.path, &clone)?;
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        output::print_clone_report(&report);
    }

    if !report.verified {
        return Err(CliError::Unverified(args.path));
    }
    Ok(())
}

/// Show the seal state of a path
fn run_inspect(args: InspectArgs) -> Result<()> {
    let report = SealReport::capture(&args.path)?;
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        output::print_seal_report(&report);
    }
    Ok(())
}

/// Check memfd sealing support
fn run_support(args: SupportArgs) -> Result<()> {
    let info = execlone::support_info();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        output::print_support(&info);
    }

    if !info.is_supported {
        return Err(CliError::Unsupported(info.details));
    }
    Ok(())
}
