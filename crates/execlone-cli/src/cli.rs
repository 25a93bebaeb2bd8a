//! CLI argument definitions for execlone
//!
//! Uses clap for argument parsing.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// execlone - sealed in-memory clones of executables
///
/// Diagnostics for the memfd cloning primitive a container runtime uses to
/// keep its launcher binary out of reach of container processes.
#[derive(Parser, Debug)]
#[command(name = "execlone")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Silent mode - suppress everything except requested output
    #[arg(long, short = 's', global = true)]
    pub silent: bool,

    /// Enable verbose logging (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone a binary into a sealed memfd and verify the copy
    #[command(after_help = "EXAMPLES:
    # Verify the runtime binary can be cloned and sealed
    execlone check /usr/bin/runc

    # Machine-readable report
    execlone check --json /usr/local/bin/launcher
")]
    Check(CheckArgs),

    /// Show the seal state of a file
    #[command(after_help = "EXAMPLES:
    # Is a container's init running from a sealed clone?
    execlone inspect /proc/4242/exe

    # Check a descriptor of another process
    execlone inspect --json /proc/4242/fd/5
")]
    Inspect(InspectArgs),

    /// Report whether sealed memfds are supported on this system
    Support(SupportArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Binary to clone
    pub path: PathBuf,

    /// Output JSON instead of human-readable format
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// File to inspect
    pub path: PathBuf,

    /// Output JSON instead of human-readable format
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SupportArgs {
    /// Output JSON instead of human-readable format
    #[arg(long)]
    pub json: bool,
}
