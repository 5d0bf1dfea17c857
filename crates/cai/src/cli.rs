//! CLI definition and dispatch
//!
//! Subcommand router for the `cai` binary. Every command returns a
//! process exit code; engine exit codes propagate unchanged.

use crate::commands;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "cai",
    version,
    about = "ContainAI: hardened devcontainer sandboxes over docker",
    long_about = "ContainAI wraps the docker CLI so devcontainer workflows run inside a \
hardened sandbox runtime with per-workspace data volumes and SSH access over loopback ports."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Proxy a docker invocation, rewriting managed devcontainer creates
    Docker {
        /// Raw argument vector handed to the engine
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Materialize host state into the data volume
    Import(ImportArgs),
    /// Prune old managed containers and images
    Gc(GcArgs),
    /// Stop managed containers across contexts
    Stop(StopArgs),
    /// Read or edit configuration keys
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// SSH client configuration maintenance
    Ssh {
        #[command(subcommand)]
        action: SshAction,
    },
    /// Template maintenance
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Diagnose the installation
    Doctor {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
        /// Build each installed template as a smoke test
        #[arg(long)]
        smoke: bool,
    },
    /// First-run bootstrap
    Setup {
        /// Enumerate actions without performing them
        #[arg(long)]
        dry_run: bool,
        /// Skip template installation
        #[arg(long)]
        skip_templates: bool,
    },
    /// Show one container's status
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Source directory or .tgz archive (defaults to the home directory)
    #[arg(long)]
    pub from: Option<String>,
    /// Data volume, overriding the resolution chain
    #[arg(long)]
    pub volume: Option<String>,
    /// Explicit config file, overriding discovery
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Workspace path (defaults to the current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
    #[arg(long)]
    pub dry_run: bool,
    /// Disable the *.priv.* exclusion filter
    #[arg(long)]
    pub no_excludes: bool,
    /// Skip secret-flagged entries entirely
    #[arg(long)]
    pub no_secrets: bool,
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct GcArgs {
    /// Minimum age before pruning, as <int>d or <int>h
    #[arg(long, default_value = containai_core::gc::DEFAULT_AGE)]
    pub age: String,
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long)]
    pub force: bool,
    /// Also prune ContainAI images (requires --force or --dry-run)
    #[arg(long)]
    pub images: bool,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Stop every managed container in every context
    #[arg(long)]
    pub all: bool,
    /// Stop a specific container by name
    #[arg(long)]
    pub container: Option<String>,
    /// Workspace whose container should stop (defaults to the current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
    /// Export the data volume into this directory before stopping
    #[arg(long)]
    pub export: Option<PathBuf>,
    /// Remove containers after stopping
    #[arg(long)]
    pub remove: bool,
    #[arg(long)]
    pub force: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print a key's value
    Get {
        key: String,
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// Write a key
    Set {
        key: String,
        value: String,
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// Delete a key
    Unset {
        key: String,
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SshAction {
    /// Remove include fragments whose container no longer exists
    Cleanup {
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TemplateAction {
    /// Rewrite a template Dockerfile to the ARG BASE_IMAGE pattern
    Upgrade {
        /// Template directory or Dockerfile path
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Workspace whose container to inspect (defaults to the current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
    /// Inspect a specific container by name
    #[arg(long)]
    pub container: Option<String>,
    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Dispatch the parsed CLI to its command; returns the exit code.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<i32> {
    match cli.command {
        Commands::Docker { args } => commands::docker::execute(cancel, args).await,
        Commands::Import(args) => commands::import::execute(cancel, args).await,
        Commands::Gc(args) => commands::gc::execute(cancel, args).await,
        Commands::Stop(args) => commands::stop::execute(cancel, args).await,
        Commands::Config { action } => commands::config::execute(action).await,
        Commands::Ssh { action } => commands::ssh::execute(cancel, action).await,
        Commands::Template { action } => commands::template::execute(action).await,
        Commands::Doctor { json, smoke } => commands::doctor::execute(cancel, json, smoke).await,
        Commands::Setup {
            dry_run,
            skip_templates,
        } => commands::setup::execute(cancel, dry_run, skip_templates).await,
        Commands::Status(args) => commands::status::execute(cancel, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn docker_subcommand_accepts_hyphen_args() {
        let cli = Cli::parse_from(["cai", "docker", "--label", "k=v", "run", "img"]);
        match cli.command {
            Commands::Docker { args } => {
                assert_eq!(args, vec!["--label", "k=v", "run", "img"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn gc_defaults_to_thirty_days() {
        let cli = Cli::parse_from(["cai", "gc", "--dry-run"]);
        match cli.command {
            Commands::Gc(args) => {
                assert_eq!(args.age, "30d");
                assert!(args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
