//! Command implementations
//!
//! Thin wrappers wiring CLI arguments to the core engines.

pub mod config;
pub mod docker;
pub mod doctor;
pub mod gc;
pub mod import;
pub mod setup;
pub mod ssh;
pub mod status;
pub mod stop;
pub mod template;

use containai_core::context;
use containai_core::engine::CliEngine;
use containai_core::errors::Result;
use containai_core::process::ProcessRunner;
use tokio_util::sync::CancellationToken;

/// Build the engine for single-context commands: bound to the managed
/// context when one exists, else the engine's own default.
pub(crate) async fn default_engine(cancel: CancellationToken) -> Result<(ProcessRunner, CliEngine)> {
    let runner = ProcessRunner::new(cancel);
    let engine = match context::resolve_managed_context(&runner, "docker").await? {
        Some(ctx) => CliEngine::with_context(runner.clone(), ctx),
        None => CliEngine::new(runner.clone()),
    };
    Ok((runner, engine))
}
