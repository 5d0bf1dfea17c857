//! Stop subcommand

use crate::cli::StopArgs;
use anyhow::Result;
use containai_core::config::ConfigStore;
use containai_core::context;
use containai_core::engine::{CliEngine, Engine};
use containai_core::paths::Paths;
use containai_core::process::ProcessRunner;
use containai_core::stop::{self, ContextEngine, StopOptions};
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, args: StopArgs) -> Result<i32> {
    let paths = Paths::from_env()?;
    let runner = ProcessRunner::new(cancel);

    let names = context::enumerate_contexts(&runner, "docker").await?;
    let engines: Vec<(String, CliEngine)> = names
        .iter()
        .map(|name| {
            (
                name.clone(),
                CliEngine::with_context(runner.clone(), name.clone()),
            )
        })
        .collect();
    let contexts: Vec<ContextEngine> = engines
        .iter()
        .map(|(name, engine)| ContextEngine {
            name: name.clone(),
            engine: engine as &dyn Engine,
        })
        .collect();

    let workspace = std::env::current_dir()?;
    let config = ConfigStore::discover(&workspace, &paths)?;
    let opts = StopOptions {
        all: args.all,
        container: args.container,
        workspace: args.workspace,
        export: args.export,
        remove: args.remove,
        force: args.force,
    };
    Ok(stop::run_stop(&contexts, &paths, &config, &opts, &workspace).await?)
}
