//! The docker proxy subcommand

use anyhow::Result;
use containai_core::context;
use containai_core::engine::{CliEngine, Engine};
use containai_core::paths::Paths;
use containai_core::process::ProcessRunner;
use containai_core::proxy::{self, ProxyDeps};
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, args: Vec<String>) -> Result<i32> {
    let paths = Paths::from_env()?;
    let runner = ProcessRunner::new(cancel);

    let managed_name = context::resolve_managed_context(&runner, "docker").await?;
    let raw = CliEngine::new(runner.clone());
    let managed = managed_name.map(|ctx| CliEngine::with_context(runner.clone(), ctx));

    let deps = ProxyDeps {
        paths: &paths,
        raw: &raw,
        managed: managed.as_ref().map(|e| e as &dyn Engine),
    };
    Ok(proxy::run_proxy(&deps, args).await?)
}
