//! Setup subcommand

use anyhow::Result;
use containai_core::paths::Paths;
use containai_core::process::ProcessRunner;
use containai_core::setup::{self, SetupOptions};
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, dry_run: bool, skip_templates: bool) -> Result<i32> {
    let paths = Paths::from_env()?;
    let runner = ProcessRunner::new(cancel);
    let opts = SetupOptions {
        dry_run,
        skip_templates,
    };
    Ok(setup::run_setup(&runner, &paths, &opts).await?)
}
