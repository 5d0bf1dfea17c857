//! Status subcommand

use crate::cli::StatusArgs;
use anyhow::Result;
use containai_core::config::ConfigStore;
use containai_core::paths::Paths;
use containai_core::status::{self, StatusOptions};
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, args: StatusArgs) -> Result<i32> {
    let paths = Paths::from_env()?;
    let (_runner, engine) = super::default_engine(cancel).await?;

    let cwd = std::env::current_dir()?;
    let config = ConfigStore::discover(args.workspace.as_deref().unwrap_or(&cwd), &paths)?;
    let opts = StatusOptions {
        workspace: args.workspace,
        container: args.container,
        json: args.json,
    };
    Ok(status::run_status(&engine, &config, &cwd, &opts).await?)
}
