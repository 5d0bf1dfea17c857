//! Import subcommand

use crate::cli::ImportArgs;
use anyhow::Result;
use containai_core::import::{self, ImportOptions};
use containai_core::paths::Paths;
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, args: ImportArgs) -> Result<i32> {
    let paths = Paths::from_env()?;
    let (_runner, engine) = super::default_engine(cancel).await?;

    let workspace = match args.workspace {
        Some(ws) => ws,
        None => std::env::current_dir()?,
    };
    let opts = ImportOptions {
        from: args.from,
        volume: args.volume,
        config_path: args.config,
        dry_run: args.dry_run,
        no_excludes: args.no_excludes,
        no_secrets: args.no_secrets,
        verbose: args.verbose,
    };
    import::run_import(&engine, &paths, &workspace, &opts).await?;
    Ok(0)
}
