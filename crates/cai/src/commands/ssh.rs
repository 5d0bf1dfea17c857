//! SSH maintenance subcommand

use crate::cli::SshAction;
use anyhow::Result;
use containai_core::paths::Paths;
use containai_core::ssh::SshConfigManager;
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, action: SshAction) -> Result<i32> {
    let paths = Paths::from_env()?;
    match action {
        SshAction::Cleanup { dry_run } => {
            let (_runner, engine) = super::default_engine(cancel).await?;
            let removed = SshConfigManager::new(&paths).cleanup(&engine, dry_run).await?;
            if !dry_run {
                println!("Removed {} stale fragment(s)", removed.len());
            }
            Ok(0)
        }
    }
}
