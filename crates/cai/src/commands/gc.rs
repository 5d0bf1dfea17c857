//! GC subcommand

use crate::cli::GcArgs;
use anyhow::Result;
use containai_core::gc::{self, GcOptions};
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, args: GcArgs) -> Result<i32> {
    let (_runner, engine) = super::default_engine(cancel).await?;
    let opts = GcOptions {
        age: args.age,
        dry_run: args.dry_run,
        force: args.force,
        images: args.images,
    };
    Ok(gc::run_gc(&engine, &opts).await?)
}
