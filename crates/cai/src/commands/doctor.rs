//! Doctor subcommand

use anyhow::Result;
use containai_core::doctor::{self, DoctorOptions};
use containai_core::paths::Paths;
use containai_core::process::ProcessRunner;
use tokio_util::sync::CancellationToken;

pub async fn execute(cancel: CancellationToken, json: bool, smoke: bool) -> Result<i32> {
    let paths = Paths::from_env()?;
    let runner = ProcessRunner::new(cancel);
    let opts = DoctorOptions { json, smoke };
    Ok(doctor::run_doctor(&runner, &paths, &opts).await?)
}
