//! Template subcommand

use crate::cli::TemplateAction;
use anyhow::Result;
use containai_core::template;
use std::path::PathBuf;

pub async fn execute(action: TemplateAction) -> Result<i32> {
    match action {
        TemplateAction::Upgrade { path } => {
            let dockerfile: PathBuf = if path.is_dir() {
                path.join("Dockerfile")
            } else {
                path
            };
            if template::upgrade_dockerfile_file(&dockerfile)? {
                println!("Upgraded {}", dockerfile.display());
            } else {
                println!("No template changes required.");
            }
            Ok(0)
        }
    }
}
