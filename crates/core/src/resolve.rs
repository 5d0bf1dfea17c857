//! Workspace to container resolution
//!
//! Maps a workspace path to its managed container, preferring an
//! explicit `container_name` from configuration and falling back to the
//! `containai.workspace` label. Ambiguity is never guessed.

use crate::config::ConfigStore;
use crate::engine::{self, Engine};
use crate::errors::Result;
use std::path::Path;
use tracing::debug;

/// Label binding a container to a workspace path.
pub const WORKSPACE_PATH_LABEL: &str = "containai.workspace";

/// Resolve the managed container for a workspace.
///
/// Returns `None` when no container matches, or when more than one does
/// (after emitting an error line).
pub async fn resolve_container(
    eng: &dyn Engine,
    config: &ConfigStore,
    workspace: &Path,
) -> Result<Option<String>> {
    if let Some(name) = config.workspace_container_name(workspace) {
        if engine::container_exists(eng, &name).await? {
            debug!(container = %name, "resolved via configured container_name");
            return Ok(Some(name));
        }
        debug!(container = %name, "configured container_name does not inspect; falling back");
    }

    let label = format!("{WORKSPACE_PATH_LABEL}={}", workspace.display());
    let ids = engine::ps_ids_with_label(eng, &label).await?;
    match ids.as_slice() {
        [] => Ok(None),
        [id] => {
            let name = engine::container_name(eng, id).await?;
            debug!(container = %name, "resolved via workspace label");
            Ok(Some(name))
        }
        many => {
            eprintln!(
                "Multiple containers match workspace {}: {}",
                workspace.display(),
                many.join(", ")
            );
            Ok(None)
        }
    }
}
