//! Data volume resolution and credential gating
//!
//! The data volume holds user home state mounted at `/mnt/agent-data`.
//! Resolution follows a strict precedence chain, and credential-bearing
//! mounts are gated on a sentinel file probed inside the volume.

use crate::config::ConfigStore;
use crate::engine::Engine;
use crate::errors::{CaiError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Default data volume name.
pub const DEFAULT_DATA_VOLUME: &str = "containai-data";

/// Environment override for the data volume.
pub const DATA_VOLUME_ENV: &str = "CONTAINAI_DATA_VOLUME";

/// Sentinel marking a volume as provisioned without secrets.
pub const NO_SECRETS_SENTINEL: &str = ".containai-no-secrets";

static VOLUME_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid volume regex"));

/// Validate an engine volume name.
///
/// Accepts `^[A-Za-z0-9][A-Za-z0-9._-]*$`, rejecting `.`/`..` and
/// anything containing `:`, `/`, or `~`.
pub fn is_valid_volume_name(name: &str) -> bool {
    if name == "." || name == ".." {
        return false;
    }
    if name.contains(':') || name.contains('/') || name.contains('~') {
        return false;
    }
    VOLUME_NAME_RE.is_match(name)
}

/// Resolve the data volume: flag, environment, workspace config, global
/// config, default, in that order. The winning value must validate.
pub fn resolve_data_volume(
    flag: Option<&str>,
    config: &ConfigStore,
    workspace: Option<&Path>,
) -> Result<String> {
    let (value, origin) = if let Some(v) = flag {
        (v.to_string(), "flag")
    } else if let Some(v) = std::env::var(DATA_VOLUME_ENV).ok().filter(|v| !v.is_empty()) {
        (v, "environment")
    } else if let Some(v) = workspace.and_then(|w| config.workspace_data_volume(w)) {
        (v, "workspace config")
    } else if let Some(v) = config.global_data_volume() {
        (v, "global config")
    } else {
        (DEFAULT_DATA_VOLUME.to_string(), "default")
    };

    if !is_valid_volume_name(&value) {
        return Err(CaiError::InvalidInput(format!(
            "invalid data volume name ({origin}): {value}"
        )));
    }
    debug!(volume = %value, origin, "data volume resolved");
    Ok(value)
}

/// Probe the no-secrets sentinel inside a volume.
///
/// Returns `true` when the sentinel exists, meaning the volume was
/// provisioned without secrets and is safe to mount without credential
/// concerns being violated.
pub async fn sentinel_present(engine: &dyn Engine, volume: &str) -> Result<bool> {
    let mount = format!("{volume}:/vol:ro");
    let sentinel = format!("/vol/{NO_SECRETS_SENTINEL}");
    let args: Vec<String> = [
        "run",
        "--rm",
        "-v",
        mount.as_str(),
        "alpine",
        "test",
        "-f",
        sentinel.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let out = engine.capture(&args).await?;
    Ok(out.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::FakeEngine;
    use crate::process::CaptureOutput;

    #[test]
    fn volume_name_truth_table() {
        for good in ["containai-data", "a", "A.b_c-9", "0vol"] {
            assert!(is_valid_volume_name(good), "{good}");
        }
        for bad in [
            "", ".", "..", "-leading", ".leading", "_leading", "a:b", "a/b", "~home", "white space",
        ] {
            assert!(!is_valid_volume_name(bad), "{bad}");
        }
    }

    #[tokio::test]
    async fn sentinel_probe_uses_readonly_throwaway_container() {
        let fake = FakeEngine::new();
        let present = sentinel_present(&fake, "containai-data").await.expect("probe");
        assert!(present);
        let calls = fake.calls();
        assert_eq!(
            calls[0],
            vec![
                "run",
                "--rm",
                "-v",
                "containai-data:/vol:ro",
                "alpine",
                "test",
                "-f",
                "/vol/.containai-no-secrets"
            ]
        );
    }

    #[tokio::test]
    async fn sentinel_absence_is_reported() {
        let fake = FakeEngine::new();
        fake.respond(
            "test -f",
            CaptureOutput {
                exit_code: 1,
                ..Default::default()
            },
        );
        let present = sentinel_present(&fake, "v").await.expect("probe");
        assert!(!present);
    }
}
