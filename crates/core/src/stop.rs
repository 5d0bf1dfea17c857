//! Stop engine
//!
//! Resolves stop targets across every available engine context, with an
//! optional pre-stop export of the data volume. A named container found
//! in more than one context is an error, never a guess.

use crate::config::ConfigStore;
use crate::engine::{self, Engine};
use crate::errors::{CaiError, Result};
use crate::import::export_volume;
use crate::paths::Paths;
use crate::resolve;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stop options.
#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    pub all: bool,
    pub container: Option<String>,
    pub workspace: Option<PathBuf>,
    /// Export the target's data volume into this directory before stopping.
    pub export: Option<PathBuf>,
    pub remove: bool,
    pub force: bool,
}

/// Validate flag combinations.
///
/// `--container=` with a non-empty remainder is tolerated as-is; only
/// an empty value after the equals sign is rejected.
pub fn validate_stop_args(opts: &StopOptions, raw_container_flag: Option<&str>) -> Result<()> {
    if opts.all && opts.container.is_some() {
        return Err(CaiError::InvalidInput(
            "--all and --container are mutually exclusive".to_string(),
        ));
    }
    if opts.all && opts.export.is_some() {
        return Err(CaiError::InvalidInput(
            "--all and --export are mutually exclusive".to_string(),
        ));
    }
    if let Some(raw) = raw_container_flag {
        if raw == "--container=" {
            return Err(CaiError::InvalidInput(
                "--container requires a value".to_string(),
            ));
        }
    }
    Ok(())
}

/// A resolved `(context, container)` stop target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTarget {
    pub context: String,
    pub container: String,
}

/// A context name paired with an engine bound to it.
pub struct ContextEngine<'a> {
    pub name: String,
    pub engine: &'a dyn Engine,
}

/// Resolve the target set over all contexts.
pub async fn resolve_targets(
    contexts: &[ContextEngine<'_>],
    config: &ConfigStore,
    opts: &StopOptions,
    workspace: &Path,
) -> Result<Vec<StopTarget>> {
    if opts.all {
        let mut targets = Vec::new();
        for ctx in contexts {
            let ids =
                engine::ps_ids_with_label(ctx.engine, "containai.managed=true").await?;
            for id in ids {
                let name = engine::container_name(ctx.engine, &id).await?;
                targets.push(StopTarget {
                    context: ctx.name.clone(),
                    container: name,
                });
            }
        }
        return Ok(targets);
    }

    if let Some(name) = &opts.container {
        let mut holders = Vec::new();
        for ctx in contexts {
            if engine::container_exists(ctx.engine, name).await? {
                holders.push(ctx.name.clone());
            }
        }
        return match holders.as_slice() {
            [] => Err(CaiError::Environment(format!(
                "container not found in any context: {name}"
            ))),
            [ctx] => Ok(vec![StopTarget {
                context: ctx.clone(),
                container: name.clone(),
            }]),
            many => Err(CaiError::Environment(format!(
                "container {name} is ambiguous across contexts: {}",
                many.join(", ")
            ))),
        };
    }

    // Workspace-implicit resolution, context by context.
    let ws = opts.workspace.as_deref().unwrap_or(workspace);
    let mut targets = Vec::new();
    for ctx in contexts {
        if let Some(name) = resolve::resolve_container(ctx.engine, config, ws).await? {
            targets.push(StopTarget {
                context: ctx.name.clone(),
                container: name,
            });
        }
    }
    if targets.is_empty() {
        return Err(CaiError::Environment(format!(
            "no managed container found for workspace {}",
            ws.display()
        )));
    }
    Ok(targets)
}

/// Stop (and optionally remove) every target; returns the exit code.
pub async fn run_stop(
    contexts: &[ContextEngine<'_>],
    _paths: &Paths,
    config: &ConfigStore,
    opts: &StopOptions,
    workspace: &Path,
) -> Result<i32> {
    validate_stop_args(opts, None)?;
    let targets = resolve_targets(contexts, config, opts, workspace).await?;

    let mut failures = 0;
    for target in &targets {
        let Some(ctx) = contexts.iter().find(|c| c.name == target.context) else {
            continue;
        };

        if let Some(export_dir) = &opts.export {
            match pre_stop_export(ctx.engine, &target.container, export_dir).await {
                Ok(path) => debug!(target = %target.container, "exported to {}", path.display()),
                Err(e) => {
                    eprintln!(
                        "export failed for {}: {e}",
                        target.container
                    );
                    if !opts.force {
                        failures += 1;
                        continue;
                    }
                    warn!("continuing despite export failure (--force)");
                }
            }
        }

        let stop_args: Vec<String> = ["stop", target.container.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Err(e) = engine::capture_checked(ctx.engine, &stop_args).await {
            eprintln!("failed to stop {}: {e}", target.container);
            failures += 1;
            continue;
        }

        if opts.remove {
            let rm_args: Vec<String> = ["rm", "-f", target.container.as_str()]
                .iter()
                .map(|s| s.to_string())
                .collect();
            if let Err(e) = engine::capture_checked(ctx.engine, &rm_args).await {
                eprintln!("failed to remove {}: {e}", target.container);
                failures += 1;
            }
        }
    }

    Ok(if failures == 0 { 0 } else { 1 })
}

/// Export a target's data volume, identified by its label.
async fn pre_stop_export(eng: &dyn Engine, container: &str, dest: &Path) -> Result<PathBuf> {
    let labels = engine::container_labels(eng, container).await?;
    let volume = labels.get("containai.data-volume").ok_or_else(|| {
        CaiError::Environment(format!(
            "container {container} carries no containai.data-volume label"
        ))
    })?;
    export_volume(eng, volume, dest).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::FakeEngine;
    use crate::process::CaptureOutput;

    fn empty_config() -> ConfigStore {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::load_from(&tmp.path().join("config.toml")).expect("load");
        std::mem::forget(tmp);
        store
    }

    #[test]
    fn exclusivity_rules() {
        let opts = StopOptions {
            all: true,
            container: Some("x".to_string()),
            ..Default::default()
        };
        assert!(validate_stop_args(&opts, None).is_err());

        let opts = StopOptions {
            all: true,
            export: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        assert!(validate_stop_args(&opts, None).is_err());

        let opts = StopOptions::default();
        assert!(validate_stop_args(&opts, Some("--container=name")).is_ok());
        assert!(validate_stop_args(&opts, Some("--container=")).is_err());
    }

    #[tokio::test]
    async fn named_container_in_two_contexts_is_ambiguous() {
        let a = FakeEngine::new();
        let b = FakeEngine::new();
        let contexts = vec![
            ContextEngine {
                name: "containai-docker".to_string(),
                engine: &a,
            },
            ContextEngine {
                name: "default".to_string(),
                engine: &b,
            },
        ];
        let opts = StopOptions {
            container: Some("box".to_string()),
            ..Default::default()
        };
        let config = empty_config();
        let err = resolve_targets(&contexts, &config, &opts, Path::new("/w"))
            .await
            .expect_err("ambiguous");
        assert!(err.to_string().contains("ambiguous"));
    }

    #[tokio::test]
    async fn named_container_resolves_to_single_holder() {
        let a = FakeEngine::new();
        let b = FakeEngine::new();
        b.respond(
            "inspect --type container",
            CaptureOutput {
                exit_code: 1,
                ..Default::default()
            },
        );
        let contexts = vec![
            ContextEngine {
                name: "containai-docker".to_string(),
                engine: &a,
            },
            ContextEngine {
                name: "default".to_string(),
                engine: &b,
            },
        ];
        let opts = StopOptions {
            container: Some("box".to_string()),
            ..Default::default()
        };
        let config = empty_config();
        let targets = resolve_targets(&contexts, &config, &opts, Path::new("/w"))
            .await
            .expect("resolve");
        assert_eq!(
            targets,
            vec![StopTarget {
                context: "containai-docker".to_string(),
                container: "box".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn all_mode_collects_from_every_context() {
        let a = FakeEngine::new();
        a.respond(
            "ps -aq",
            CaptureOutput {
                exit_code: 0,
                stdout: "id1\n".to_string(),
                stderr: String::new(),
            },
        );
        a.respond(
            "{{.Name}}",
            CaptureOutput {
                exit_code: 0,
                stdout: "/box1\n".to_string(),
                stderr: String::new(),
            },
        );
        let b = FakeEngine::new();
        b.respond(
            "ps -aq",
            CaptureOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
        );
        let contexts = vec![
            ContextEngine {
                name: "containai-docker".to_string(),
                engine: &a,
            },
            ContextEngine {
                name: "default".to_string(),
                engine: &b,
            },
        ];
        let opts = StopOptions {
            all: true,
            ..Default::default()
        };
        let config = empty_config();
        let targets = resolve_targets(&contexts, &config, &opts, Path::new("/w"))
            .await
            .expect("resolve");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].container, "box1");
    }

    #[tokio::test]
    async fn stop_and_remove_issue_engine_commands() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = Paths::with_roots(tmp.path(), tmp.path().join(".config"));
        let a = FakeEngine::new();
        let contexts = vec![ContextEngine {
            name: "containai-docker".to_string(),
            engine: &a,
        }];
        let opts = StopOptions {
            container: Some("box".to_string()),
            remove: true,
            ..Default::default()
        };
        let config = empty_config();
        let code = run_stop(&contexts, &paths, &config, &opts, Path::new("/w"))
            .await
            .expect("stop");
        assert_eq!(code, 0);
        let calls = a.calls();
        assert!(calls.iter().any(|c| c == &vec!["stop", "box"]));
        assert!(calls.iter().any(|c| c == &vec!["rm", "-f", "box"]));
    }

    #[tokio::test]
    async fn export_failure_skips_stop_unless_forced() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = Paths::with_roots(tmp.path(), tmp.path().join(".config"));
        let a = FakeEngine::new();
        // No data-volume label: export fails.
        a.respond(
            "{{json .Config.Labels}}",
            CaptureOutput {
                exit_code: 0,
                stdout: "{}".to_string(),
                stderr: String::new(),
            },
        );
        let contexts = vec![ContextEngine {
            name: "containai-docker".to_string(),
            engine: &a,
        }];
        let opts = StopOptions {
            container: Some("box".to_string()),
            export: Some(tmp.path().join("out")),
            ..Default::default()
        };
        let config = empty_config();
        let code = run_stop(&contexts, &paths, &config, &opts, Path::new("/w"))
            .await
            .expect("stop");
        assert_eq!(code, 1);
        assert!(!a.calls().iter().any(|c| c.first().map(String::as_str) == Some("stop")));
    }
}
