//! Container engine client adapter
//!
//! Wraps the `docker` CLI. The [`Engine`] trait is the seam every higher
//! engine composes against; tests substitute recording fakes, production
//! uses [`CliEngine`] which injects `--context <managed>` ahead of the
//! caller's argument vector.

use crate::errors::{CaiError, Result};
use crate::process::{CaptureOutput, ProcessRunner};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Engine client seam.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run an engine command, capturing output.
    async fn capture(&self, args: &[String]) -> Result<CaptureOutput>;

    /// Run an engine command with `stdin` fed to the child.
    async fn capture_with_stdin(&self, args: &[String], stdin: &str) -> Result<CaptureOutput>;

    /// Run an engine command with inherited stdio.
    async fn interactive(&self, args: &[String]) -> Result<i32>;

    /// The context this client is bound to, if any.
    fn context(&self) -> Option<&str>;
}

/// CLI-backed engine client.
#[derive(Debug, Clone)]
pub struct CliEngine {
    docker_path: String,
    context: Option<String>,
    runner: ProcessRunner,
}

impl CliEngine {
    /// Client without a bound context; argv vectors pass through as-is.
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            docker_path: "docker".to_string(),
            context: None,
            runner,
        }
    }

    /// Client bound to a context; every invocation is prefixed with
    /// `--context <name>`.
    pub fn with_context(runner: ProcessRunner, context: impl Into<String>) -> Self {
        Self {
            docker_path: "docker".to_string(),
            context: Some(context.into()),
            runner,
        }
    }

    /// Override the engine binary path.
    pub fn with_docker_path(mut self, path: impl Into<String>) -> Self {
        self.docker_path = path.into();
        self
    }

    fn full_args(&self, args: &[String]) -> Vec<String> {
        match &self.context {
            Some(ctx) => {
                let mut v = Vec::with_capacity(args.len() + 2);
                v.push("--context".to_string());
                v.push(ctx.clone());
                v.extend_from_slice(args);
                v
            }
            None => args.to_vec(),
        }
    }
}

#[async_trait]
impl Engine for CliEngine {
    async fn capture(&self, args: &[String]) -> Result<CaptureOutput> {
        let args = self.full_args(args);
        self.runner.capture(&self.docker_path, &args).await
    }

    async fn capture_with_stdin(&self, args: &[String], stdin: &str) -> Result<CaptureOutput> {
        let args = self.full_args(args);
        self.runner
            .capture_with_stdin(&self.docker_path, &args, Some(stdin))
            .await
    }

    async fn interactive(&self, args: &[String]) -> Result<i32> {
        let args = self.full_args(args);
        self.runner.interactive(&self.docker_path, &args).await
    }

    fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

fn string_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Capture an engine command, turning a non-zero exit into an
/// [`CaiError::Engine`] carrying the trimmed stderr.
pub async fn capture_checked(engine: &dyn Engine, args: &[String]) -> Result<CaptureOutput> {
    let out = engine.capture(args).await?;
    if out.success() {
        Ok(out)
    } else {
        Err(CaiError::Engine {
            stderr: out.stderr.trim().to_string(),
            exit_code: out.exit_code,
        })
    }
}

/// Whether `name` inspects as a container in the engine's context.
pub async fn container_exists(engine: &dyn Engine, name: &str) -> Result<bool> {
    let out = engine
        .capture(&string_args(&["inspect", "--type", "container", "--", name]))
        .await?;
    Ok(out.success())
}

/// Labels of a container, from `inspect --format {{json .Config.Labels}}`.
pub async fn container_labels(
    engine: &dyn Engine,
    name: &str,
) -> Result<HashMap<String, String>> {
    let out = capture_checked(
        engine,
        &string_args(&[
            "inspect",
            "--format",
            "{{json .Config.Labels}}",
            "--",
            name,
        ]),
    )
    .await?;
    let labels: HashMap<String, String> =
        serde_json::from_str(out.stdout.trim()).unwrap_or_default();
    Ok(labels)
}

/// IDs of all containers carrying `label`, including stopped ones.
pub async fn ps_ids_with_label(engine: &dyn Engine, label: &str) -> Result<Vec<String>> {
    let filter = format!("label={label}");
    let out = capture_checked(
        engine,
        &string_args(&["ps", "-aq", "--filter", filter.as_str()]),
    )
    .await?;
    Ok(out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Container name from id, with the leading `/` trimmed.
pub async fn container_name(engine: &dyn Engine, id: &str) -> Result<String> {
    let out = capture_checked(
        engine,
        &string_args(&["inspect", "--format", "{{.Name}}", "--", id]),
    )
    .await?;
    Ok(out.stdout.trim().trim_start_matches('/').to_string())
}

/// Whether a named volume exists in the engine's context.
pub async fn volume_exists(engine: &dyn Engine, name: &str) -> Result<bool> {
    let out = engine
        .capture(&string_args(&["volume", "inspect", name]))
        .await?;
    Ok(out.success())
}

/// Idempotently create a named volume.
pub async fn ensure_volume(engine: &dyn Engine, name: &str) -> Result<()> {
    debug!(volume = name, "ensuring volume exists");
    capture_checked(engine, &string_args(&["volume", "create", name])).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeEngine;
    use super::*;

    #[tokio::test]
    async fn capture_checked_maps_failure_to_engine_error() {
        let fake = FakeEngine::new();
        fake.respond(
            "volume inspect missing",
            CaptureOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "Error: no such volume\n".to_string(),
            },
        );
        let err = capture_checked(
            &fake,
            &["volume", "inspect", "missing"]
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        )
        .await
        .expect_err("should fail");
        match err {
            CaiError::Engine { stderr, exit_code } => {
                assert_eq!(stderr, "Error: no such volume");
                assert_eq!(exit_code, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ps_ids_parses_lines() {
        let fake = FakeEngine::new();
        fake.respond(
            "ps -aq",
            CaptureOutput {
                exit_code: 0,
                stdout: "abc\ndef\n\n".to_string(),
                stderr: String::new(),
            },
        );
        let ids = ps_ids_with_label(&fake, "containai.managed=true")
            .await
            .expect("ids");
        assert_eq!(ids, vec!["abc", "def"]);
        let calls = fake.calls();
        assert_eq!(
            calls[0],
            vec!["ps", "-aq", "--filter", "label=containai.managed=true"]
        );
    }

    #[tokio::test]
    async fn container_labels_tolerates_null() {
        let fake = FakeEngine::new();
        fake.respond(
            "inspect",
            CaptureOutput {
                exit_code: 0,
                stdout: "null\n".to_string(),
                stderr: String::new(),
            },
        );
        let labels = container_labels(&fake, "c").await.expect("labels");
        assert!(labels.is_empty());
    }
}
