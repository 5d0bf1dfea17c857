//! Engine context resolution
//!
//! A fixed prioritized list of context names is probed with
//! `context inspect`; the first that responds is the managed context.
//! `default` is only considered when enumerating every available context
//! for cross-context searches.

use crate::errors::Result;
use crate::process::ProcessRunner;
use tracing::debug;

/// Context names probed in priority order.
pub const CONTEXT_CANDIDATES: [&str; 3] =
    ["containai-docker", "containai-secure", "docker-containai"];

/// Sentinel context included when enumerating all contexts.
pub const DEFAULT_CONTEXT: &str = "default";

/// Environment override for the managed context name.
pub const CONTEXT_ENV: &str = "CONTAINAI_DOCKER_CONTEXT";

async fn probe(runner: &ProcessRunner, docker_path: &str, name: &str) -> Result<bool> {
    let args = vec![
        "context".to_string(),
        "inspect".to_string(),
        name.to_string(),
    ];
    let out = runner.capture(docker_path, &args).await?;
    Ok(out.success())
}

/// Resolve the managed context: the env override when set, else the
/// first candidate that answers `context inspect`.
pub async fn resolve_managed_context(
    runner: &ProcessRunner,
    docker_path: &str,
) -> Result<Option<String>> {
    if let Ok(name) = std::env::var(CONTEXT_ENV) {
        if !name.is_empty() {
            debug!(context = %name, "context taken from environment");
            return Ok(Some(name));
        }
    }
    for name in CONTEXT_CANDIDATES {
        if probe(runner, docker_path, name).await? {
            debug!(context = name, "managed context resolved");
            return Ok(Some(name.to_string()));
        }
    }
    Ok(None)
}

/// All probed contexts that exist, plus `default` as a sentinel for
/// cross-context search.
pub async fn enumerate_contexts(
    runner: &ProcessRunner,
    docker_path: &str,
) -> Result<Vec<String>> {
    let mut contexts = Vec::new();
    for name in CONTEXT_CANDIDATES {
        if probe(runner, docker_path, name).await? {
            contexts.push(name.to_string());
        }
    }
    contexts.push(DEFAULT_CONTEXT.to_string());
    Ok(contexts)
}
