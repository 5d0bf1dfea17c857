//! Per-container status snapshot
//!
//! Resolves a single managed container and reports its state, image,
//! uptime, and live resource usage. The managed label must be exactly
//! `true`; anything else is treated as an unmanaged container.

use crate::config::ConfigStore;
use crate::engine::{self, Engine};
use crate::errors::{CaiError, Result};
use crate::resolve;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Status options.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub workspace: Option<PathBuf>,
    pub container: Option<String>,
    pub json: bool,
}

/// The snapshot reported for one container.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub container: String,
    pub status: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<String>,
}

/// Bucketed uptime: `XdYhZm`, `YhZm`, or `Zm`.
pub fn format_uptime(started: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = now.signed_duration_since(started).num_minutes().max(0);
    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    let mins = minutes % 60;
    if days > 0 {
        format!("{days}d{hours}h{mins}m")
    } else if hours > 0 {
        format!("{hours}h{mins}m")
    } else {
        format!("{mins}m")
    }
}

/// Collect the status snapshot for the resolved container.
pub async fn collect(
    eng: &dyn Engine,
    config: &ConfigStore,
    cwd: &Path,
    opts: &StatusOptions,
) -> Result<StatusReport> {
    let container = match &opts.container {
        Some(name) => name.clone(),
        None => {
            let workspace = opts.workspace.as_deref().unwrap_or(cwd);
            resolve::resolve_container(eng, config, workspace)
                .await?
                .ok_or_else(|| {
                    CaiError::Environment(format!(
                        "no managed container found for workspace {}",
                        workspace.display()
                    ))
                })?
        }
    };

    let labels = engine::container_labels(eng, &container).await?;
    if labels.get("containai.managed").map(String::as_str) != Some("true") {
        return Err(CaiError::Environment(format!(
            "container is not managed by ContainAI: {container}"
        )));
    }

    let out = engine::capture_checked(
        eng,
        &[
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Status}}|{{.Config.Image}}|{{.State.StartedAt}}".to_string(),
            "--".to_string(),
            container.clone(),
        ],
    )
    .await?;
    let mut parts = out.stdout.trim().splitn(3, '|');
    let status = parts.next().unwrap_or_default().to_string();
    let image = parts.next().unwrap_or_default().to_string();
    let started_at = parts
        .next()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let mut report = StatusReport {
        container: container.clone(),
        status: status.clone(),
        image,
        uptime: None,
        mem_usage: None,
        cpu_percent: None,
    };

    if status == "running" {
        report.uptime = started_at.map(|s| format_uptime(s, Utc::now()));
        let stats = engine::capture_checked(
            eng,
            &[
                "stats".to_string(),
                "--no-stream".to_string(),
                "--format".to_string(),
                "{{.MemUsage}}|{{.CPUPerc}}".to_string(),
                container,
            ],
        )
        .await?;
        let mut parts = stats.stdout.trim().splitn(2, '|');
        report.mem_usage = parts.next().map(|s| s.trim().to_string());
        report.cpu_percent = parts.next().map(|s| s.trim().to_string());
    }

    Ok(report)
}

/// Run status; prints human or JSON output and returns the exit code.
pub async fn run_status(
    eng: &dyn Engine,
    config: &ConfigStore,
    cwd: &Path,
    opts: &StatusOptions,
) -> Result<i32> {
    let report = collect(eng, config, cwd, opts).await?;
    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|e| CaiError::Config(format!("serialize report: {e}")))?
        );
    } else {
        println!("Container: {}", report.container);
        println!("Status:    {}", report.status);
        println!("Image:     {}", report.image);
        if let Some(uptime) = &report.uptime {
            println!("Uptime:    {uptime}");
        }
        if let Some(mem) = &report.mem_usage {
            println!("Memory:    {mem}");
        }
        if let Some(cpu) = &report.cpu_percent {
            println!("CPU:       {cpu}");
        }
    }
    Ok(0)
}
