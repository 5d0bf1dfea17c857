//! Doctor: environment diagnostics
//!
//! Four capability probes decide whether the install is usable: the
//! engine CLI, the managed context, engine reachability under that
//! context, and the sandbox runtime. Optionally builds each installed
//! template as a smoke test.

use crate::config;
use crate::context;
use crate::engine::{CliEngine, Engine};
use crate::errors::{CaiError, Result};
use crate::paths::Paths;
use crate::process::ProcessRunner;
use serde::Serialize;
use tracing::debug;

/// The hardened runtime doctor looks for in `Runtimes`.
pub const SANDBOX_RUNTIME: &str = "sysbox-runc";

/// Doctor options.
#[derive(Debug, Clone, Default)]
pub struct DoctorOptions {
    pub json: bool,
    /// Build each installed template as a smoke test.
    pub smoke: bool,
}

/// Collected probe results.
#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub cli_present: bool,
    pub context_present: bool,
    pub engine_reachable: bool,
    pub runtime_present: bool,
    pub context: Option<String>,
    pub channel: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_builds: Vec<TemplateBuild>,
}

/// Result of one template smoke build.
#[derive(Debug, Serialize)]
pub struct TemplateBuild {
    pub name: String,
    pub ok: bool,
}

impl DoctorReport {
    /// All four capability probes passed.
    pub fn healthy(&self) -> bool {
        self.cli_present && self.context_present && self.engine_reachable && self.runtime_present
    }
}

/// Collect the report without printing.
pub async fn collect(runner: &ProcessRunner, paths: &Paths, smoke: bool) -> Result<DoctorReport> {
    let cli_present = match runner.capture("docker", &["--version".to_string()]).await {
        Ok(out) => out.success(),
        Err(CaiError::ChildMissing { .. }) => false,
        Err(e) => return Err(e),
    };

    let managed = if cli_present {
        context::resolve_managed_context(runner, "docker").await?
    } else {
        None
    };
    let context_present = managed.is_some();

    let mut engine_reachable = false;
    let mut runtime_present = false;
    let mut template_builds = Vec::new();

    if let Some(ctx) = &managed {
        let eng = CliEngine::with_context(runner.clone(), ctx.clone());
        let info = eng
            .capture(&[
                "info".to_string(),
                "--format".to_string(),
                "{{json .Runtimes}}".to_string(),
            ])
            .await?;
        engine_reachable = info.success();
        if engine_reachable {
            let runtimes: serde_json::Value =
                serde_json::from_str(info.stdout.trim()).unwrap_or_default();
            runtime_present = runtimes
                .as_object()
                .map(|o| o.contains_key(SANDBOX_RUNTIME))
                .unwrap_or(false);
        }

        if smoke && engine_reachable {
            template_builds = smoke_build_templates(&eng, paths).await?;
        }
    }

    // The channel is deliberately global; workspace-local config never
    // changes it.
    let channel = config::resolve_channel(paths).unwrap_or_else(|_| "stable".to_string());

    Ok(DoctorReport {
        cli_present,
        context_present,
        engine_reachable,
        runtime_present,
        context: managed,
        channel,
        template_builds,
    })
}

async fn smoke_build_templates(eng: &dyn Engine, paths: &Paths) -> Result<Vec<TemplateBuild>> {
    let mut builds = Vec::new();
    let templates = paths.templates_dir();
    let Ok(entries) = std::fs::read_dir(&templates) else {
        return Ok(builds);
    };
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.join("Dockerfile").is_file() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        debug!(template = %name, "smoke building template");
        let out = eng
            .capture(&[
                "build".to_string(),
                "-t".to_string(),
                format!("containai-template-{name}"),
                dir.to_string_lossy().into_owned(),
            ])
            .await?;
        builds.push(TemplateBuild {
            name,
            ok: out.success(),
        });
    }
    Ok(builds)
}

/// Run doctor; prints human or JSON output and returns the exit code.
pub async fn run_doctor(
    runner: &ProcessRunner,
    paths: &Paths,
    opts: &DoctorOptions,
) -> Result<i32> {
    let report = collect(runner, paths, opts.smoke).await?;

    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|e| CaiError::Config(format!("serialize report: {e}")))?
        );
    } else {
        print_human(&report);
    }

    Ok(if report.healthy() { 0 } else { 1 })
}

fn check_line(ok: bool, label: &str) {
    println!("[{}] {label}", if ok { "ok" } else { "fail" });
}

fn print_human(report: &DoctorReport) {
    check_line(report.cli_present, "docker CLI on PATH");
    match &report.context {
        Some(ctx) => check_line(true, &format!("managed context ({ctx})")),
        None => check_line(false, "managed context"),
    }
    check_line(report.engine_reachable, "engine reachable");
    check_line(
        report.runtime_present,
        &format!("{SANDBOX_RUNTIME} runtime installed"),
    );
    println!("channel: {}", report.channel);
    for build in &report.template_builds {
        check_line(build.ok, &format!("template build: {}", build.name));
    }
    if report.healthy() {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Run: cai setup");
    }
}
