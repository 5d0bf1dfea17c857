//! First-run bootstrap
//!
//! Idempotent setup: config and SSH directories, an Ed25519 identity,
//! the engine service and context, and the bundled templates. Dry-run
//! enumerates each action as a `Would ...` line without touching
//! anything.

use crate::doctor::{self, DoctorOptions};
use crate::errors::Result;
use crate::paths::Paths;
use crate::process::ProcessRunner;
use tracing::debug;

/// Engine socket the managed context points at.
pub const RUNTIME_SOCKET: &str = "/var/run/containai-docker.sock";

/// systemd unit that serves the socket on Linux.
pub const SERVICE_UNIT: &str = "containai-docker.service";

/// Name of the context created by setup.
pub const MANAGED_CONTEXT: &str = "containai-docker";

/// Bundled template Dockerfiles installed on first run.
pub const BUNDLED_TEMPLATES: [(&str, &str); 2] = [
    (
        "base",
        "ARG BASE_IMAGE=ubuntu:24.04\nFROM ${BASE_IMAGE}\nRUN apt-get update && apt-get install -y openssh-server sudo && rm -rf /var/lib/apt/lists/*\n",
    ),
    (
        "node",
        "ARG BASE_IMAGE=node:22-bookworm\nFROM ${BASE_IMAGE}\nRUN apt-get update && apt-get install -y openssh-server sudo && rm -rf /var/lib/apt/lists/*\n",
    ),
];

/// Setup options.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    pub dry_run: bool,
    pub skip_templates: bool,
}

/// Run the bootstrap; returns the exit code (doctor's verdict).
pub async fn run_setup(runner: &ProcessRunner, paths: &Paths, opts: &SetupOptions) -> Result<i32> {
    ensure_directories(paths, opts.dry_run)?;
    ensure_identity(runner, paths, opts.dry_run).await?;
    ensure_engine_service(runner, opts.dry_run).await?;
    ensure_context(runner, opts.dry_run).await?;
    if !opts.skip_templates {
        install_templates(paths, opts.dry_run)?;
    }

    if opts.dry_run {
        println!("Would run doctor");
        return Ok(0);
    }
    doctor::run_doctor(runner, paths, &DoctorOptions::default()).await
}

fn ensure_directories(paths: &Paths, dry_run: bool) -> Result<()> {
    for dir in [
        paths.config_dir(),
        paths.ports_dir(),
        paths.ssh_dir(),
        paths.ssh_fragment_dir(),
    ] {
        if dir.is_dir() {
            continue;
        }
        if dry_run {
            println!("Would create {}", dir.display());
        } else {
            std::fs::create_dir_all(&dir)?;
        }
    }
    let known_hosts = paths.known_hosts();
    if !known_hosts.exists() {
        if dry_run {
            println!("Would create {}", known_hosts.display());
        } else if known_hosts.parent().map(|p| p.is_dir()).unwrap_or(false) {
            std::fs::write(&known_hosts, "")?;
        }
    }
    Ok(())
}

async fn ensure_identity(runner: &ProcessRunner, paths: &Paths, dry_run: bool) -> Result<()> {
    let identity = paths.identity_file();
    if identity.exists() {
        debug!("identity already present");
        return Ok(());
    }
    if dry_run {
        println!("Would generate Ed25519 key at {}", identity.display());
        return Ok(());
    }
    let identity_arg = identity.to_string_lossy();
    let args: Vec<String> = [
        "-t",
        "ed25519",
        "-N",
        "",
        "-f",
        identity_arg.as_ref(),
        "-C",
        "containai",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let out = runner.capture("ssh-keygen", &args).await?;
    if !out.success() {
        eprintln!("ssh-keygen failed: {}", out.stderr.trim());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
async fn ensure_engine_service(runner: &ProcessRunner, dry_run: bool) -> Result<()> {
    let cat = runner
        .capture(
            "systemctl",
            &["cat".to_string(), SERVICE_UNIT.to_string()],
        )
        .await;
    let unit_exists = matches!(cat, Ok(out) if out.success());
    if !unit_exists {
        debug!("engine service unit not installed; skipping");
        return Ok(());
    }
    if dry_run {
        println!("Would start {SERVICE_UNIT}");
        return Ok(());
    }
    let out = runner
        .capture(
            "systemctl",
            &["start".to_string(), SERVICE_UNIT.to_string()],
        )
        .await?;
    if !out.success() {
        eprintln!("failed to start {SERVICE_UNIT}: {}", out.stderr.trim());
    }
    Ok(())
}

#[cfg(target_os = "macos")]
async fn ensure_engine_service(runner: &ProcessRunner, dry_run: bool) -> Result<()> {
    if std::path::Path::new(RUNTIME_SOCKET).exists() {
        debug!("runtime socket already present");
        return Ok(());
    }
    if dry_run {
        println!("Would start Lima VM containai");
        return Ok(());
    }
    let start_args = vec!["start".to_string(), "containai".to_string()];
    let out = runner.capture("limactl", &start_args).await?;
    if !out.success() {
        // A wedged VM blocks start; delete and retry once.
        let _ = runner
            .capture(
                "limactl",
                &[
                    "delete".to_string(),
                    "containai".to_string(),
                    "--force".to_string(),
                ],
            )
            .await;
        let retry = runner.capture("limactl", &start_args).await?;
        if !retry.success() {
            eprintln!("failed to start Lima VM: {}", retry.stderr.trim());
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn ensure_engine_service(_runner: &ProcessRunner, _dry_run: bool) -> Result<()> {
    Ok(())
}

async fn ensure_context(runner: &ProcessRunner, dry_run: bool) -> Result<()> {
    let probe = runner
        .capture(
            "docker",
            &[
                "context".to_string(),
                "inspect".to_string(),
                MANAGED_CONTEXT.to_string(),
            ],
        )
        .await;
    if matches!(probe, Ok(out) if out.success()) {
        debug!("managed context already exists");
        return Ok(());
    }
    if dry_run {
        println!("Would create docker context {MANAGED_CONTEXT} -> unix://{RUNTIME_SOCKET}");
        return Ok(());
    }
    let host_arg = format!("host=unix://{RUNTIME_SOCKET}");
    let args: Vec<String> = [
        "context",
        "create",
        MANAGED_CONTEXT,
        "--docker",
        host_arg.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let out = runner.capture("docker", &args).await?;
    if !out.success() {
        eprintln!("failed to create context: {}", out.stderr.trim());
    }
    Ok(())
}

fn install_templates(paths: &Paths, dry_run: bool) -> Result<()> {
    for (name, dockerfile) in BUNDLED_TEMPLATES {
        let dir = paths.templates_dir().join(name);
        let file = dir.join("Dockerfile");
        if file.exists() {
            continue;
        }
        if dry_run {
            println!("Would install template {name}");
            continue;
        }
        std::fs::create_dir_all(&dir)?;
        std::fs::write(&file, dockerfile)?;
        debug!(template = name, "installed template");
    }
    Ok(())
}
