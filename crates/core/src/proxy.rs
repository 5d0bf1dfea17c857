//! Docker-proxy create transform
//!
//! Intercepts a `docker` argument vector, decides whether it is a
//! managed devcontainer invocation, and if so rewrites it: hardened
//! runtime, data-volume mount, SSH port, and the full managed label set.
//! Unrelated invocations pass through untouched (possibly gaining a
//! `--context` so they land on the managed engine).

use crate::argv::{self, ArgvClass};
use crate::engine::{self, Engine};
use crate::errors::Result;
use crate::features::{self, FeatureSettings};
use crate::ports::PortAllocator;
use crate::paths::Paths;
use crate::ssh::SshConfigManager;
use crate::volume;
use crate::workspace;
use chrono::{SecondsFormat, Utc};
use std::path::Path;
use tracing::debug;

/// Hardened runtime injected into every managed create.
pub const SANDBOX_RUNTIME: &str = "sysbox-runc";

/// Mount destination for the data volume.
pub const DATA_MOUNT_DST: &str = "/mnt/agent-data";

/// Collaborators of one proxy invocation.
///
/// `raw` invokes argument vectors unchanged; `managed` is bound to the
/// managed context (absent when the install is not set up). Injecting
/// both lets tests drive the whole transform with fakes.
pub struct ProxyDeps<'a> {
    pub paths: &'a Paths,
    pub raw: &'a dyn Engine,
    pub managed: Option<&'a dyn Engine>,
}

/// Run the proxy over an intercepted argv; returns the exit code.
pub async fn run_proxy(deps: &ProxyDeps<'_>, args: Vec<String>) -> Result<i32> {
    match argv::classify(&args) {
        ArgvClass::ContainerCreate => run_create(deps, args).await,
        ArgvClass::Passthrough => run_passthrough(deps, args).await,
    }
}

/// Whether a passthrough vector should gain `--context <managed>`.
async fn should_inject_context(managed: &dyn Engine, args: &[String]) -> Result<bool> {
    if argv::has_context_flag(args) {
        return Ok(false);
    }
    // An explicit DOCKER_CONTEXT pins the invocation like --context does.
    if std::env::var_os("DOCKER_CONTEXT").map(|v| !v.is_empty()) == Some(true) {
        return Ok(false);
    }
    if argv::references_managed_metadata(args) {
        return Ok(true);
    }
    let Some(first) = argv::first_positional(args) else {
        return Ok(false);
    };
    // Engine-wide container listing belongs on the managed engine.
    if first == "ps" {
        return Ok(true);
    }
    if argv::CONTAINER_SUBCOMMANDS.contains(&first) {
        if let Some(target) = argv::positional_after(args, first) {
            return engine::container_exists(managed, target).await;
        }
    }
    Ok(false)
}

async fn run_passthrough(deps: &ProxyDeps<'_>, args: Vec<String>) -> Result<i32> {
    if let Some(managed) = deps.managed {
        if should_inject_context(managed, &args).await? {
            debug!("passthrough routed to managed context");
            return managed.interactive(&args).await;
        }
    }
    deps.raw.interactive(&args).await
}

async fn run_create(deps: &ProxyDeps<'_>, args: Vec<String>) -> Result<i32> {
    let (args, verbose, quiet) = argv::strip_wrapper_flags(&args);

    let config_file = argv::extract_label(&args, "devcontainer.config_file");
    let local_folder = argv::extract_label(&args, "devcontainer.local_folder");

    let (Some(config_file), Some(local_folder)) = (config_file, local_folder) else {
        debug!("create without devcontainer labels; passing through");
        return deps.raw.interactive(&args).await;
    };

    let settings = match features::read_feature_settings(Path::new(&config_file)) {
        Ok(settings) if settings.has_containai_feature => settings,
        Ok(_) => {
            debug!("no ContainAI feature; passing through");
            return deps.raw.interactive(&args).await;
        }
        Err(e) => {
            debug!("unreadable devcontainer config ({e}); passing through");
            return deps.raw.interactive(&args).await;
        }
    };

    let Some(managed) = deps.managed else {
        eprintln!("ContainAI: Not set up. Run: cai setup");
        return Ok(1);
    };

    let workspace_name = workspace::workspace_name(Path::new(&local_folder));
    let sanitized = workspace::sanitize_workspace_name(&workspace_name);

    let allocator = PortAllocator::new(deps.paths);
    let port = allocator.allocate(managed, &sanitized).await?;

    let mount_volume = if settings.enable_credentials {
        true
    } else if volume::sentinel_present(managed, &settings.data_volume).await? {
        true
    } else {
        if !quiet {
            eprintln!(
                "[cai-docker] Warning: data volume '{}' may contain credentials; mounting is disabled",
                settings.data_volume
            );
            eprintln!(
                "[cai-docker] Warning: run 'cai import' to provision it, or set enableCredentials in the feature settings"
            );
        }
        false
    };

    let volume_present = mount_volume
        && engine::volume_exists(managed, &settings.data_volume).await?;

    let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let injection = build_create_injection(
        &settings,
        volume_present,
        port,
        &workspace_name,
        &created,
    );
    let rewritten = argv::inject_after_create_tokens(&args, &injection);

    // The fragment lands before the engine runs so the host alias works
    // the instant the container binds.
    let ssh = SshConfigManager::new(deps.paths);
    ssh.write_fragment(&sanitized, port, Some(&settings.remote_user))?;

    if verbose && !quiet {
        eprintln!("[cai-docker] exec: docker {}", shell_words::join(&rewritten));
    }

    managed.interactive(&rewritten).await
}

/// Tokens injected after each bare `run`/`create` token of a managed
/// create vector.
pub fn build_create_injection(
    settings: &FeatureSettings,
    mount_volume: bool,
    port: u16,
    workspace_name: &str,
    created: &str,
) -> Vec<String> {
    let mut injection = vec![format!("--runtime={SANDBOX_RUNTIME}")];
    if mount_volume {
        injection.push("--mount".to_string());
        injection.push(format!(
            "type=volume,src={},dst={DATA_MOUNT_DST},readonly=false",
            settings.data_volume
        ));
    }
    injection.push("-e".to_string());
    injection.push(format!("CONTAINAI_SSH_PORT={port}"));
    for (key, value) in [
        ("containai.managed", "true".to_string()),
        ("containai.type", "devcontainer".to_string()),
        (
            "containai.devcontainer.workspace",
            workspace_name.to_string(),
        ),
        ("containai.data-volume", settings.data_volume.clone()),
        ("containai.ssh-port", port.to_string()),
        ("containai.created", created.to_string()),
    ] {
        injection.push("--label".to_string());
        injection.push(format!("{key}={value}"));
    }
    injection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::FakeEngine;
    use crate::process::CaptureOutput;
    use serial_test::serial;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn test_paths(tmp: &tempfile::TempDir) -> Paths {
        Paths::with_roots(tmp.path(), tmp.path().join(".config"))
    }

    fn write_devcontainer(dir: &Path, body: &str) -> String {
        let config_dir = dir.join(".devcontainer");
        std::fs::create_dir_all(&config_dir).expect("mkdir");
        let path = config_dir.join("devcontainer.json");
        std::fs::write(&path, body).expect("write");
        path.to_string_lossy().into_owned()
    }

    const MANAGED_CONFIG: &str = r#"{
        "features": {
            "ghcr.io/novotnyllc/containai/agent:1": {
                "dataVolume": "containai-data",
                "remoteUser": "agent"
            }
        }
    }"#;

    #[tokio::test]
    async fn passthrough_ps_routes_to_managed_context() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        let code = run_proxy(&deps, argv(&["ps"])).await.expect("proxy");
        assert_eq!(code, 0);
        assert_eq!(managed.calls(), vec![argv(&["ps"])]);
        assert!(raw.calls().is_empty());
    }

    #[tokio::test]
    async fn passthrough_without_managed_context_is_unchanged() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let raw = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: None,
        };

        let code = run_proxy(&deps, argv(&["ps"])).await.expect("proxy");
        assert_eq!(code, 0);
        assert_eq!(raw.calls(), vec![argv(&["ps"])]);
    }

    #[tokio::test]
    async fn explicit_context_is_respected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        let args = argv(&["--context", "other", "ps"]);
        run_proxy(&deps, args.clone()).await.expect("proxy");
        assert_eq!(raw.calls(), vec![args]);
        assert!(managed.calls().is_empty());
    }

    #[tokio::test]
    async fn container_subcommand_targets_are_probed() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        // The probe succeeds (fake default), so exec routes to managed.
        let code = run_proxy(&deps, argv(&["exec", "mybox", "sh"]))
            .await
            .expect("proxy");
        assert_eq!(code, 0);
        let calls = managed.calls();
        assert_eq!(
            calls[0],
            argv(&["inspect", "--type", "container", "--", "mybox"])
        );
        assert_eq!(calls[1], argv(&["exec", "mybox", "sh"]));
    }

    #[tokio::test]
    async fn container_subcommand_with_foreign_target_stays_raw() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        managed.respond(
            "inspect --type container",
            CaptureOutput {
                exit_code: 1,
                ..Default::default()
            },
        );
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        run_proxy(&deps, argv(&["exec", "foreign", "sh"]))
            .await
            .expect("proxy");
        assert_eq!(raw.calls(), vec![argv(&["exec", "foreign", "sh"])]);
    }

    #[tokio::test]
    async fn create_without_labels_passes_through() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        let args = argv(&["run", "alpine"]);
        run_proxy(&deps, args.clone()).await.expect("proxy");
        assert_eq!(raw.calls(), vec![args]);
        assert!(managed.calls().is_empty());
    }

    #[tokio::test]
    async fn create_without_feature_passes_through() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let config =
            write_devcontainer(tmp.path(), r#"{"features": {"ghcr.io/x/node:1": {}}}"#);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        let args = argv(&[
            "--label",
            &format!("devcontainer.config_file={config}"),
            "--label",
            "devcontainer.local_folder=/w",
            "run",
            "img",
        ]);
        run_proxy(&deps, args.clone()).await.expect("proxy");
        assert_eq!(raw.calls(), vec![args]);
    }

    #[tokio::test]
    async fn managed_create_without_context_fails_fast() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let config = write_devcontainer(tmp.path(), MANAGED_CONFIG);
        let raw = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: None,
        };

        let code = run_proxy(
            &deps,
            argv(&[
                "--label",
                &format!("devcontainer.config_file={config}"),
                "--label",
                "devcontainer.local_folder=/w",
                "run",
                "img",
            ]),
        )
        .await
        .expect("proxy");
        assert_eq!(code, 1);
        // The engine is never invoked.
        assert!(raw.calls().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn managed_create_is_rewritten() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let config = write_devcontainer(tmp.path(), MANAGED_CONFIG);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        let code = run_proxy(
            &deps,
            argv(&[
                "--label",
                &format!("devcontainer.config_file={config}"),
                "--label",
                "devcontainer.local_folder=/w",
                "run",
                "mybuilder",
            ]),
        )
        .await
        .expect("proxy");
        assert_eq!(code, 0);

        let calls = managed.calls();
        let invoked = calls.last().expect("engine invoked");
        let joined = invoked.join(" ");

        // Injection lands right after the bare run token.
        let run_idx = invoked.iter().position(|t| t == "run").expect("run token");
        assert_eq!(invoked[run_idx + 1], "--runtime=sysbox-runc");

        assert!(joined.contains(
            "--mount type=volume,src=containai-data,dst=/mnt/agent-data,readonly=false"
        ));
        assert!(joined.contains("-e CONTAINAI_SSH_PORT=2400"));
        assert!(joined.contains("--label containai.managed=true"));
        assert!(joined.contains("--label containai.type=devcontainer"));
        assert!(joined.contains("--label containai.devcontainer.workspace=w"));
        assert!(joined.contains("--label containai.data-volume=containai-data"));
        assert!(joined.contains("--label containai.ssh-port=2400"));
        assert!(joined.contains("--label containai.created="));
        assert!(joined.ends_with("mybuilder"));

        // The SSH fragment is usable immediately.
        let fragment = std::fs::read_to_string(paths.ssh_fragment("w")).expect("fragment");
        assert!(fragment.contains("Host containai-devcontainer-w"));
        assert!(fragment.contains("Port 2400"));
        assert!(fragment.contains("User agent"));
    }

    #[tokio::test]
    #[serial]
    async fn absent_sentinel_disables_the_mount() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let config = write_devcontainer(tmp.path(), MANAGED_CONFIG);
        let raw = FakeEngine::new();
        let managed = FakeEngine::new();
        managed.respond(
            "test -f /vol/.containai-no-secrets",
            CaptureOutput {
                exit_code: 1,
                ..Default::default()
            },
        );
        let deps = ProxyDeps {
            paths: &paths,
            raw: &raw,
            managed: Some(&managed),
        };

        run_proxy(
            &deps,
            argv(&[
                "--label",
                &format!("devcontainer.config_file={config}"),
                "--label",
                "devcontainer.local_folder=/w",
                "run",
                "img",
            ]),
        )
        .await
        .expect("proxy");

        let calls = managed.calls();
        let invoked = calls.last().expect("engine invoked");
        let joined = invoked.join(" ");
        assert!(!joined.contains("--mount"));
        // Everything else still lands.
        assert!(joined.contains("--runtime=sysbox-runc"));
        assert!(joined.contains("--label containai.managed=true"));
    }

    #[tokio::test]
    async fn create_injection_order_is_stable() {
        let settings = FeatureSettings {
            has_containai_feature: true,
            data_volume: "containai-data".to_string(),
            enable_credentials: true,
            remote_user: "agent".to_string(),
        };
        let injection =
            build_create_injection(&settings, true, 2400, "w", "2026-01-01T00:00:00Z");
        assert_eq!(
            injection,
            argv(&[
                "--runtime=sysbox-runc",
                "--mount",
                "type=volume,src=containai-data,dst=/mnt/agent-data,readonly=false",
                "-e",
                "CONTAINAI_SSH_PORT=2400",
                "--label",
                "containai.managed=true",
                "--label",
                "containai.type=devcontainer",
                "--label",
                "containai.devcontainer.workspace=w",
                "--label",
                "containai.data-volume=containai-data",
                "--label",
                "containai.ssh-port=2400",
                "--label",
                "containai.created=2026-01-01T00:00:00Z",
            ])
        );
    }
}
