//! SSH client configuration management
//!
//! Maintains the `Include` directive in `~/.ssh/config` and the
//! per-workspace host fragments under `~/.ssh/containai.d/`. Fragments
//! are written before the engine is invoked so the host alias works the
//! instant the container binds its port.

use crate::engine::{self, Engine};
use crate::errors::Result;
use crate::paths::Paths;
use chrono::{SecondsFormat, Utc};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Canonical include line placed at the top of `~/.ssh/config`.
pub const INCLUDE_LINE: &str = "Include ~/.ssh/containai.d/*.conf";

/// Manages the SSH config file and include fragments.
pub struct SshConfigManager<'a> {
    paths: &'a Paths,
}

impl<'a> SshConfigManager<'a> {
    pub fn new(paths: &'a Paths) -> Self {
        Self { paths }
    }

    /// Host alias for a sanitized workspace name.
    pub fn host_alias(sanitized: &str) -> String {
        format!("containai-devcontainer-{sanitized}")
    }

    fn ensure_dirs(&self) -> Result<()> {
        let ssh_dir = self.paths.ssh_dir();
        std::fs::create_dir_all(&ssh_dir)?;
        std::fs::create_dir_all(self.paths.ssh_fragment_dir())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&ssh_dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Ensure `~/.ssh/config` contains the include directive exactly
    /// once, at the top. Pre-existing containai.d includes are removed
    /// before the canonical line is prepended.
    pub fn ensure_include(&self) -> Result<()> {
        self.ensure_dirs()?;
        let config_path = self.paths.ssh_config();

        if !config_path.exists() {
            std::fs::write(&config_path, format!("{INCLUDE_LINE}\n"))?;
            return Ok(());
        }

        let existing = std::fs::read_to_string(&config_path)?;
        let remainder: Vec<&str> = existing
            .lines()
            .filter(|line| !is_containai_include(line))
            .collect();

        let mut out = String::with_capacity(existing.len() + INCLUDE_LINE.len() + 2);
        out.push_str(INCLUDE_LINE);
        out.push('\n');
        for line in remainder {
            out.push_str(line);
            out.push('\n');
        }
        std::fs::write(&config_path, out)?;
        Ok(())
    }

    /// Write the per-workspace host fragment, ensuring the include
    /// directive first. Returns the fragment path.
    pub fn write_fragment(
        &self,
        sanitized: &str,
        port: u16,
        remote_user: Option<&str>,
    ) -> Result<PathBuf> {
        self.ensure_include()?;

        let mut content = String::new();
        content.push_str(&format!(
            "# Managed by ContainAI, written {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        content.push_str(&format!("Host {}\n", Self::host_alias(sanitized)));
        content.push_str("  HostName localhost\n");
        content.push_str(&format!("  Port {port}\n"));
        if let Some(user) = remote_user {
            content.push_str(&format!("  User {user}\n"));
        }
        content.push_str("  StrictHostKeyChecking accept-new\n");
        content.push_str("  UserKnownHostsFile ~/.ssh/containai.d/known_hosts\n");
        content.push_str("  PreferredAuthentications publickey,keyboard-interactive\n");

        let path = self.paths.ssh_fragment(sanitized);
        std::fs::write(&path, content)?;
        debug!(path = %path.display(), "wrote SSH fragment");
        Ok(path)
    }

    /// Delete fragments whose container no longer exists. Returns the
    /// sanitized names that were (or would be) removed.
    pub async fn cleanup(&self, eng: &dyn Engine, dry_run: bool) -> Result<Vec<String>> {
        let dir = self.paths.ssh_fragment_dir();
        let mut removed = Vec::new();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(removed),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(sanitized) = name
                .strip_prefix("devcontainer-")
                .and_then(|n| n.strip_suffix(".conf"))
            else {
                continue;
            };
            if engine::container_exists(eng, sanitized).await? {
                continue;
            }
            if dry_run {
                println!("Would remove {}", path.display());
            } else {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to remove fragment: {e}");
                    continue;
                }
                debug!(path = %path.display(), "removed stale fragment");
            }
            removed.push(sanitized.to_string());
        }
        Ok(removed)
    }
}

/// A line whose first token is a case-insensitive `Include` referencing
/// the containai.d directory.
fn is_containai_include(line: &str) -> bool {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(first) if first.eq_ignore_ascii_case("include") => line.contains("containai.d/"),
        _ => false,
    }
}
