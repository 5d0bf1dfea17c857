//! Host filesystem layout
//!
//! Centralizes every path the CLI reads or writes: the per-user config
//! directory, the port reservation directory and lock, SSH config and
//! include fragments, templates, and import overrides. All consumers go
//! through [`Paths`] so tests can redirect the whole layout into a
//! temporary directory.

use crate::errors::{CaiError, Result};
use directories_next::BaseDirs;
use std::path::{Path, PathBuf};

/// Resolved base directories for the current invocation.
#[derive(Debug, Clone)]
pub struct Paths {
    home: PathBuf,
    config_root: PathBuf,
}

impl Paths {
    /// Resolve from the environment: `HOME` (or the platform user
    /// directory) and `XDG_CONFIG_HOME` (fallback `~/.config`).
    pub fn from_env() -> Result<Self> {
        let home = match std::env::var_os("HOME") {
            Some(h) if !h.is_empty() => PathBuf::from(h),
            _ => BaseDirs::new()
                .map(|b| b.home_dir().to_path_buf())
                .ok_or_else(|| {
                    CaiError::Environment("cannot determine home directory".to_string())
                })?,
        };
        let config_root = match std::env::var_os("XDG_CONFIG_HOME") {
            Some(x) if !x.is_empty() => PathBuf::from(x),
            _ => home.join(".config"),
        };
        Ok(Self { home, config_root })
    }

    /// Construct with explicit roots. Used by tests.
    pub fn with_roots(home: impl Into<PathBuf>, config_root: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            config_root: config_root.into(),
        }
    }

    /// The user's home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `$XDG_CONFIG_HOME/containai`
    pub fn config_dir(&self) -> PathBuf {
        self.config_root.join("containai")
    }

    /// The user config file: `config.toml`, falling back to
    /// `containai.toml` when only the legacy name exists.
    pub fn user_config_file(&self) -> PathBuf {
        let dir = self.config_dir();
        let primary = dir.join("config.toml");
        if primary.exists() {
            return primary;
        }
        let legacy = dir.join("containai.toml");
        if legacy.exists() {
            legacy
        } else {
            primary
        }
    }

    /// Port reservation directory.
    pub fn ports_dir(&self) -> PathBuf {
        self.config_dir().join("ports")
    }

    /// Per-workspace port reservation file.
    pub fn port_file(&self, sanitized: &str) -> PathBuf {
        self.ports_dir().join(format!("devcontainer-{sanitized}"))
    }

    /// The cross-process allocation lock.
    pub fn port_lock(&self) -> PathBuf {
        self.config_dir().join(".ssh-port.lock")
    }

    /// `~/.ssh`
    pub fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }

    /// `~/.ssh/config`
    pub fn ssh_config(&self) -> PathBuf {
        self.ssh_dir().join("config")
    }

    /// `~/.ssh/containai.d`
    pub fn ssh_fragment_dir(&self) -> PathBuf {
        self.ssh_dir().join("containai.d")
    }

    /// Per-workspace SSH include fragment.
    pub fn ssh_fragment(&self, sanitized: &str) -> PathBuf {
        self.ssh_fragment_dir()
            .join(format!("devcontainer-{sanitized}.conf"))
    }

    /// Known-hosts file referenced from every fragment.
    pub fn known_hosts(&self) -> PathBuf {
        self.ssh_fragment_dir().join("known_hosts")
    }

    /// Generated Ed25519 identity.
    pub fn identity_file(&self) -> PathBuf {
        self.config_dir().join("id_containai")
    }

    /// Template directory root.
    pub fn templates_dir(&self) -> PathBuf {
        self.config_dir().join("templates")
    }

    /// Import override root.
    pub fn overrides_dir(&self) -> PathBuf {
        self.config_dir().join("import-overrides")
    }

    /// Optional user manifest overriding the built-in one.
    pub fn manifest_file(&self) -> PathBuf {
        self.config_dir().join("manifest.toml")
    }
}
