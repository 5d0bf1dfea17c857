//! TOML configuration store
//!
//! Get/set/unset over well-defined keys in the per-user config file,
//! with a per-workspace subtable keyed by canonicalized absolute path.
//! A workspace-local `.containai/config.toml`, discovered by walking up
//! from the workspace, overrides the user file.

use crate::errors::{CaiError, Result};
use crate::paths::Paths;
use std::path::{Path, PathBuf};
use toml::value::{Table, Value};
use tracing::debug;

/// Environment override for the config file path.
pub const CONFIG_ENV: &str = "CONTAINAI_CONFIG";

/// Channel override environment variables, in priority order.
pub const CHANNEL_ENVS: [&str; 2] = ["CAI_CHANNEL", "CONTAINAI_CHANNEL"];

/// Recognized release channels.
pub const CHANNELS: [&str; 2] = ["stable", "nightly"];

/// A loaded TOML configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    doc: Table,
}

impl ConfigStore {
    /// Load the per-user config: `$CONTAINAI_CONFIG` when set, else the
    /// first of `config.toml` / `containai.toml` under the config dir.
    /// A missing file yields an empty document bound to the path.
    pub fn load_user(paths: &Paths) -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => paths.user_config_file(),
        };
        Self::load_from(&path)
    }

    /// Load from an explicit path; missing files yield an empty document.
    pub fn load_from(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            text.parse::<Table>()
                .map_err(|e| CaiError::Config(format!("{}: {e}", path.display())))?
        } else {
            Table::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    /// Workspace-aware load: a `.containai/config.toml` found by walking
    /// up from `workspace` wins over the user file.
    pub fn discover(workspace: &Path, paths: &Paths) -> Result<Self> {
        let start = workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf());
        let mut current = Some(start.as_path());
        while let Some(dir) = current {
            let candidate = dir.join(".containai").join("config.toml");
            if candidate.is_file() {
                debug!(path = %candidate.display(), "using workspace-local config");
                return Self::load_from(&candidate);
            }
            current = dir.parent();
        }
        Self::load_user(paths)
    }

    /// Persist the document, creating parent directories.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&self.doc)
            .map_err(|e| CaiError::Config(format!("serialize config: {e}")))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical key spelling: bare `agent` means `agent.default`.
    pub fn normalize_key(key: &str) -> &str {
        if key == "agent" {
            "agent.default"
        } else {
            key
        }
    }

    fn workspace_key(workspace: &Path) -> String {
        workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf())
            .to_string_lossy()
            .into_owned()
    }

    fn lookup<'a>(table: &'a Table, dotted: &str) -> Option<&'a Value> {
        let mut parts = dotted.split('.');
        let first = parts.next()?;
        let mut value = table.get(first)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    fn render(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Read a key. With a workspace, the key is looked up in that
    /// workspace's subtable; normalization happens before dispatch.
    pub fn get(&self, key: &str, workspace: Option<&Path>) -> Option<String> {
        let key = Self::normalize_key(key);
        match workspace {
            Some(ws) => {
                let ws_key = Self::workspace_key(ws);
                let table = self
                    .doc
                    .get("workspace")?
                    .as_table()?
                    .get(&ws_key)?
                    .as_table()?;
                Self::lookup(table, key).map(Self::render)
            }
            None => Self::lookup(&self.doc, key).map(Self::render),
        }
    }

    fn parse_scalar(raw: &str) -> Value {
        match raw {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => match raw.parse::<i64>() {
                Ok(n) => Value::Integer(n),
                Err(_) => Value::String(raw.to_string()),
            },
        }
    }

    fn insert(table: &mut Table, dotted: &str, value: Value) -> Result<()> {
        let mut parts = dotted.split('.').peekable();
        let mut current = table;
        while let Some(part) = parts.next() {
            if part.is_empty() {
                return Err(CaiError::InvalidInput(format!("invalid key: {dotted}")));
            }
            if parts.peek().is_none() {
                current.insert(part.to_string(), value);
                return Ok(());
            }
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            current = entry.as_table_mut().ok_or_else(|| {
                CaiError::InvalidInput(format!("key {dotted} collides with a non-table value"))
            })?;
        }
        Ok(())
    }

    /// Write a key. `data_volume` cannot be set globally; the global
    /// equivalent is `agent.data_volume`.
    pub fn set(&mut self, key: &str, raw: &str, workspace: Option<&Path>) -> Result<()> {
        let key = Self::normalize_key(key);
        let value = Self::parse_scalar(raw);
        match workspace {
            Some(ws) => {
                let ws_key = Self::workspace_key(ws);
                let workspaces = self
                    .doc
                    .entry("workspace".to_string())
                    .or_insert_with(|| Value::Table(Table::new()));
                let workspaces = workspaces.as_table_mut().ok_or_else(|| {
                    CaiError::Config("workspace section is not a table".to_string())
                })?;
                let entry = workspaces
                    .entry(ws_key)
                    .or_insert_with(|| Value::Table(Table::new()));
                let table = entry.as_table_mut().ok_or_else(|| {
                    CaiError::Config("workspace entry is not a table".to_string())
                })?;
                Self::insert(table, key, value)
            }
            None => {
                if key == "data_volume" {
                    return Err(CaiError::InvalidInput(
                        "data_volume is a per-workspace key; use agent.data_volume globally"
                            .to_string(),
                    ));
                }
                Self::insert(&mut self.doc, key, value)
            }
        }
    }

    fn remove(table: &mut Table, dotted: &str) -> bool {
        match dotted.split_once('.') {
            None => table.remove(dotted).is_some(),
            Some((head, rest)) => table
                .get_mut(head)
                .and_then(|v| v.as_table_mut())
                .map(|t| Self::remove(t, rest))
                .unwrap_or(false),
        }
    }

    /// Delete a key; returns whether anything was removed.
    pub fn unset(&mut self, key: &str, workspace: Option<&Path>) -> Result<bool> {
        let key = Self::normalize_key(key);
        match workspace {
            Some(ws) => {
                let ws_key = Self::workspace_key(ws);
                Ok(self
                    .doc
                    .get_mut("workspace")
                    .and_then(|v| v.as_table_mut())
                    .and_then(|t| t.get_mut(&ws_key))
                    .and_then(|v| v.as_table_mut())
                    .map(|t| Self::remove(t, key))
                    .unwrap_or(false))
            }
            None => Ok(Self::remove(&mut self.doc, key)),
        }
    }

    /// `agent.data_volume` from the global table.
    pub fn global_data_volume(&self) -> Option<String> {
        self.get("agent.data_volume", None)
    }

    /// `image.channel` from this document.
    pub fn image_channel(&self) -> Option<String> {
        self.get("image.channel", None)
    }

    /// Per-workspace `data_volume`.
    pub fn workspace_data_volume(&self, workspace: &Path) -> Option<String> {
        self.get("data_volume", Some(workspace))
    }

    /// Per-workspace `container_name`.
    pub fn workspace_container_name(&self, workspace: &Path) -> Option<String> {
        self.get("container_name", Some(workspace))
    }

    /// The raw `[env]` table, if present.
    pub fn env_section(&self) -> Option<&Table> {
        self.doc.get("env").and_then(|v| v.as_table())
    }

    /// `env.env_file`, a workspace-relative path.
    pub fn env_file(&self) -> Option<String> {
        self.get("env.env_file", None)
    }

    /// `env.from_host`, defaulting false.
    pub fn env_from_host(&self) -> bool {
        Self::lookup(&self.doc, "env.from_host")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// `import.exclude_priv`, defaulting true.
    pub fn import_exclude_priv(&self) -> bool {
        Self::lookup(&self.doc, "import.exclude_priv")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// `import.additional_paths`, dropping non-string items.
    pub fn import_additional_paths(&self) -> Vec<String> {
        Self::lookup(&self.doc, "import.additional_paths")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resolve the release channel: environment first, then `image.channel`
/// from the user config. The channel is deliberately global and never
/// reads the workspace-local file.
pub fn resolve_channel(paths: &Paths) -> Result<String> {
    for env in CHANNEL_ENVS {
        if let Ok(v) = std::env::var(env) {
            if !v.is_empty() {
                return validate_channel(&v);
            }
        }
    }
    let store = ConfigStore::load_user(paths)?;
    match store.image_channel() {
        Some(v) => validate_channel(&v),
        None => Ok("stable".to_string()),
    }
}

fn validate_channel(value: &str) -> Result<String> {
    if CHANNELS.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(CaiError::InvalidInput(format!(
            "unknown channel: {value} (expected stable or nightly)"
        )))
    }
}
