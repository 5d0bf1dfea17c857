//! Environment import
//!
//! Builds the `.env` payload written into the data volume: an optional
//! workspace-relative env file merged with allow-listed host variables.
//! Path validation is strict because the env file name comes from
//! configuration, not from the user's direct input.

use crate::errors::{CaiError, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

static ENV_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env key regex"));

/// Whether a string is an importable environment variable name.
pub fn is_valid_env_key(key: &str) -> bool {
    ENV_KEY_RE.is_match(key)
}

/// Extract the allow list from the raw `env.import` array: items must
/// be strings and valid keys; duplicates keep the first occurrence.
/// Invalid items become warnings.
pub fn allow_list(items: &[toml::Value]) -> (Vec<String>, Vec<String>) {
    let mut keys: Vec<String> = Vec::new();
    let mut warnings = Vec::new();
    for item in items {
        match item.as_str() {
            Some(s) if is_valid_env_key(s) => {
                if !keys.iter().any(|k| k == s) {
                    keys.push(s.to_string());
                }
            }
            Some(s) => warnings.push(format!("env.import: invalid variable name: {s}")),
            None => warnings.push(format!("env.import: non-string item: {item}")),
        }
    }
    (keys, warnings)
}

/// Lexically normalize a path, resolving `.` and `..` components
/// without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Validate `env.env_file` against the workspace boundary.
///
/// Rejects absolute paths, paths escaping the workspace root, and
/// symlinks. Returns the resolved absolute path.
pub fn validate_env_file_path(workspace: &Path, value: &str) -> Result<PathBuf> {
    let rel = Path::new(value);
    if rel.is_absolute() {
        return Err(CaiError::InvalidInput(format!(
            "env_file path rejected: absolute path not allowed: {value}"
        )));
    }
    let root = workspace
        .canonicalize()
        .unwrap_or_else(|_| normalize(workspace));
    let full = normalize(&root.join(rel));
    if !full.starts_with(&root) {
        return Err(CaiError::InvalidInput(format!(
            "env_file path rejected: outside workspace boundary: {value}"
        )));
    }
    if full
        .symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
    {
        return Err(CaiError::InvalidInput(format!(
            "env_file path rejected: symlink: {value}"
        )));
    }
    Ok(full)
}

/// Parse an env file. Blank lines and `#` comments are skipped, an
/// `export ` prefix is stripped, and values opening a quote without a
/// same-line close are rejected with a warning.
pub fn parse_env_file(content: &str) -> (IndexMap<String, String>, Vec<String>) {
    let mut values = IndexMap::new();
    let mut warnings = Vec::new();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        let Some((key, value)) = line.split_once('=') else {
            warnings.push(format!("env file line {}: no '=' found", lineno + 1));
            continue;
        };
        let key = key.trim();
        if !is_valid_env_key(key) {
            warnings.push(format!("env file line {}: invalid key: {key}", lineno + 1));
            continue;
        }
        let value = value.trim();
        let value = if let Some(stripped) = unquote(value) {
            stripped
        } else if value.starts_with('"') || value.starts_with('\'') {
            warnings.push(format!(
                "env file line {}: unterminated quoted value for {key}",
                lineno + 1
            ));
            continue;
        } else {
            value.to_string()
        };
        values.insert(key.to_string(), value);
    }
    (values, warnings)
}

fn unquote(value: &str) -> Option<String> {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return Some(value[1..value.len() - 1].to_string());
        }
    }
    None
}

/// Read allow-listed variables from the host environment. Missing or
/// multiline values produce warnings.
pub fn collect_host_env(keys: &[String]) -> (IndexMap<String, String>, Vec<String>) {
    let mut values = IndexMap::new();
    let mut warnings = Vec::new();
    for key in keys {
        match std::env::var(key) {
            Ok(value) if value.contains('\n') => {
                warnings.push(format!("host variable {key} has a multiline value; skipped"));
            }
            Ok(value) => {
                values.insert(key.clone(), value);
            }
            Err(_) => warnings.push(format!("host variable {key} is not set")),
        }
    }
    (values, warnings)
}

/// Merge file values with host values; the host wins on conflicts while
/// the file's key order is preserved.
pub fn merge_env(
    file: IndexMap<String, String>,
    host: IndexMap<String, String>,
) -> IndexMap<String, String> {
    let mut merged = file;
    for (key, value) in host {
        merged.insert(key, value);
    }
    merged
}

/// Compose the `KEY=VALUE\n` stream written into the volume.
pub fn compose_env_stream(values: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}
