//! Devcontainer feature settings
//!
//! Reads a devcontainer configuration written as JSON-with-comments,
//! strips the comments without disturbing line numbers, and extracts the
//! ContainAI feature block that drives the create transform.

use crate::errors::{CaiError, Result};
use crate::volume::{is_valid_volume_name, DEFAULT_DATA_VOLUME};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Default in-container user when the feature block names none.
pub const DEFAULT_REMOTE_USER: &str = "vscode";

static REMOTE_USER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_-]*$").expect("valid remote user regex"));

/// Settings extracted from the ContainAI feature block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSettings {
    /// Whether any `.features` key case-insensitively contains `containai`.
    pub has_containai_feature: bool,
    /// Named data volume; validated, defaulting to `containai-data`.
    pub data_volume: String,
    /// Whether credential-bearing mounts are allowed unconditionally.
    pub enable_credentials: bool,
    /// In-container user for the SSH host alias.
    pub remote_user: String,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            has_containai_feature: false,
            data_volume: DEFAULT_DATA_VOLUME.to_string(),
            enable_credentials: false,
            remote_user: DEFAULT_REMOTE_USER.to_string(),
        }
    }
}

/// Strip JSONC comments, preserving every newline so line numbers in
/// later parse errors still point at the original text. Idempotent.
pub fn strip_jsonc_comments(input: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        InString,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(input.len());
    let mut state = State::Code;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '"' => {
                    state = State::InString;
                    out.push(c);
                }
                '/' => match chars.peek() {
                    Some('/') => {
                        chars.next();
                        state = State::LineComment;
                    }
                    Some('*') => {
                        chars.next();
                        state = State::BlockComment;
                    }
                    _ => out.push(c),
                },
                _ => out.push(c),
            },
            State::InString => {
                out.push(c);
                match c {
                    '\\' => {
                        if let Some(next) = chars.next() {
                            out.push(next);
                        }
                    }
                    '"' => state = State::Code,
                    _ => {}
                }
            }
            State::LineComment => {
                if c == '\n' {
                    out.push(c);
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '\n' {
                    out.push(c);
                } else if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                }
            }
        }
    }
    out
}

/// Whether a remote user name is acceptable.
pub fn is_valid_remote_user(user: &str) -> bool {
    REMOTE_USER_RE.is_match(user)
}

fn decode_truthy(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse feature settings from devcontainer JSONC text.
pub fn parse_feature_settings(text: &str) -> Result<FeatureSettings> {
    let stripped = strip_jsonc_comments(text);
    let doc: serde_json::Value = serde_json::from_str(&stripped)
        .map_err(|e| CaiError::Config(format!("devcontainer config: {e}")))?;

    let mut settings = FeatureSettings::default();

    let feature_block = doc
        .get("features")
        .and_then(|f| f.as_object())
        .and_then(|features| {
            features
                .iter()
                .find(|(key, _)| key.to_ascii_lowercase().contains("containai"))
        });

    if let Some((key, value)) = feature_block {
        debug!(feature = %key, "found ContainAI feature");
        settings.has_containai_feature = true;

        if let Some(volume) = value.get("dataVolume").and_then(|v| v.as_str()) {
            if is_valid_volume_name(volume) {
                settings.data_volume = volume.to_string();
            }
        }
        if let Some(enable) = value.get("enableCredentials").and_then(decode_truthy) {
            settings.enable_credentials = enable;
        }
        if let Some(user) = value.get("remoteUser").and_then(|v| v.as_str()) {
            if is_valid_remote_user(user) {
                settings.remote_user = user.to_string();
            }
        }
    }

    // A top-level remoteUser overrides the feature block when valid.
    if let Some(user) = doc.get("remoteUser").and_then(|v| v.as_str()) {
        if is_valid_remote_user(user) {
            settings.remote_user = user.to_string();
        }
    }

    Ok(settings)
}

/// Read and parse a devcontainer config file.
pub fn read_feature_settings(path: &Path) -> Result<FeatureSettings> {
    let text = std::fs::read_to_string(path)?;
    parse_feature_settings(&text)
}
