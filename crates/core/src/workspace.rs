//! Workspace naming
//!
//! A workspace is a host filesystem path. Its basename, sanitized to a
//! stable character set, keys port reservation files, SSH host aliases,
//! and container labels.

use std::path::Path;

/// Name used when a path has no usable final segment.
pub const DEFAULT_WORKSPACE_NAME: &str = "workspace";

/// The final path segment of a workspace, or `"workspace"` when empty.
pub fn workspace_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_WORKSPACE_NAME)
        .to_string()
}

/// Sanitize a workspace name for use as a filesystem and label key.
///
/// Every character outside `[A-Za-z0-9._-]` collapses to `-`, runs of
/// `-` collapse to one, and leading/trailing `-` are trimmed. An empty
/// result falls back to `"workspace"`. Idempotent.
pub fn sanitize_workspace_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            out.push(c);
            last_dash = c == '-';
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    // Collapse runs that mixed literal dashes with replacements.
    let mut collapsed = String::with_capacity(out.len());
    let mut prev_dash = false;
    for c in out.chars() {
        if c == '-' {
            if !prev_dash {
                collapsed.push(c);
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        DEFAULT_WORKSPACE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
