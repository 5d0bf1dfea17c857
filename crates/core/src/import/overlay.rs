//! Import overlays
//!
//! Files under `~/.config/containai/import-overrides/` replace the
//! corresponding manifest-mapped paths after the main copy. Mapping
//! uses the manifest's longest source prefix match; unmapped paths are
//! skipped.

use crate::errors::Result;
use crate::import::manifest::{self, ManifestEntry};
use std::path::{Path, PathBuf};

/// An overlay file ready to copy: its absolute host path and its
/// target path under the volume root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub host_path: PathBuf,
    pub rel_source: String,
    pub target: String,
    pub secret: bool,
}

/// Enumerate overlay files (sorted), skipping symlinks with a warning.
pub fn enumerate_overlay_files(root: &Path) -> Result<(Vec<PathBuf>, Vec<String>)> {
    let mut files = Vec::new();
    let mut warnings = Vec::new();
    if root.is_dir() {
        walk(root, &mut files, &mut warnings)?;
    }
    files.sort();
    Ok((files, warnings))
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>, warnings: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            warnings.push(format!("overlay symlink skipped: {}", path.display()));
            continue;
        }
        if file_type.is_dir() {
            walk(&path, files, warnings)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// A leading dot is prepended to the override-relative path when
/// absent, turning `ssh/config` into `.ssh/config`.
pub fn dotted_source(rel: &str) -> String {
    if rel.starts_with('.') {
        rel.to_string()
    } else {
        format!(".{rel}")
    }
}

/// Resolve overlay files against the manifest. Unmapped files yield a
/// warning and are dropped.
pub fn map_overlays(
    root: &Path,
    files: Vec<PathBuf>,
    entries: &[ManifestEntry],
) -> (Vec<Overlay>, Vec<String>) {
    let mut overlays = Vec::new();
    let mut warnings = Vec::new();
    for path in files {
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        let rel_source = dotted_source(&rel);
        match manifest::map_source_to_target(entries, &rel_source) {
            Some(target) => {
                let secret = manifest::entry_for_source(entries, &rel_source)
                    .map(ManifestEntry::is_secret)
                    .unwrap_or(false);
                overlays.push(Overlay {
                    host_path: path,
                    rel_source,
                    target,
                    secret,
                });
            }
            None => warnings.push(format!("overlay not covered by manifest: {rel_source}")),
        }
    }
    (overlays, warnings)
}
