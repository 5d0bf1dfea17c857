//! Import manifest model
//!
//! Each entry describes one file or directory to materialize from the
//! host into the data volume. The flag string is a character set; the
//! grammar is shared with the standalone manifest tooling and only the
//! fields consumed here are modeled.

use crate::errors::{CaiError, Result};
use crate::paths::Paths;
use serde::Deserialize;

/// One manifest record.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    #[serde(rename = "type", default)]
    pub entry_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub flags: String,
    #[serde(default)]
    pub optional: bool,
}

impl ManifestEntry {
    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.contains(flag)
    }

    /// `d`: the entry is a directory tree.
    pub fn is_dir(&self) -> bool {
        self.has_flag('d')
    }

    /// `f`: the entry is a single file.
    pub fn is_file(&self) -> bool {
        self.has_flag('f')
    }

    /// `s`: secret material; strict permissions, skippable.
    pub fn is_secret(&self) -> bool {
        self.has_flag('s')
    }

    /// `m`: mirror deletions from the source.
    pub fn mirror_delete(&self) -> bool {
        self.has_flag('m')
    }

    /// `x`: exclude `.system/` subtrees.
    pub fn exclude_system(&self) -> bool {
        self.has_flag('x')
    }

    /// `p`: honor the `*.priv.*` filter.
    pub fn priv_filter(&self) -> bool {
        self.has_flag('p')
    }

    /// `g`: run the git-config filter after copy.
    pub fn git_filter(&self) -> bool {
        self.has_flag('g')
    }

    /// `j`: seed an empty JSON object when the file is empty.
    pub fn seed_json(&self) -> bool {
        self.has_flag('j')
    }

    /// `G`: global entry, never copied per-workspace.
    pub fn is_global(&self) -> bool {
        self.has_flag('G')
    }
}

#[derive(Debug, Deserialize)]
struct ManifestDoc {
    #[serde(rename = "entry", default)]
    entries: Vec<ManifestEntry>,
}

/// Built-in manifest used when no user manifest is installed.
pub const DEFAULT_MANIFEST: &str = r#"
[[entry]]
type = "entry"
source = ".ssh"
target = "ssh"
flags = "dsm"

[[entry]]
type = "entry"
source = ".gitconfig"
target = "gitconfig"
flags = "fg"
optional = true

[[entry]]
type = "entry"
source = ".bashrc.d"
target = "shell/bashrc.d"
flags = "dmp"
optional = true

[[entry]]
type = "entry"
source = ".claude"
target = "claude"
flags = "dmx"
optional = true

[[entry]]
type = "entry"
source = ".claude.json"
target = "claude.json"
flags = "fj"
optional = true

[[entry]]
type = "entry"
source = ".aws"
target = "aws"
flags = "ds"
optional = true

[[entry]]
type = "entry"
source = ".config/gh"
target = "config/gh"
flags = "ds"
optional = true

[[entry]]
type = "entry"
source = ".config/containai/templates"
target = "system/templates"
flags = "dG"
optional = true
"#;

/// Parse manifest text.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>> {
    let doc: ManifestDoc =
        toml::from_str(text).map_err(|e| CaiError::Config(format!("manifest: {e}")))?;
    Ok(doc.entries)
}

/// Load the user manifest when installed, else the built-in one.
pub fn load_manifest(paths: &Paths) -> Result<Vec<ManifestEntry>> {
    let user = paths.manifest_file();
    if user.is_file() {
        let text = std::fs::read_to_string(&user)?;
        parse_manifest(&text)
    } else {
        parse_manifest(DEFAULT_MANIFEST)
    }
}

/// Entries eligible for a per-workspace import: `type == "entry"`,
/// non-empty source, not global. Order is preserved.
pub fn import_entries(entries: Vec<ManifestEntry>) -> Vec<ManifestEntry> {
    entries
        .into_iter()
        .filter(|e| e.entry_type == "entry" && !e.source.is_empty() && !e.is_global())
        .collect()
}

/// Map a home-relative source path (leading dot form, e.g.
/// `.ssh/config`) to its volume target via the longest source prefix
/// match. Directory entries match as a prefix with a trailing slash;
/// file entries require exact equality.
pub fn map_source_to_target(entries: &[ManifestEntry], rel_source: &str) -> Option<String> {
    let mut best: Option<(&ManifestEntry, String)> = None;
    for entry in entries {
        let mapped = if entry.is_dir() {
            if rel_source == entry.source {
                Some(entry.target.clone())
            } else {
                rel_source
                    .strip_prefix(&format!("{}/", entry.source))
                    .map(|rest| format!("{}/{rest}", entry.target))
            }
        } else if rel_source == entry.source {
            Some(entry.target.clone())
        } else {
            None
        };
        if let Some(mapped) = mapped {
            let better = best
                .as_ref()
                .map(|(b, _)| entry.source.len() > b.source.len())
                .unwrap_or(true);
            if better {
                best = Some((entry, mapped));
            }
        }
    }
    best.map(|(_, mapped)| mapped)
}

/// The entry whose source governs a home-relative path, if any.
pub fn entry_for_source<'a>(
    entries: &'a [ManifestEntry],
    rel_source: &str,
) -> Option<&'a ManifestEntry> {
    let mut best: Option<&ManifestEntry> = None;
    for entry in entries {
        let matches = if entry.is_dir() {
            rel_source == entry.source
                || rel_source.starts_with(&format!("{}/", entry.source))
        } else {
            rel_source == entry.source
        };
        if matches {
            let better = best
                .map(|b| entry.source.len() > b.source.len())
                .unwrap_or(true);
            if better {
                best = Some(entry);
            }
        }
    }
    best
}
