//! Template Dockerfile rewriting
//!
//! Upgrades a template's first `FROM` line to the `ARG BASE_IMAGE`
//! pattern so the base image can be swapped at build time. The rewrite
//! is idempotent: applying it twice equals applying it once.

use crate::errors::{CaiError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static AS_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+as\s+").expect("valid AS boundary regex"));

/// Rewrite a Dockerfile source. `None` means no change is needed, i.e.
/// both `${BASE_IMAGE}` and `ARG BASE_IMAGE` already appear.
pub fn upgrade_dockerfile(source: &str) -> Option<String> {
    if source.contains("${BASE_IMAGE}") && source.contains("ARG BASE_IMAGE") {
        return None;
    }

    let had_trailing_newline = source.ends_with('\n');
    let lines: Vec<&str> = source.lines().collect();
    let from_idx = lines.iter().position(|line| {
        let trimmed = line.trim_start();
        trimmed
            .get(..5)
            .map(|prefix| prefix.eq_ignore_ascii_case("FROM "))
            .unwrap_or(false)
    })?;

    let line = lines[from_idx];
    let indent_len = line.len() - line.trim_start().len();
    let indent = &line[..indent_len];
    let payload = line.trim_start()[5..].trim();

    let (base_image, stage) = match AS_BOUNDARY_RE.find(payload) {
        Some(m) => (&payload[..m.start()], Some(&payload[m.end()..])),
        None => (payload, None),
    };

    let replacement_from = match stage {
        Some(stage) => format!("{indent}FROM ${{BASE_IMAGE}} AS {stage}"),
        None => format!("{indent}FROM ${{BASE_IMAGE}}"),
    };

    let mut out_lines: Vec<String> = Vec::with_capacity(lines.len() + 1);
    for (i, l) in lines.iter().enumerate() {
        if i == from_idx {
            out_lines.push(format!("{indent}ARG BASE_IMAGE={base_image}"));
            out_lines.push(replacement_from.clone());
        } else {
            out_lines.push((*l).to_string());
        }
    }

    let mut out = out_lines.join("\n");
    if had_trailing_newline {
        out.push('\n');
    }
    Some(out)
}

/// Upgrade a Dockerfile on disk; returns whether the file changed.
pub fn upgrade_dockerfile_file(path: &Path) -> Result<bool> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        CaiError::Config(format!("cannot read template {}: {e}", path.display()))
    })?;
    match upgrade_dockerfile(&source) {
        Some(updated) => {
            std::fs::write(path, updated)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_plain_from() {
        let input = "FROM alpine:3.20\nRUN true\n";
        let out = upgrade_dockerfile(input).expect("rewrite");
        assert_eq!(
            out,
            "ARG BASE_IMAGE=alpine:3.20\nFROM ${BASE_IMAGE}\nRUN true\n"
        );
    }

    #[test]
    fn rewrites_from_with_stage() {
        let input = "FROM alpine:3.20 AS build\nRUN true\n";
        let out = upgrade_dockerfile(input).expect("rewrite");
        assert_eq!(
            out,
            "ARG BASE_IMAGE=alpine:3.20\nFROM ${BASE_IMAGE} AS build\nRUN true\n"
        );
    }

    #[test]
    fn stage_boundary_is_case_insensitive() {
        let input = "from alpine:3.20 as build\n";
        let out = upgrade_dockerfile(input).expect("rewrite");
        assert!(out.contains("ARG BASE_IMAGE=alpine:3.20"));
        assert!(out.contains("FROM ${BASE_IMAGE} AS build"));
    }

    #[test]
    fn preserves_indentation() {
        let input = "  FROM alpine:3.20\n";
        let out = upgrade_dockerfile(input).expect("rewrite");
        assert_eq!(out, "  ARG BASE_IMAGE=alpine:3.20\n  FROM ${BASE_IMAGE}\n");
    }

    #[test]
    fn preserves_missing_trailing_newline() {
        let input = "FROM alpine:3.20";
        let out = upgrade_dockerfile(input).expect("rewrite");
        assert_eq!(out, "ARG BASE_IMAGE=alpine:3.20\nFROM ${BASE_IMAGE}");
    }

    #[test]
    fn skips_comments_before_from() {
        let input = "# syntax=docker/dockerfile:1\nFROM ubuntu:24.04\n";
        let out = upgrade_dockerfile(input).expect("rewrite");
        assert_eq!(
            out,
            "# syntax=docker/dockerfile:1\nARG BASE_IMAGE=ubuntu:24.04\nFROM ${BASE_IMAGE}\n"
        );
    }

    #[test]
    fn idempotent_on_second_run() {
        let input = "FROM alpine:3.20 AS build\nRUN true\n";
        let once = upgrade_dockerfile(input).expect("rewrite");
        assert!(upgrade_dockerfile(&once).is_none());
    }

    #[test]
    fn no_from_line_yields_no_rewrite() {
        assert!(upgrade_dockerfile("RUN true\n").is_none());
    }

    #[test]
    fn file_wrapper_reports_change_state() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("Dockerfile");
        std::fs::write(&path, "FROM alpine:3.20 AS build\n").expect("write");

        assert!(upgrade_dockerfile_file(&path).expect("first"));
        assert!(!upgrade_dockerfile_file(&path).expect("second"));
        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(
            content,
            "ARG BASE_IMAGE=alpine:3.20\nFROM ${BASE_IMAGE} AS build\n"
        );
    }
}
