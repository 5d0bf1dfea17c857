//! Engine argument vector analysis
//!
//! Classifies an intercepted `docker` argv, extracts devcontainer
//! labels, and strips wrapper-only flags. Classification looks at the
//! first two positional tokens only; everything starting with `-` is
//! ignored.

/// Classification of an intercepted argv.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgvClass {
    /// `run`, `create`, `container run`, or `container create`
    ContainerCreate,
    /// Anything else; passed through (possibly with a context injected)
    Passthrough,
}

/// Subcommands that target an existing container by name or id.
pub const CONTAINER_SUBCOMMANDS: [&str; 13] = [
    "exec", "inspect", "start", "stop", "rm", "logs", "restart", "kill", "pause", "unpause",
    "port", "stats", "top",
];

/// First two positional (non-flag) tokens.
fn positionals(args: &[String]) -> (Option<&str>, Option<&str>) {
    let mut iter = args.iter().filter(|t| !t.starts_with('-'));
    (iter.next().map(String::as_str), iter.next().map(String::as_str))
}

/// Classify an argv per the create-command rule.
pub fn classify(args: &[String]) -> ArgvClass {
    match positionals(args) {
        (Some("run"), _) | (Some("create"), _) => ArgvClass::ContainerCreate,
        (Some("container"), Some("run")) | (Some("container"), Some("create")) => {
            ArgvClass::ContainerCreate
        }
        _ => ArgvClass::Passthrough,
    }
}

/// The first positional token, if any.
pub fn first_positional(args: &[String]) -> Option<&str> {
    positionals(args).0
}

/// The first non-flag token after the first occurrence of `subcommand`.
pub fn positional_after<'a>(args: &'a [String], subcommand: &str) -> Option<&'a str> {
    let idx = args.iter().position(|t| t == subcommand)?;
    args[idx + 1..]
        .iter()
        .find(|t| !t.starts_with('-'))
        .map(String::as_str)
}

/// Whether the vector already pins a context explicitly.
pub fn has_context_flag(args: &[String]) -> bool {
    args.iter()
        .any(|t| t == "--context" || t.starts_with("--context="))
}

/// Whether any token references devcontainer or ContainAI metadata.
pub fn references_managed_metadata(args: &[String]) -> bool {
    args.iter()
        .any(|t| t.contains("devcontainer.") || t.contains("containai."))
}

/// Strip wrapper flags, preserving order. Returns the cleaned vector and
/// whether `--verbose` / `--quiet` were seen.
pub fn strip_wrapper_flags(args: &[String]) -> (Vec<String>, bool, bool) {
    let mut verbose = false;
    let mut quiet = false;
    let cleaned = args
        .iter()
        .filter(|t| {
            if *t == "--verbose" {
                verbose = true;
                false
            } else if *t == "--quiet" {
                quiet = true;
                false
            } else {
                true
            }
        })
        .cloned()
        .collect();
    (cleaned, verbose, quiet)
}

/// Extract the value of `--label <key>=<value>` (split form) or
/// `--label=<key>=<value>` for a given key.
pub fn extract_label(args: &[String], key: &str) -> Option<String> {
    let mut iter = args.iter().peekable();
    while let Some(tok) = iter.next() {
        let pair = if tok == "--label" {
            iter.peek().map(|t| t.as_str())
        } else {
            tok.strip_prefix("--label=")
        };
        if let Some(pair) = pair {
            if let Some((k, v)) = pair.split_once('=') {
                if k == key {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

/// Copy `args`, injecting `injection` after every bare `run` or
/// `create` token.
pub fn inject_after_create_tokens(args: &[String], injection: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len() + injection.len());
    for tok in args {
        out.push(tok.clone());
        if tok == "run" || tok == "create" {
            out.extend(injection.iter().cloned());
        }
    }
    out
}
