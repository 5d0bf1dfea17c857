//! Garbage collection of managed containers and images
//!
//! Age-based pruning of managed exited containers, with an opt-in image
//! sweep over the fixed ContainAI repository prefixes. Interactive runs
//! prompt before removal; non-interactive runs refuse without `--force`.

use crate::engine::{self, Engine};
use crate::errors::{CaiError, Result};
use chrono::{DateTime, Duration, Utc};
use std::io::IsTerminal;
use tracing::{debug, warn};

/// Default pruning age.
pub const DEFAULT_AGE: &str = "30d";

/// Image repository prefixes owned by ContainAI.
pub const IMAGE_PREFIXES: [&str; 2] = ["containai/", "ghcr.io/novotnyllc/containai"];

/// Docker's zero value for `FinishedAt` on never-finished containers.
const FINISHED_AT_DEFAULT: &str = "0001-01-01T00:00:00Z";

/// GC options.
#[derive(Debug, Clone)]
pub struct GcOptions {
    pub age: String,
    pub dry_run: bool,
    pub force: bool,
    pub images: bool,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self {
            age: DEFAULT_AGE.to_string(),
            dry_run: false,
            force: false,
            images: false,
        }
    }
}

/// Parse the age grammar `<int>(d|h)`, case-insensitive.
pub fn parse_age(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: i64 = digits.parse().map_err(|_| {
        CaiError::InvalidInput(format!("invalid age: {raw} (expected <int>d or <int>h)"))
    })?;
    match unit.to_ascii_lowercase().as_str() {
        "d" => Ok(Duration::days(value)),
        "h" => Ok(Duration::hours(value)),
        _ => Err(CaiError::InvalidInput(format!(
            "invalid age: {raw} (expected <int>d or <int>h)"
        ))),
    }
}

/// One candidate container.
#[derive(Debug, Clone)]
pub struct GcCandidate {
    pub id: String,
    pub status: String,
    pub finished_at: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub keep: bool,
}

impl GcCandidate {
    /// Parse `Status|FinishedAt|Created|keep` inspect output.
    pub fn parse(id: &str, line: &str) -> Self {
        let mut parts = line.trim().splitn(4, '|');
        let status = parts.next().unwrap_or_default().to_string();
        let finished_at = parts.next().and_then(parse_engine_time);
        let created = parts.next().and_then(parse_engine_time);
        let keep = parts
            .next()
            .map(|k| k.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            id: id.to_string(),
            status,
            finished_at,
            created,
            keep,
        }
    }

    /// Reference instant for the age computation: `FinishedAt` when it
    /// is a real timestamp, else `Created`.
    pub fn age_reference(&self) -> Option<DateTime<Utc>> {
        self.finished_at.or(self.created)
    }

    /// Whether this container should be pruned at `now` given `max_age`.
    pub fn should_prune(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if self.status == "running" || self.keep {
            return false;
        }
        match self.age_reference() {
            Some(reference) => now.signed_duration_since(reference) >= max_age,
            None => false,
        }
    }
}

fn parse_engine_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == FINISHED_AT_DEFAULT || raw.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn collect_candidates(eng: &dyn Engine) -> Result<Vec<GcCandidate>> {
    let mut candidates = Vec::new();
    for status in ["exited", "created"] {
        let status_filter = format!("status={status}");
        let args: Vec<String> = [
            "ps",
            "-aq",
            "--filter",
            "label=containai.managed=true",
            "--filter",
            status_filter.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let out = engine::capture_checked(eng, &args).await?;
        for id in out.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if candidates.iter().any(|c: &GcCandidate| c.id == id) {
                continue;
            }
            let inspect: Vec<String> = [
                "inspect",
                "--format",
                "{{.State.Status}}|{{.State.FinishedAt}}|{{.Created}}|{{index .Config.Labels \"containai.keep\"}}",
                "--",
                id,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect();
            match engine::capture_checked(eng, &inspect).await {
                Ok(out) => candidates.push(GcCandidate::parse(id, &out.stdout)),
                Err(e) => warn!(id, "inspect failed during gc: {e}"),
            }
        }
    }
    Ok(candidates)
}

/// Run garbage collection; returns the process exit code.
pub async fn run_gc(eng: &dyn Engine, opts: &GcOptions) -> Result<i32> {
    let max_age = parse_age(&opts.age)?;
    let now = Utc::now();

    let candidates = collect_candidates(eng).await?;
    let prunable: Vec<&GcCandidate> = candidates
        .iter()
        .filter(|c| c.should_prune(now, max_age))
        .collect();

    if opts.dry_run {
        for candidate in &prunable {
            println!("Would remove container {}", candidate.id);
        }
    } else if !prunable.is_empty() {
        if !opts.force {
            if std::io::stdin().is_terminal() {
                if !confirm(&format!(
                    "About to remove {} containers. Continue? [y/N] ",
                    prunable.len()
                ))? {
                    return Ok(0);
                }
            } else {
                eprintln!("Refusing to remove containers in non-interactive mode; use --force");
                return Ok(1);
            }
        }
        let mut failures = 0;
        for candidate in &prunable {
            let args: Vec<String> = ["rm", "-f", &candidate.id]
                .iter()
                .map(|s| s.to_string())
                .collect();
            match engine::capture_checked(eng, &args).await {
                Ok(_) => debug!(id = %candidate.id, "removed container"),
                Err(e) => {
                    eprintln!("failed to remove {}: {e}", candidate.id);
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            return Ok(1);
        }
    }

    if opts.images && (opts.force || opts.dry_run) {
        prune_images(eng, opts.dry_run).await?;
    }

    Ok(0)
}

async fn prune_images(eng: &dyn Engine, dry_run: bool) -> Result<()> {
    let args: Vec<String> = ["images", "--format", "{{.Repository}} {{.ID}}"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = engine::capture_checked(eng, &args).await?;
    for line in out.stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(repository), Some(id)) = (parts.next(), parts.next()) else {
            continue;
        };
        if !IMAGE_PREFIXES.iter().any(|p| repository.starts_with(p)) {
            continue;
        }
        if dry_run {
            println!("Would remove image {repository} ({id})");
            continue;
        }
        let rm: Vec<String> = ["rmi", "-f", id].iter().map(|s| s.to_string()).collect();
        if let Err(e) = engine::capture_checked(eng, &rm).await {
            eprintln!("failed to remove image {repository}: {e}");
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::FakeEngine;
    use crate::process::CaptureOutput;

    #[test]
    fn age_grammar() {
        assert_eq!(parse_age("30d").expect("parse"), Duration::days(30));
        assert_eq!(parse_age("12h").expect("parse"), Duration::hours(12));
        assert_eq!(parse_age("7D").expect("parse"), Duration::days(7));
        assert!(parse_age("30").is_err());
        assert!(parse_age("d").is_err());
        assert!(parse_age("30m").is_err());
        assert!(parse_age("").is_err());
    }

    #[test]
    fn candidate_parsing_and_age_reference() {
        let c = GcCandidate::parse(
            "abc",
            "exited|2026-06-01T00:00:00Z|2026-05-01T00:00:00Z|\n",
        );
        assert_eq!(c.status, "exited");
        assert_eq!(
            c.age_reference().expect("ref"),
            DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
                .expect("time")
                .with_timezone(&Utc)
        );

        // Default FinishedAt falls back to Created.
        let c = GcCandidate::parse(
            "abc",
            "created|0001-01-01T00:00:00Z|2026-05-01T00:00:00Z|false\n",
        );
        assert_eq!(
            c.age_reference().expect("ref"),
            DateTime::parse_from_rfc3339("2026-05-01T00:00:00Z")
                .expect("time")
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn prune_decision_honors_keep_running_and_age() {
        let now = DateTime::parse_from_rfc3339("2026-07-01T00:00:00Z")
            .expect("time")
            .with_timezone(&Utc);
        let age = Duration::days(30);

        let old = GcCandidate::parse("a", "exited|2026-05-01T00:00:00Z||");
        assert!(old.should_prune(now, age));

        let young = GcCandidate::parse("b", "exited|2026-06-20T00:00:00Z||");
        assert!(!young.should_prune(now, age));

        let kept = GcCandidate::parse("c", "exited|2026-01-01T00:00:00Z||TRUE");
        assert!(!kept.should_prune(now, age));

        let running = GcCandidate::parse("d", "running|2026-01-01T00:00:00Z||");
        assert!(!running.should_prune(now, age));
    }

    #[tokio::test]
    async fn dry_run_lists_only_old_containers() {
        let fake = FakeEngine::new();
        fake.respond(
            "status=exited",
            CaptureOutput {
                exit_code: 0,
                stdout: "old1\nyoung1\n".to_string(),
                stderr: String::new(),
            },
        );
        let old_finished = (Utc::now() - Duration::days(40)).to_rfc3339();
        let young_finished = (Utc::now() - Duration::days(5)).to_rfc3339();
        fake.respond(
            "-- old1",
            CaptureOutput {
                exit_code: 0,
                stdout: format!("exited|{old_finished}||\n"),
                stderr: String::new(),
            },
        );
        fake.respond(
            "-- young1",
            CaptureOutput {
                exit_code: 0,
                stdout: format!("exited|{young_finished}||\n"),
                stderr: String::new(),
            },
        );

        let opts = GcOptions {
            dry_run: true,
            ..Default::default()
        };
        let code = run_gc(&fake, &opts).await.expect("gc");
        assert_eq!(code, 0);
        // No rm was issued.
        assert!(!fake.calls().iter().any(|c| c.first().map(String::as_str) == Some("rm")));
    }

    #[tokio::test]
    async fn force_removes_and_counts_failures() {
        let fake = FakeEngine::new();
        fake.respond(
            "status=exited",
            CaptureOutput {
                exit_code: 0,
                stdout: "old1\n".to_string(),
                stderr: String::new(),
            },
        );
        let old_finished = (Utc::now() - Duration::days(40)).to_rfc3339();
        fake.respond(
            "-- old1",
            CaptureOutput {
                exit_code: 0,
                stdout: format!("exited|{old_finished}||\n"),
                stderr: String::new(),
            },
        );
        fake.respond(
            "rm -f old1",
            CaptureOutput {
                exit_code: 1,
                stderr: "cannot remove".to_string(),
                ..Default::default()
            },
        );

        let opts = GcOptions {
            force: true,
            ..Default::default()
        };
        let code = run_gc(&fake, &opts).await.expect("gc");
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn image_sweep_only_touches_containai_prefixes() {
        let fake = FakeEngine::new();
        fake.respond(
            "images --format",
            CaptureOutput {
                exit_code: 0,
                stdout: "containai/agent img1\nubuntu img2\nghcr.io/novotnyllc/containai/base img3\n"
                    .to_string(),
                stderr: String::new(),
            },
        );

        let opts = GcOptions {
            dry_run: true,
            images: true,
            ..Default::default()
        };
        let code = run_gc(&fake, &opts).await.expect("gc");
        assert_eq!(code, 0);
        // Dry run: nothing removed.
        assert!(!fake.calls().iter().any(|c| c.first().map(String::as_str) == Some("rmi")));
    }
}
