//! Import engine
//!
//! Materializes host state into the data volume from a manifest: copy
//! via a disposable rsync container, permission and symlink handling,
//! git-config filtering, additional paths, environment import, and
//! overlays. Volume contents are only ever mutated through disposable
//! containers so uid/gid semantics match the container user.

pub mod envfile;
pub mod manifest;
pub mod overlay;

use crate::config::ConfigStore;
use crate::engine::{self, Engine};
use crate::errors::{CaiError, Result};
use crate::paths::Paths;
use crate::process::CaptureOutput;
use crate::volume::resolve_data_volume;
use chrono::Utc;
use manifest::ManifestEntry;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper image for in-volume shell scripts.
pub const HELPER_IMAGE: &str = "alpine:3.20";

/// Override for the rsync helper image.
pub const RSYNC_IMAGE_ENV: &str = "CONTAINAI_RSYNC_IMAGE";

/// Default rsync helper image.
pub const DEFAULT_RSYNC_IMAGE: &str = "instrumentisto/rsync-ssh";

/// Volume-side mount point, fixed across every helper.
pub const VOLUME_MOUNT: &str = "/mnt/agent-data";

/// Options for one import run.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Source: a directory or a `.tgz` archive; defaults to the home dir.
    pub from: Option<String>,
    /// Explicit volume, overriding the resolution chain.
    pub volume: Option<String>,
    /// Explicit config file, overriding discovery.
    pub config_path: Option<PathBuf>,
    pub dry_run: bool,
    pub no_excludes: bool,
    pub no_secrets: bool,
    pub verbose: bool,
}

enum ImportSource {
    Archive(PathBuf),
    Directory(PathBuf),
}

fn rsync_image() -> String {
    std::env::var(RSYNC_IMAGE_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_RSYNC_IMAGE.to_string())
}

fn warn_line(message: &str) {
    eprintln!("[WARN] {message}");
}

fn sh_quote(value: &str) -> String {
    shell_words::quote(value).into_owned()
}

/// Run an in-volume shell script through a disposable helper container.
async fn volume_sh(
    eng: &dyn Engine,
    volume: &str,
    extra_mounts: &[String],
    script: &str,
) -> Result<CaptureOutput> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{volume}:{VOLUME_MOUNT}"),
    ];
    for mount in extra_mounts {
        args.push("-v".to_string());
        args.push(mount.clone());
    }
    args.push(HELPER_IMAGE.to_string());
    args.push("sh".to_string());
    args.push("-lc".to_string());
    args.push(script.to_string());
    engine::capture_checked(eng, &args).await
}

/// Like [`volume_sh`] but feeds `stdin` to the script.
async fn volume_sh_stdin(
    eng: &dyn Engine,
    volume: &str,
    script: &str,
    stdin: &str,
) -> Result<CaptureOutput> {
    let args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-i".to_string(),
        "-v".to_string(),
        format!("{volume}:{VOLUME_MOUNT}"),
        HELPER_IMAGE.to_string(),
        "sh".to_string(),
        "-lc".to_string(),
        script.to_string(),
    ];
    let out = eng.capture_with_stdin(&args, stdin).await?;
    if out.success() {
        Ok(out)
    } else {
        Err(CaiError::Engine {
            stderr: out.stderr.trim().to_string(),
            exit_code: out.exit_code,
        })
    }
}

/// Entry point: synchronize host state into the data volume.
pub async fn run_import(
    eng: &dyn Engine,
    paths: &Paths,
    workspace: &Path,
    opts: &ImportOptions,
) -> Result<()> {
    let config = match &opts.config_path {
        Some(path) => ConfigStore::load_from(path)?,
        None => ConfigStore::discover(workspace, paths)?,
    };

    let volume = resolve_data_volume(opts.volume.as_deref(), &config, Some(workspace))?;
    let source = resolve_source(paths, opts.from.as_deref())?;
    let exclude_priv = config.import_exclude_priv() && !opts.no_excludes;

    if opts.dry_run {
        println!("Would create volume {volume}");
    } else {
        engine::ensure_volume(eng, &volume).await?;
    }

    let entries = manifest::import_entries(manifest::load_manifest(paths)?);

    match source {
        ImportSource::Archive(archive) => {
            restore_archive(eng, &volume, &archive, exclude_priv, opts).await?;
        }
        ImportSource::Directory(root) => {
            sync_directory(eng, paths, &config, &volume, &root, &entries, exclude_priv, opts)
                .await?;
            env_import(eng, &config, &volume, workspace, opts).await?;
        }
    }

    apply_overlays(eng, paths, &volume, &entries, opts).await?;
    Ok(())
}

fn resolve_source(paths: &Paths, from: Option<&str>) -> Result<ImportSource> {
    let path = match from {
        Some(raw) => expand_tilde(paths.home(), raw),
        None => paths.home().to_path_buf(),
    };
    if !path.exists() {
        return Err(CaiError::InvalidInput(format!(
            "import source does not exist: {}",
            path.display()
        )));
    }
    if path.is_file() && path.extension().map(|e| e == "tgz").unwrap_or(false) {
        Ok(ImportSource::Archive(path))
    } else if path.is_dir() {
        Ok(ImportSource::Directory(path))
    } else {
        Err(CaiError::InvalidInput(format!(
            "import source is neither a directory nor a .tgz archive: {}",
            path.display()
        )))
    }
}

fn expand_tilde(home: &Path, raw: &str) -> PathBuf {
    if raw == "~" {
        home.to_path_buf()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}

/// Archive restore: clear the volume, extract, done. Overlays still run
/// afterwards; the env-file import does not.
async fn restore_archive(
    eng: &dyn Engine,
    volume: &str,
    archive: &Path,
    exclude_priv: bool,
    opts: &ImportOptions,
) -> Result<()> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CaiError::InvalidInput("archive has no usable name".to_string()))?;
    let dir = archive
        .parent()
        .ok_or_else(|| CaiError::InvalidInput("archive has no parent directory".to_string()))?;

    let mut tar = format!("tar -xzf /backup/{} -C {VOLUME_MOUNT}", sh_quote(name));
    if exclude_priv {
        tar.push_str(" --exclude='./shell/bashrc.d/*.priv.*' --exclude='shell/bashrc.d/*.priv.*'");
    }
    let script = format!("find {VOLUME_MOUNT} -mindepth 1 -delete && {tar}");

    if opts.dry_run {
        println!("Would restore {} into volume {volume}", archive.display());
        return Ok(());
    }
    debug!(archive = %archive.display(), "restoring archive");
    volume_sh(
        eng,
        volume,
        &[format!("{}:/backup:ro", dir.display())],
        &script,
    )
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn sync_directory(
    eng: &dyn Engine,
    paths: &Paths,
    config: &ConfigStore,
    volume: &str,
    root: &Path,
    entries: &[ManifestEntry],
    exclude_priv: bool,
    opts: &ImportOptions,
) -> Result<()> {
    for entry in entries {
        if opts.no_secrets && entry.is_secret() {
            debug!(source = %entry.source, "skipping secret entry");
            continue;
        }
        let src = root.join(&entry.source);
        if !src.exists() {
            if !entry.optional && opts.verbose {
                warn_line(&format!("missing import source: {}", src.display()));
            }
            continue;
        }
        if opts.dry_run {
            println!("Would sync {} -> {}", src.display(), entry.target);
            continue;
        }

        initialize_target(eng, volume, entry).await?;
        copy_entry(eng, volume, root, entry, exclude_priv).await?;

        if entry.git_filter() {
            apply_git_filter(eng, volume, &entry.target).await?;
        }
        if entry.is_secret() {
            let target = sh_quote(&format!("{VOLUME_MOUNT}/{}", entry.target));
            let script = if entry.is_dir() {
                format!("chmod 700 {target} && chown -R 1000:1000 {target}")
            } else {
                format!("chmod 600 {target} && chown 1000:1000 {target}")
            };
            volume_sh(eng, volume, &[], &script).await?;
        }
        if entry.is_dir() {
            relink_symlinks(eng, volume, root, entries, entry).await?;
        }
    }

    if !opts.dry_run {
        enforce_secret_permissions(eng, volume, entries, opts.no_secrets).await?;
    }

    import_additional_paths(eng, paths, config, volume, exclude_priv, opts).await?;
    Ok(())
}

async fn initialize_target(eng: &dyn Engine, volume: &str, entry: &ManifestEntry) -> Result<()> {
    let target = format!("{VOLUME_MOUNT}/{}", entry.target);
    let quoted = sh_quote(&target);
    let script = if entry.is_dir() {
        let mut s = format!("mkdir -p {quoted} && chown -R 1000:1000 {quoted}");
        if entry.is_secret() {
            s.push_str(&format!(" && chmod 700 {quoted}"));
        }
        s
    } else {
        let parent = sh_quote(
            Path::new(&target)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| VOLUME_MOUNT.to_string())
                .as_str(),
        );
        let mut s = format!(
            "mkdir -p {parent} && {{ [ -e {quoted} ] || touch {quoted}; }}"
        );
        if entry.seed_json() {
            s.push_str(&format!(" && {{ [ -s {quoted} ] || printf '{{}}' > {quoted}; }}"));
        }
        s.push_str(&format!(" && chown 1000:1000 {quoted}"));
        if entry.is_secret() {
            s.push_str(&format!(" && chmod 600 {quoted}"));
        }
        s
    };
    volume_sh(eng, volume, &[], &script).await?;
    Ok(())
}

async fn copy_entry(
    eng: &dyn Engine,
    volume: &str,
    root: &Path,
    entry: &ManifestEntry,
    exclude_priv: bool,
) -> Result<()> {
    let mut rsync = vec!["rsync".to_string(), "-a".to_string()];
    if entry.mirror_delete() {
        rsync.push("--delete".to_string());
    }
    if entry.exclude_system() {
        rsync.push("--exclude=.system/".to_string());
    }
    if entry.priv_filter() && exclude_priv {
        rsync.push("--exclude=*.priv.*".to_string());
    }
    if entry.is_dir() {
        rsync.push(format!("/source/{}/", entry.source));
        rsync.push(format!("/target/{}/", entry.target));
    } else {
        rsync.push(format!("/source/{}", entry.source));
        rsync.push(format!("/target/{}", entry.target));
    }

    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{volume}:/target"),
        "-v".to_string(),
        format!("{}:/source:ro", root.display()),
        rsync_image(),
    ];
    args.extend(rsync);
    engine::capture_checked(eng, &args).await?;
    Ok(())
}

/// Strip signing and credential-helper settings from a gitconfig and
/// make the in-container workspace a safe directory.
pub fn filter_git_config(content: &str) -> String {
    const REMOVED: [&str; 6] = [
        "credential.helper",
        "commit.gpgsign",
        "tag.gpgsign",
        "gpg.program",
        "gpg.format",
        "user.signingkey",
    ];
    const SAFE_DIRECTORY: &str = "/home/agent/workspace";

    let mut out = String::with_capacity(content.len());
    let mut section = String::new();
    let mut has_safe_directory = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            // Section header; subsections like [credential "https://x"]
            // reduce to their first word.
            let inner = trimmed.trim_start_matches('[').trim_end_matches(']');
            section = inner
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            out.push_str(line);
            out.push('\n');
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            let dotted = format!("{section}.{}", key.trim().to_ascii_lowercase());
            if REMOVED.contains(&dotted.as_str()) {
                continue;
            }
            if section == "safe"
                && key.trim().eq_ignore_ascii_case("directory")
                && value.trim() == SAFE_DIRECTORY
            {
                has_safe_directory = true;
            }
        }
        out.push_str(line);
        out.push('\n');
    }

    if !has_safe_directory {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str("[safe]\n\tdirectory = ");
        out.push_str(SAFE_DIRECTORY);
        out.push('\n');
    }
    out
}

async fn apply_git_filter(eng: &dyn Engine, volume: &str, target: &str) -> Result<()> {
    let quoted = sh_quote(&format!("{VOLUME_MOUNT}/{target}"));
    let current = volume_sh(eng, volume, &[], &format!("cat {quoted}")).await?;
    let filtered = filter_git_config(&current.stdout);
    volume_sh_stdin(eng, volume, &format!("cat > {quoted}"), &filtered).await?;
    Ok(())
}

/// Relative POSIX path from one volume directory to a volume path.
pub fn relative_posix(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|c| !c.is_empty()).collect();
    let to: Vec<&str> = to.split('/').filter(|c| !c.is_empty()).collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(from.len() - common)
        .collect();
    parts.extend(to[common..].iter().map(|s| s.to_string()));
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

fn collect_symlinks(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = path.symlink_metadata() else {
            continue;
        };
        if meta.file_type().is_symlink() {
            out.push(path);
        } else if meta.is_dir() {
            collect_symlinks(&path, out);
        }
    }
}

/// Replace copied absolute symlinks with relative links into the
/// corresponding volume location. Links pointing outside the source
/// root, or to unmapped or broken targets, are preserved with a
/// warning.
async fn relink_symlinks(
    eng: &dyn Engine,
    volume: &str,
    root: &Path,
    entries: &[ManifestEntry],
    entry: &ManifestEntry,
) -> Result<()> {
    let mut links = Vec::new();
    collect_symlinks(&root.join(&entry.source), &mut links);

    for link in links {
        let Ok(link_rel) = link.strip_prefix(root) else {
            continue;
        };
        let link_rel = link_rel.to_string_lossy().replace('\\', "/");
        let Ok(target) = std::fs::read_link(&link) else {
            continue;
        };
        if !target.is_absolute() {
            continue;
        }
        let Ok(target_rel) = target.strip_prefix(root) else {
            warn_line(&format!(
                "symlink {} points outside the import root; preserved as-is",
                link.display()
            ));
            continue;
        };
        if !target.exists() {
            warn_line(&format!(
                "symlink {} target does not resolve; preserved as-is",
                link.display()
            ));
            continue;
        }
        let target_rel = target_rel.to_string_lossy().replace('\\', "/");

        let Some(link_vol) = manifest::map_source_to_target(entries, &link_rel) else {
            continue;
        };
        let Some(target_vol) = manifest::map_source_to_target(entries, &target_rel) else {
            warn_line(&format!(
                "symlink {} target is not covered by the manifest; preserved as-is",
                link.display()
            ));
            continue;
        };

        let link_parent = match link_vol.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        let relative = relative_posix(&link_parent, &target_vol);
        let script = format!(
            "ln -sfn {} {}",
            sh_quote(&relative),
            sh_quote(&format!("{VOLUME_MOUNT}/{link_vol}"))
        );
        volume_sh(eng, volume, &[], &script).await?;
    }
    Ok(())
}

async fn enforce_secret_permissions(
    eng: &dyn Engine,
    volume: &str,
    entries: &[ManifestEntry],
    no_secrets: bool,
) -> Result<()> {
    let mut script_parts = Vec::new();
    for entry in entries {
        if !entry.is_secret() || no_secrets {
            continue;
        }
        let target = sh_quote(&format!("{VOLUME_MOUNT}/{}", entry.target));
        if entry.is_dir() {
            script_parts.push(format!(
                "if [ -d {target} ]; then find {target} -type d -exec chmod 700 {{}} + && find {target} -type f -exec chmod 600 {{}} +; fi"
            ));
        } else {
            let parent = sh_quote(
                Path::new(&format!("{VOLUME_MOUNT}/{}", entry.target))
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| VOLUME_MOUNT.to_string())
                    .as_str(),
            );
            script_parts.push(format!(
                "if [ -f {target} ]; then chmod 600 {target} && chmod 700 {parent}; fi"
            ));
        }
    }
    if script_parts.is_empty() {
        return Ok(());
    }
    volume_sh(eng, volume, &[], &script_parts.join(" && ")).await?;
    Ok(())
}

/// Target under the volume for an additional path: the home-relative
/// path with the leading dot of its first segment stripped.
pub fn additional_path_target(rel: &str) -> String {
    match rel.split_once('/') {
        Some((first, rest)) => format!("{}/{rest}", first.trim_start_matches('.')),
        None => rel.trim_start_matches('.').to_string(),
    }
}

/// Validate one `import.additional_paths` item. Returns the absolute
/// source and its home-relative form.
pub fn resolve_additional_path(home: &Path, raw: &str) -> Result<(PathBuf, String)> {
    let rel: PathBuf = if let Some(rest) = raw.strip_prefix("~/") {
        PathBuf::from(rest)
    } else if Path::new(raw).is_absolute() {
        Path::new(raw)
            .strip_prefix(home)
            .map_err(|_| {
                CaiError::InvalidInput(format!(
                    "additional path must live under the home directory: {raw}"
                ))
            })?
            .to_path_buf()
    } else {
        return Err(CaiError::InvalidInput(format!(
            "additional path must be ~/... or absolute: {raw}"
        )));
    };

    let abs = home.join(&rel);
    if !abs.exists() {
        return Err(CaiError::InvalidInput(format!(
            "additional path does not exist: {raw}"
        )));
    }

    // No component of the path may be a symlink when walked from home.
    let mut walked = home.to_path_buf();
    for component in rel.components() {
        walked.push(component);
        if walked
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
        {
            return Err(CaiError::InvalidInput(format!(
                "additional path traverses a symlink: {raw}"
            )));
        }
    }

    Ok((abs, rel.to_string_lossy().replace('\\', "/")))
}

async fn import_additional_paths(
    eng: &dyn Engine,
    paths: &Paths,
    config: &ConfigStore,
    volume: &str,
    exclude_priv: bool,
    opts: &ImportOptions,
) -> Result<()> {
    for raw in config.import_additional_paths() {
        let (abs, rel) = resolve_additional_path(paths.home(), &raw)?;
        let target = additional_path_target(&rel);
        if opts.dry_run {
            println!("Would sync {} -> {target}", abs.display());
            continue;
        }

        let is_dir = abs.is_dir();
        let parent = Path::new(&format!("{VOLUME_MOUNT}/{target}"))
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| VOLUME_MOUNT.to_string());
        volume_sh(
            eng,
            volume,
            &[],
            &format!("mkdir -p {}", sh_quote(&parent)),
        )
        .await?;

        let mut rsync = vec!["rsync".to_string(), "-a".to_string()];
        // The priv filter only applies under the shell drop-in tree.
        let under_bashrc = rel == ".bashrc.d" || rel.starts_with(".bashrc.d/");
        if under_bashrc && exclude_priv {
            rsync.push("--exclude=*.priv.*".to_string());
        }
        if is_dir {
            rsync.push(format!("/source/{rel}/"));
            rsync.push(format!("/target/{target}/"));
        } else {
            rsync.push(format!("/source/{rel}"));
            rsync.push(format!("/target/{target}"));
        }

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{volume}:/target"),
            "-v".to_string(),
            format!("{}:/source:ro", paths.home().display()),
            rsync_image(),
        ];
        args.extend(rsync);
        engine::capture_checked(eng, &args).await?;
    }
    Ok(())
}

async fn env_import(
    eng: &dyn Engine,
    config: &ConfigStore,
    volume: &str,
    workspace: &Path,
    opts: &ImportOptions,
) -> Result<()> {
    let Some(section) = config.env_section() else {
        return Ok(());
    };

    let (allowed, warnings) = match section.get("import").and_then(|v| v.as_array()) {
        Some(items) => envfile::allow_list(items),
        None => (Vec::new(), Vec::new()),
    };
    for warning in warnings {
        warn_line(&warning);
    }

    let mut file_values = indexmap::IndexMap::new();
    if let Some(env_file) = config.env_file() {
        let path = envfile::validate_env_file_path(workspace, &env_file)?;
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CaiError::InvalidInput(format!("env_file not readable: {env_file}: {e}"))
        })?;
        let (values, warnings) = envfile::parse_env_file(&content);
        for warning in warnings {
            warn_line(&warning);
        }
        file_values = values;
    }

    let mut host_values = indexmap::IndexMap::new();
    if config.env_from_host() {
        let (values, warnings) = envfile::collect_host_env(&allowed);
        for warning in warnings {
            warn_line(&warning);
        }
        host_values = values;
    }

    if config.env_file().is_none() && !config.env_from_host() {
        return Ok(());
    }

    let merged = envfile::merge_env(file_values, host_values);
    let stream = envfile::compose_env_stream(&merged);

    if opts.dry_run {
        println!("Would write {} variables to {VOLUME_MOUNT}/.env", merged.len());
        return Ok(());
    }

    match volume_sh(eng, volume, &[], &format!("[ ! -L {VOLUME_MOUNT}/.env ]")).await {
        Ok(_) => {}
        Err(CaiError::Engine { .. }) => {
            return Err(CaiError::Environment(format!(
                "refusing to write {VOLUME_MOUNT}/.env: path is a symlink"
            )));
        }
        Err(e) => return Err(e),
    }

    let script = format!(
        "cat > {VOLUME_MOUNT}/.env.tmp && chmod 600 {VOLUME_MOUNT}/.env.tmp && chown 1000:1000 {VOLUME_MOUNT}/.env.tmp && mv -f {VOLUME_MOUNT}/.env.tmp {VOLUME_MOUNT}/.env"
    );
    volume_sh_stdin(eng, volume, &script, &stream).await?;
    Ok(())
}

async fn apply_overlays(
    eng: &dyn Engine,
    paths: &Paths,
    volume: &str,
    entries: &[ManifestEntry],
    opts: &ImportOptions,
) -> Result<()> {
    let root = paths.overrides_dir();
    let (files, warnings) = overlay::enumerate_overlay_files(&root)?;
    for warning in warnings {
        warn_line(&warning);
    }
    let (overlays, unmapped) = overlay::map_overlays(&root, files, entries);
    if opts.verbose {
        for warning in unmapped {
            warn_line(&warning);
        }
    }

    for item in overlays {
        if opts.no_secrets && item.secret {
            continue;
        }
        if opts.dry_run {
            println!("Would overlay {} -> {}", item.host_path.display(), item.target);
            continue;
        }
        let Ok(mount_rel) = item.host_path.strip_prefix(&root) else {
            continue;
        };
        let mount_rel = mount_rel.to_string_lossy().replace('\\', "/");
        let dest = format!("{VOLUME_MOUNT}/{}", item.target);
        let parent = Path::new(&dest)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| VOLUME_MOUNT.to_string());
        let script = format!(
            "mkdir -p {} && cp -f {} {} && chown 1000:1000 {}",
            sh_quote(&parent),
            sh_quote(&format!("/overlay/{mount_rel}")),
            sh_quote(&dest),
            sh_quote(&dest)
        );
        volume_sh(
            eng,
            volume,
            &[format!("{}:/overlay:ro", root.display())],
            &script,
        )
        .await?;
    }
    Ok(())
}

/// Export the volume into a timestamped `.tgz` under `dest_dir`.
pub async fn export_volume(eng: &dyn Engine, volume: &str, dest_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let name = format!("{volume}-{}.tgz", Utc::now().format("%Y%m%d-%H%M%S"));
    let args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{volume}:{VOLUME_MOUNT}:ro"),
        "-v".to_string(),
        format!("{}:/out", dest_dir.display()),
        HELPER_IMAGE.to_string(),
        "sh".to_string(),
        "-lc".to_string(),
        format!("tar -czf /out/{} -C {VOLUME_MOUNT} .", sh_quote(&name)),
    ];
    engine::capture_checked(eng, &args).await?;
    Ok(dest_dir.join(name))
}
