//! Cross-process SSH port allocation
//!
//! Allocates loopback SSH ports out of `[2400, 2499]` under an exclusive
//! file lock so concurrent transforms on the same host never hand out
//! the same port. Reconciliation unions three sources of truth: the
//! persisted per-workspace files, the `containai.ssh-port` labels on
//! live containers, and the local TCP listen state.

use crate::engine::{self, Engine};
use crate::errors::Result;
use crate::paths::Paths;
use crate::workspace::sanitize_workspace_name;
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, warn};

/// Allocatable port range.
pub const PORT_RANGE: RangeInclusive<u16> = 2400..=2499;

/// Returned when the whole range is exhausted.
pub const FALLBACK_PORT: u16 = 2322;

/// Label carrying a container's allocated port.
pub const SSH_PORT_LABEL: &str = "containai.ssh-port";

/// Label carrying a devcontainer's workspace name.
pub const WORKSPACE_LABEL: &str = "containai.devcontainer.workspace";

const LOCK_RETRIES: u32 = 100;
const LOCK_BACKOFF: Duration = Duration::from_millis(100);

/// Whether something is listening on the loopback port right now.
///
/// A failed bind means the port is taken; binding briefly and dropping
/// the listener leaves no residue.
pub fn port_listening(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_err()
}

/// First free port in range: not reserved and not listening.
pub fn pick_free_port(
    reserved: &HashSet<u16>,
    listening: impl Fn(u16) -> bool,
) -> Option<u16> {
    PORT_RANGE.find(|p| !reserved.contains(p) && !listening(*p))
}

/// Exclusive-lock guard over the allocation critical section.
///
/// The lock is an OS file lock, so a crashed process releases it at
/// exit. `None` means the retry budget ran out and the caller proceeds
/// best-effort.
struct PortLock {
    _file: File,
}

async fn acquire_lock(paths: &Paths) -> Result<Option<PortLock>> {
    std::fs::create_dir_all(paths.config_dir())?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(paths.port_lock())?;
    for attempt in 0..LOCK_RETRIES {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(Some(PortLock { _file: file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!(attempt, "port lock contended, backing off");
                tokio::time::sleep(LOCK_BACKOFF).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    warn!("port lock retries exhausted; proceeding unguarded");
    Ok(None)
}

/// Port allocator bound to the host filesystem layout.
pub struct PortAllocator<'a> {
    paths: &'a Paths,
}

impl<'a> PortAllocator<'a> {
    pub fn new(paths: &'a Paths) -> Self {
        Self { paths }
    }

    /// Allocate (or re-read) the port for a sanitized workspace name.
    pub async fn allocate(&self, eng: &dyn Engine, sanitized: &str) -> Result<u16> {
        let _lock = acquire_lock(self.paths).await?;
        self.allocate_locked(eng, sanitized, port_listening).await
    }

    /// Allocation body; the listen probe is injectable for tests.
    pub async fn allocate_locked(
        &self,
        eng: &dyn Engine,
        sanitized: &str,
        listening: impl Fn(u16) -> bool,
    ) -> Result<u16> {
        std::fs::create_dir_all(self.paths.ports_dir())?;
        let file = self.paths.port_file(sanitized);

        if let Some(port) = read_port_file(&file) {
            if !listening(port) {
                debug!(port, workspace = sanitized, "reusing persisted port");
                return Ok(port);
            }
            // The port is busy locally; if a labeled container for this
            // workspace owns it, the listener is the container itself.
            if self.workspace_owns_port(eng, sanitized, port).await? {
                debug!(port, workspace = sanitized, "container owns the listening port");
                return Ok(port);
            }
        }

        let mut reserved = self.label_reserved_ports(eng).await?;
        reserved.extend(self.file_reserved_ports());

        if let Some(port) = pick_free_port(&reserved, listening) {
            std::fs::write(&file, port.to_string())?;
            debug!(port, workspace = sanitized, "allocated fresh port");
            return Ok(port);
        }

        warn!(workspace = sanitized, "port range exhausted, using fallback");
        Ok(FALLBACK_PORT)
    }

    /// Whether a managed container labeled with this workspace carries
    /// `containai.ssh-port=<port>`.
    async fn workspace_owns_port(
        &self,
        eng: &dyn Engine,
        sanitized: &str,
        port: u16,
    ) -> Result<bool> {
        let ids = engine::ps_ids_with_label(eng, "containai.managed=true").await?;
        for id in ids {
            let labels = engine::container_labels(eng, &id).await?;
            let matches_workspace = labels
                .get(WORKSPACE_LABEL)
                .map(|w| sanitize_workspace_name(w) == sanitized)
                .unwrap_or(false);
            if matches_workspace
                && labels.get(SSH_PORT_LABEL).map(String::as_str) == Some(&port.to_string())
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every `containai.ssh-port` label across managed containers.
    async fn label_reserved_ports(&self, eng: &dyn Engine) -> Result<HashSet<u16>> {
        let mut reserved = HashSet::new();
        let ids = engine::ps_ids_with_label(eng, "containai.managed=true").await?;
        for id in ids {
            let labels = engine::container_labels(eng, &id).await?;
            if let Some(port) = labels.get(SSH_PORT_LABEL).and_then(|p| p.parse().ok()) {
                reserved.insert(port);
            }
        }
        Ok(reserved)
    }

    /// Every integer persisted under the ports directory.
    fn file_reserved_ports(&self) -> HashSet<u16> {
        let mut reserved = HashSet::new();
        if let Ok(entries) = std::fs::read_dir(self.paths.ports_dir()) {
            for entry in entries.flatten() {
                if let Some(port) = read_port_file(&entry.path()) {
                    reserved.insert(port);
                }
            }
        }
        reserved
    }
}

fn read_port_file(path: &std::path::Path) -> Option<u16> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::FakeEngine;
    use crate::process::CaptureOutput;

    fn test_paths(tmp: &tempfile::TempDir) -> Paths {
        Paths::with_roots(tmp.path(), tmp.path().join(".config"))
    }

    fn never_listening(_p: u16) -> bool {
        false
    }

    #[test]
    fn pick_free_port_walks_the_range_in_order() {
        let reserved = HashSet::from([2400, 2401]);
        assert_eq!(pick_free_port(&reserved, never_listening), Some(2402));
        assert_eq!(pick_free_port(&HashSet::new(), never_listening), Some(2400));
    }

    #[test]
    fn pick_free_port_skips_listeners() {
        let listening = |p: u16| p == 2400;
        assert_eq!(pick_free_port(&HashSet::new(), listening), Some(2401));
    }

    #[test]
    fn pick_free_port_exhaustion() {
        let reserved: HashSet<u16> = PORT_RANGE.collect();
        assert_eq!(pick_free_port(&reserved, never_listening), None);
    }

    #[tokio::test]
    async fn fresh_workspace_gets_first_free_port_and_persists_it() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let fake = FakeEngine::new();
        let allocator = PortAllocator::new(&paths);

        let port = allocator
            .allocate_locked(&fake, "w", never_listening)
            .await
            .expect("allocate");
        assert_eq!(port, 2400);
        let persisted = std::fs::read_to_string(paths.port_file("w")).expect("file");
        assert_eq!(persisted, "2400");
    }

    #[tokio::test]
    async fn repeated_allocation_is_stable() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let fake = FakeEngine::new();
        let allocator = PortAllocator::new(&paths);

        let first = allocator
            .allocate_locked(&fake, "w", never_listening)
            .await
            .expect("allocate");
        let second = allocator
            .allocate_locked(&fake, "w", never_listening)
            .await
            .expect("allocate");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn label_collision_shifts_new_workspace_to_next_port() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        let fake = FakeEngine::new();
        fake.respond(
            "ps -aq",
            CaptureOutput {
                exit_code: 0,
                stdout: "c1\n".to_string(),
                stderr: String::new(),
            },
        );
        fake.respond(
            "inspect",
            CaptureOutput {
                exit_code: 0,
                stdout: r#"{"containai.ssh-port":"2400","containai.devcontainer.workspace":"w"}"#
                    .to_string(),
                stderr: String::new(),
            },
        );

        let allocator = PortAllocator::new(&paths);
        let port = allocator
            .allocate_locked(&fake, "w2", never_listening)
            .await
            .expect("allocate");
        assert_eq!(port, 2401);
    }

    #[tokio::test]
    async fn sibling_port_files_are_reserved() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        std::fs::create_dir_all(paths.ports_dir()).expect("mkdir");
        std::fs::write(paths.port_file("other"), "2400").expect("write");

        let fake = FakeEngine::new();
        let allocator = PortAllocator::new(&paths);
        let port = allocator
            .allocate_locked(&fake, "w", never_listening)
            .await
            .expect("allocate");
        assert_eq!(port, 2401);
    }

    #[tokio::test]
    async fn busy_stored_port_owned_by_container_is_kept() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        std::fs::create_dir_all(paths.ports_dir()).expect("mkdir");
        std::fs::write(paths.port_file("w"), "2400").expect("write");

        let fake = FakeEngine::new();
        fake.respond(
            "ps -aq",
            CaptureOutput {
                exit_code: 0,
                stdout: "c1\n".to_string(),
                stderr: String::new(),
            },
        );
        fake.respond(
            "inspect",
            CaptureOutput {
                exit_code: 0,
                stdout: r#"{"containai.ssh-port":"2400","containai.devcontainer.workspace":"w"}"#
                    .to_string(),
                stderr: String::new(),
            },
        );

        let allocator = PortAllocator::new(&paths);
        let busy = |p: u16| p == 2400;
        let port = allocator
            .allocate_locked(&fake, "w", busy)
            .await
            .expect("allocate");
        assert_eq!(port, 2400);
    }

    #[tokio::test]
    async fn busy_unowned_port_is_reallocated() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        std::fs::create_dir_all(paths.ports_dir()).expect("mkdir");
        std::fs::write(paths.port_file("w"), "2400").expect("write");

        let fake = FakeEngine::new();
        let allocator = PortAllocator::new(&paths);
        let busy = |p: u16| p == 2400;
        let port = allocator
            .allocate_locked(&fake, "w", busy)
            .await
            .expect("allocate");
        assert_eq!(port, 2401);
        // The file now records the new assignment.
        let persisted = std::fs::read_to_string(paths.port_file("w")).expect("file");
        assert_eq!(persisted, "2401");
    }

    #[tokio::test]
    async fn exhausted_range_returns_fallback() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = test_paths(&tmp);
        std::fs::create_dir_all(paths.ports_dir()).expect("mkdir");
        for port in PORT_RANGE {
            std::fs::write(paths.port_file(&format!("w{port}")), port.to_string())
                .expect("write");
        }

        let fake = FakeEngine::new();
        let allocator = PortAllocator::new(&paths);
        let port = allocator
            .allocate_locked(&fake, "fresh", never_listening)
            .await
            .expect("allocate");
        assert_eq!(port, FALLBACK_PORT);
    }
}
