//! Ephemeral user namespace construction.
//!
//! Realizes an [`IdMapSet`] as a live user namespace and hands back a file
//! descriptor that keeps it alive after the helper process is gone.

use std::io;
use std::path::{Path, PathBuf};

use rustix::fs::{Mode, OFlags};
use rustix::process::geteuid;

use idmount_common::{IdmountError, IdmountResult, ProcPaths};

use super::UserNamespace;
use super::helper::StoppedHelper;
use crate::idmap::{IdKind, IdMapSet};

/// Builds user namespaces from idmap sets.
#[derive(Debug, Clone, Default)]
pub struct UserNamespaceBuilder {
    procfs: ProcPaths,
}

impl UserNamespaceBuilder {
    /// Create a builder using `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a custom procfs root.
    #[must_use]
    pub fn with_procfs(procfs: ProcPaths) -> Self {
        Self { procfs }
    }

    /// Create a user namespace carrying `maps`.
    ///
    /// Both maps are rendered before anything is spawned, so an oversized set
    /// fails without side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if the maps are too large, the helper cannot be
    /// spawned, a map file cannot be written or the namespace cannot be
    /// opened. The helper is reaped on every path.
    pub fn build(&self, maps: IdMapSet) -> IdmountResult<UserNamespace> {
        let uid_map = maps.render(IdKind::Uid)?;
        let gid_map = maps.render(IdKind::Gid)?;

        let helper = StoppedHelper::spawn()?;
        let pid = helper.pid();

        if let Some(content) = uid_map {
            self.write_map(pid, IdKind::Uid, &content)?;
        }
        if let Some(content) = gid_map {
            if !geteuid().is_root() {
                self.deny_setgroups(pid)?;
            }
            self.write_map(pid, IdKind::Gid, &content)?;
        }

        let userns = UserNamespace::open(&self.procfs.user_ns(pid))?;
        helper.terminate();

        tracing::debug!(pid, entries = maps.len(), "Created user namespace");
        Ok(userns)
    }

    fn map_path(&self, pid: u32, kind: IdKind) -> PathBuf {
        match kind {
            IdKind::Uid => self.procfs.uid_map(pid),
            IdKind::Gid => self.procfs.gid_map(pid),
        }
    }

    /// Write UID or GID mappings to /proc/[pid]/{u,g}id_map.
    fn write_map(&self, pid: u32, kind: IdKind, content: &str) -> IdmountResult<()> {
        let path = self.map_path(pid, kind);
        write_once(&path, content.as_bytes()).map_err(|source| IdmountError::IdMapWrite {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), %kind, "Wrote mappings");
        Ok(())
    }

    /// Deny setgroups (required for unprivileged gid maps).
    fn deny_setgroups(&self, pid: u32) -> IdmountResult<()> {
        let path = self.procfs.setgroups(pid);
        match write_once(&path, b"deny\n") {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Denied setgroups");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No setgroups control on this kernel");
                Ok(())
            }
            Err(source) => Err(IdmountError::IdMapWrite { path, source }),
        }
    }
}

/// Write `contents` to `path` in a single `write(2)`.
///
/// Map files reject partial or repeated writes, so a short write is an error.
fn write_once(path: &Path, contents: &[u8]) -> io::Result<()> {
    let fd = rustix::fs::open(
        path,
        OFlags::WRONLY | OFlags::CLOEXEC | OFlags::NOCTTY | OFlags::NOFOLLOW,
        Mode::empty(),
    )?;

    let written = loop {
        match rustix::io::write(&fd, contents) {
            Err(rustix::io::Errno::INTR) => {}
            result => break result?,
        }
    };
    if written != contents.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {written} of {} bytes", contents.len()),
        ));
    }

    Ok(())
}
