//! Detached mount trees.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use rustix::fs::CWD;
use rustix::mount::{OpenTreeFlags, open_tree};

use idmount_common::{IdmountError, IdmountResult};

/// A private clone of a mount subtree, not attached anywhere yet.
///
/// The clone is invisible in every mount namespace until it is published.
/// Dropping it unpublished discards the clone.
#[derive(Debug)]
pub struct DetachedMount {
    fd: OwnedFd,
    source: PathBuf,
}

impl DetachedMount {
    /// Clone the mount at `source` with `open_tree(OPEN_TREE_CLONE)`.
    ///
    /// With `recursive` every submount below `source` is cloned as well.
    ///
    /// # Errors
    ///
    /// Returns [`IdmountError::Mount`] naming `source` if the kernel refuses
    /// the clone (missing path, missing privilege, or no new mount API).
    pub fn clone_tree(source: &Path, recursive: bool) -> IdmountResult<Self> {
        let mut flags = OpenTreeFlags::OPEN_TREE_CLONE
            | OpenTreeFlags::OPEN_TREE_CLOEXEC
            | OpenTreeFlags::AT_EMPTY_PATH;
        if recursive {
            flags |= OpenTreeFlags::AT_RECURSIVE;
        }

        tracing::debug!(source = %source.display(), recursive, "Cloning mount tree");

        let fd = open_tree(CWD, source, flags).map_err(|e| IdmountError::Mount {
            op: "open_tree",
            path: source.to_path_buf(),
            source: e.into(),
        })?;

        Ok(Self {
            fd,
            source: source.to_path_buf(),
        })
    }

    /// Path the tree was cloned from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl AsFd for DetachedMount {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for DetachedMount {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
