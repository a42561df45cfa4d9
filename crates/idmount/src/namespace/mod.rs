//! User namespace handles.
//!
//! A [`UserNamespace`] is an open `/proc/<pid>/ns/user` descriptor. It pins
//! the namespace in the kernel for as long as it stays open, independently of
//! the process that created it.

mod helper;
mod userns;

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::Path;

use rustix::fs::{Mode, OFlags};

use idmount_common::{IdmountError, IdmountResult};

pub use helper::StoppedHelper;
pub use userns::UserNamespaceBuilder;

use crate::idmap::IdMapSet;

/// Owned handle to a user namespace.
#[derive(Debug)]
pub struct UserNamespace {
    fd: OwnedFd,
}

impl UserNamespace {
    /// Open an existing user namespace, e.g. `/proc/1234/ns/user`.
    ///
    /// # Errors
    ///
    /// Returns [`IdmountError::Namespace`] if the path cannot be opened.
    pub fn open(path: &Path) -> IdmountResult<Self> {
        let fd = rustix::fs::open(
            path,
            OFlags::RDONLY | OFlags::CLOEXEC | OFlags::NOCTTY,
            Mode::empty(),
        )
        .map_err(|e| IdmountError::Namespace {
            message: format!("failed to open {}", path.display()),
            source: e.into(),
        })?;

        tracing::debug!(path = %path.display(), "Opened user namespace");
        Ok(Self { fd })
    }

    /// Create a fresh user namespace carrying `maps`.
    ///
    /// # Errors
    ///
    /// See [`UserNamespaceBuilder::build`].
    pub fn create(maps: IdMapSet) -> IdmountResult<Self> {
        UserNamespaceBuilder::new().build(maps)
    }
}

impl AsFd for UserNamespace {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for UserNamespace {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
