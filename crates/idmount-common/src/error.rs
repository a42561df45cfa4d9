//! Common error types for idmount.

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`IdmountError`].
pub type IdmountResult<T> = Result<T, IdmountError>;

/// Errors raised while building and publishing an idmapped mount.
#[derive(Error, Diagnostic, Debug)]
pub enum IdmountError {
    /// An idmap spec did not match `<kind>:<ns_id>:<host_id>:<range>`.
    #[error("Invalid idmap '{spec}': {reason}")]
    #[diagnostic(
        code(idmount::idmap::invalid),
        help("Use <b|u|g>:<ns_id>:<host_id>:<range>, e.g. b:0:10000:10000")
    )]
    InvalidIdMap {
        /// The spec as given on the command line.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Namespace paths and explicit idmaps were mixed.
    #[error("Conflicting mount mappings: {message}")]
    #[diagnostic(
        code(idmount::idmap::conflict),
        help("Pass either idmap specs or a single /proc/<pid>/ns/user path")
    )]
    ConflictingMappings {
        /// Which inputs conflicted.
        message: String,
    },

    /// The serialized map does not fit into a single procfs write.
    #[error("Too many {kind} mappings: {entries} entries, {len} bytes")]
    #[diagnostic(
        code(idmount::idmap::too_large),
        help("The kernel accepts at most 340 extents and less than 4096 bytes per map")
    )]
    IdMapTooLarge {
        /// `uid` or `gid`.
        kind: &'static str,
        /// Serialized length in bytes.
        len: usize,
        /// Number of entries of that kind.
        entries: usize,
    },

    /// Creating, freezing or inspecting the helper namespace failed.
    #[error("User namespace error: {message}")]
    #[diagnostic(
        code(idmount::namespace),
        help("Unprivileged user namespaces may be disabled (kernel.unprivileged_userns_clone)")
    )]
    Namespace {
        /// What was being done.
        message: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Writing to a procfs map file failed.
    #[error("Failed to write {}", .path.display())]
    #[diagnostic(code(idmount::namespace::write))]
    IdMapWrite {
        /// The file being written.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A new mount API call failed.
    #[error("{op} failed for {}", .path.display())]
    #[diagnostic(
        code(idmount::mount),
        help("Idmapped mounts need Linux 5.12 or later and CAP_SYS_ADMIN")
    )]
    Mount {
        /// The syscall that failed.
        op: &'static str,
        /// The path it was operating on.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The caller hand-off helper could not be executed.
    #[error("Failed to launch {program}")]
    #[diagnostic(
        code(idmount::caller),
        help("Moving the caller into a new user namespace requires lxc-usernsexec to be installed")
    )]
    CallerHelper {
        /// Program that was executed.
        program: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(idmount::io))]
    Io(#[from] io::Error),
}

impl IdmountError {
    /// Whether this error comes from bad input rather than from the kernel.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdMap { .. } | Self::ConflictingMappings { .. }
        )
    }

    /// The OS error number behind this error, if there is one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Namespace { source, .. }
            | Self::IdMapWrite { source, .. }
            | Self::Mount { source, .. }
            | Self::CallerHelper { source, .. }
            | Self::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }
}
