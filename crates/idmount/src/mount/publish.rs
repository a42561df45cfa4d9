//! Publishing a detached tree at its target.

use std::os::fd::AsFd;
use std::path::Path;

use rustix::fs::CWD;
use rustix::mount::{MoveMountFlags, move_mount};

use idmount_common::{IdmountError, IdmountResult};

use super::DetachedMount;

/// Graft `tree` onto `target` with `move_mount(2)`.
///
/// Nothing at `target` changes before the call; afterwards the whole tree,
/// idmap included, is visible at once. The tree handle is consumed and closed
/// on both paths, and the mount itself then belongs to the mount table.
///
/// # Errors
///
/// Returns [`IdmountError::Mount`] naming `target` if the move fails. The
/// target is left untouched in that case.
pub fn publish(tree: DetachedMount, target: &Path) -> IdmountResult<()> {
    let result = move_mount(
        tree.as_fd(),
        "",
        CWD,
        target,
        MoveMountFlags::MOVE_MOUNT_F_EMPTY_PATH,
    );
    let source = tree.source().to_path_buf();
    drop(tree);

    result.map_err(|e| IdmountError::Mount {
        op: "move_mount",
        path: target.to_path_buf(),
        source: e.into(),
    })?;

    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        "Mount published"
    );
    Ok(())
}

impl DetachedMount {
    /// Attach this tree at `target`. See [`publish`].
    ///
    /// # Errors
    ///
    /// Returns [`IdmountError::Mount`] if `move_mount` fails.
    pub fn publish(self, target: &Path) -> IdmountResult<()> {
        publish(self, target)
    }
}
