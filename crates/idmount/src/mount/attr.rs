#![allow(unsafe_code)]
//! Attaching an idmap to a detached mount tree.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use idmount_common::{IdmountError, IdmountResult};

use super::DetachedMount;
use crate::namespace::UserNamespace;

/// Mount attribute flags for `mount_setattr`.
pub mod mount_attr {
    /// Idmap the mount to the `userns_fd` namespace.
    pub const IDMAP: u64 = 0x0010_0000;
}

/// Change the attributes of the whole tree below the path.
const AT_RECURSIVE: libc::c_uint = 0x8000;

/// Parameter for the `mount_setattr` syscall.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MountAttr {
    /// Attributes to set.
    pub attr_set: u64,
    /// Attributes to clear.
    pub attr_clr: u64,
    /// Propagation type (`MS_SHARED`, `MS_PRIVATE`, ...), 0 to keep.
    pub propagation: u64,
    /// User namespace fd, used with [`mount_attr::IDMAP`].
    pub userns_fd: u64,
}

impl MountAttr {
    /// Request that the mount is idmapped through `userns`.
    #[must_use]
    pub fn idmap(userns: &UserNamespace) -> Self {
        Self {
            attr_set: mount_attr::IDMAP,
            userns_fd: userns.as_raw_fd().unsigned_abs().into(),
            ..Default::default()
        }
    }
}

/// Call `mount_setattr(2)` via raw syscall (not yet wrapped by nix or rustix).
fn mount_setattr(dirfd: BorrowedFd<'_>, flags: libc::c_uint, attr: &MountAttr) -> io::Result<()> {
    // SAFETY: the path is a NUL-terminated literal and `attr` outlives the call,
    // with its size passed alongside.
    let result = unsafe {
        libc::syscall(
            libc::SYS_mount_setattr,
            dirfd.as_raw_fd(),
            c"".as_ptr(),
            flags,
            std::ptr::from_ref(attr).cast::<libc::c_void>(),
            std::mem::size_of::<MountAttr>(),
        )
    };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Idmap every mount in `tree` through `userns`.
///
/// The namespace handle is consumed and closed whether or not the kernel
/// accepts it; after success the mount itself keeps the namespace alive.
///
/// # Errors
///
/// Returns [`IdmountError::Mount`] if `mount_setattr` fails.
pub fn attach_idmap(tree: &DetachedMount, userns: UserNamespace) -> IdmountResult<()> {
    let attr = MountAttr::idmap(&userns);
    let flags = libc::AT_EMPTY_PATH.unsigned_abs() | AT_RECURSIVE;

    let result = mount_setattr(tree.as_fd(), flags, &attr);
    drop(userns);

    result.map_err(|source| IdmountError::Mount {
        op: "mount_setattr",
        path: tree.source().to_path_buf(),
        source,
    })?;

    tracing::debug!(source = %tree.source().display(), "Attached idmap to mount tree");
    Ok(())
}

impl DetachedMount {
    /// Idmap this tree through `userns`. See [`attach_idmap`].
    ///
    /// # Errors
    ///
    /// Returns [`IdmountError::Mount`] if `mount_setattr` fails.
    pub fn idmap(&self, userns: UserNamespace) -> IdmountResult<()> {
        attach_idmap(self, userns)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn mount_attr_layout_matches_kernel() {
        // struct mount_attr is MOUNT_ATTR_SIZE_VER0 (32) bytes.
        assert_eq!(std::mem::size_of::<MountAttr>(), 32);
        assert_eq!(std::mem::align_of::<MountAttr>(), 8);
    }

    #[test]
    fn idmap_request_carries_namespace_fd() {
        let userns = UserNamespace::open(Path::new("/proc/self/ns/user")).unwrap();
        let attr = MountAttr::idmap(&userns);

        assert_eq!(attr.attr_set, mount_attr::IDMAP);
        assert_eq!(attr.attr_clr, 0);
        assert_eq!(attr.propagation, 0);
        assert_eq!(attr.userns_fd, u64::from(userns.as_raw_fd().unsigned_abs()));
    }
}
