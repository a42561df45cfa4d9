//! Mount operations built on the new mount API.
//!
//! - [`DetachedMount::clone_tree`]: `open_tree(OPEN_TREE_CLONE)`
//! - [`attach_idmap`]: `mount_setattr(MOUNT_ATTR_IDMAP)`
//! - [`publish`]: `move_mount(MOVE_MOUNT_F_EMPTY_PATH)`

mod attr;
mod publish;
mod tree;

pub use attr::{MountAttr, attach_idmap, mount_attr};
pub use publish::publish;
pub use tree::DetachedMount;

#[cfg(all(test, feature = "integration"))]
mod tests {
    //! These need root and a kernel with idmapped mounts.

    use std::fs;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    use rustix::mount::{UnmountFlags, unmount};

    use super::*;
    use crate::idmap::IdMapSet;
    use crate::namespace::UserNamespace;

    fn is_mountpoint(path: &Path) -> bool {
        let canonical = fs::canonicalize(path).unwrap();
        fs::read_to_string("/proc/self/mountinfo")
            .unwrap()
            .lines()
            .filter_map(|line| line.split_whitespace().nth(4))
            .any(|mountpoint| Path::new(mountpoint) == canonical)
    }

    #[test]
    fn plain_bind_is_published() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        fs::write(source.path().join("file"), "hello").unwrap();

        let tree = DetachedMount::clone_tree(source.path(), false).unwrap();
        assert!(!is_mountpoint(target.path()));
        tree.publish(target.path()).unwrap();

        assert!(is_mountpoint(target.path()));
        assert_eq!(
            fs::read_to_string(target.path().join("file")).unwrap(),
            "hello"
        );
        unmount(target.path(), UnmountFlags::DETACH).unwrap();
    }

    #[test]
    fn idmapped_ownership_is_shifted() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let file = source.path().join("owned-by-root");
        fs::write(&file, "").unwrap();
        assert_eq!(fs::metadata(&file).unwrap().uid(), 0);

        let maps: IdMapSet = "b:0:10000:10000".parse().unwrap();
        let userns = UserNamespace::create(maps).unwrap();
        let tree = DetachedMount::clone_tree(source.path(), false).unwrap();
        tree.idmap(userns).unwrap();
        tree.publish(target.path()).unwrap();

        let meta = fs::metadata(target.path().join("owned-by-root")).unwrap();
        assert_eq!(meta.uid(), 10000);
        assert_eq!(meta.gid(), 10000);
        unmount(target.path(), UnmountFlags::DETACH).unwrap();
    }

    /// Whether this process lives in the initial user namespace.
    fn in_initial_userns() -> bool {
        let map = fs::read_to_string("/proc/self/uid_map").unwrap();
        let fields: Vec<&str> = map.split_whitespace().collect();
        fields == ["0", "0", "4294967295"]
    }

    #[test]
    fn failed_attach_leaves_target_untouched() {
        if !in_initial_userns() {
            return;
        }
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();

        // The initial user namespace cannot be used as an idmap.
        let userns = UserNamespace::open(Path::new("/proc/self/ns/user")).unwrap();
        let tree = DetachedMount::clone_tree(source.path(), false).unwrap();
        let err = tree.idmap(userns).unwrap_err();
        drop(tree);

        assert!(matches!(
            err,
            idmount_common::IdmountError::Mount {
                op: "mount_setattr",
                ..
            }
        ));
        assert!(!is_mountpoint(target.path()));
    }

    #[test]
    fn failed_publish_reports_target() {
        let source = tempfile::tempdir().unwrap();
        let missing = source.path().join("missing");

        let tree = DetachedMount::clone_tree(source.path(), true).unwrap();
        let err = tree.publish(&missing).unwrap_err();
        match err {
            idmount_common::IdmountError::Mount { op, path, .. } => {
                assert_eq!(op, "move_mount");
                assert_eq!(path, missing);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
