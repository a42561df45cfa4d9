//! Paths into procfs used while building user namespaces.

use std::path::{Path, PathBuf};

/// Default procfs mount point.
pub const PROC_ROOT: &str = "/proc";

/// Per-process files under procfs.
#[derive(Debug, Clone)]
pub struct ProcPaths {
    /// Procfs mount point (default: /proc).
    pub root: PathBuf,
}

impl ProcPaths {
    /// Create paths rooted at `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom procfs root.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for a process.
    #[must_use]
    pub fn pid(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// UID map of a process.
    #[must_use]
    pub fn uid_map(&self, pid: u32) -> PathBuf {
        self.pid(pid).join("uid_map")
    }

    /// GID map of a process.
    #[must_use]
    pub fn gid_map(&self, pid: u32) -> PathBuf {
        self.pid(pid).join("gid_map")
    }

    /// Setgroups control file of a process.
    #[must_use]
    pub fn setgroups(&self, pid: u32) -> PathBuf {
        self.pid(pid).join("setgroups")
    }

    /// User namespace link of a process.
    #[must_use]
    pub fn user_ns(&self, pid: u32) -> PathBuf {
        self.pid(pid).join("ns").join("user")
    }

    /// Whether `path` lives under this procfs root.
    ///
    /// Used to tell `--map-mount=/proc/<pid>/ns/user` apart from an idmap spec.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && path != self.root
    }
}

impl Default for ProcPaths {
    fn default() -> Self {
        Self::with_root(PROC_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let paths = ProcPaths::new();
        assert_eq!(paths.uid_map(42), PathBuf::from("/proc/42/uid_map"));
        assert_eq!(paths.gid_map(42), PathBuf::from("/proc/42/gid_map"));
        assert_eq!(paths.setgroups(42), PathBuf::from("/proc/42/setgroups"));
        assert_eq!(paths.user_ns(42), PathBuf::from("/proc/42/ns/user"));
    }

    #[test]
    fn custom_root() {
        let paths = ProcPaths::with_root("/tmp/fake-proc");
        assert_eq!(paths.pid(7), PathBuf::from("/tmp/fake-proc/7"));
    }

    #[test]
    fn namespace_paths() {
        let paths = ProcPaths::new();
        assert!(paths.contains(Path::new("/proc/1234/ns/user")));
        assert!(paths.contains(Path::new("/proc/self/ns/user")));
        assert!(!paths.contains(Path::new("/proc")));
        assert!(!paths.contains(Path::new("/procfoo/1/ns/user")));
        assert!(!paths.contains(Path::new("b:0:10000:10000")));
    }
}
