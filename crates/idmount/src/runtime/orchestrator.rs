//! End-to-end pipeline: namespace, clone, idmap, publish, hand-off.

use std::path::{Path, PathBuf};

use idmount_common::{IdmountError, IdmountResult};

use super::CallerHandoff;
use crate::idmap::MountMapping;
use crate::mount::DetachedMount;
use crate::namespace::UserNamespace;

/// An idmapped mount of `source` at `target`, ready to be created.
///
/// # Example
///
/// ```no_run
/// use idmount::IdmappedMount;
/// use idmount::idmap::{IdMapSet, MountMapping};
///
/// # fn example() -> idmount_common::IdmountResult<()> {
/// let maps: IdMapSet = "b:0:10000:10000".parse()?;
/// IdmappedMount::new("/data", "/mnt")
///     .mapping(MountMapping::Entries(maps))
///     .recursive(true)
///     .run()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct IdmappedMount {
    source: PathBuf,
    target: PathBuf,
    mapping: MountMapping,
    recursive: bool,
    caller: Option<CallerHandoff>,
}

impl IdmappedMount {
    /// Plain bind of `source` at `target`; add a mapping to idmap it.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mapping: MountMapping::none(),
            recursive: false,
            caller: None,
        }
    }

    /// Set where the idmap comes from.
    #[must_use]
    pub fn mapping(mut self, mapping: MountMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Clone and idmap every submount below `source`.
    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Exec into a user namespace helper once the mount is published.
    #[must_use]
    pub fn caller(mut self, caller: CallerHandoff) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Source path.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Target path.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target
    }

    /// The configured mapping.
    #[must_use]
    pub const fn mount_mapping(&self) -> &MountMapping {
        &self.mapping
    }

    /// Create the mount.
    ///
    /// Every handle acquired along the way is closed before this returns,
    /// on success and on failure. Nothing is visible at the target unless
    /// the final `move_mount` succeeds. With a caller hand-off configured,
    /// a successful run does not return.
    ///
    /// # Errors
    ///
    /// Returns the first namespace or mount error encountered, or
    /// [`IdmountError::CallerHelper`] if the hand-off could not be launched.
    pub fn run(self) -> IdmountResult<()> {
        let Self {
            source,
            target,
            mapping,
            recursive,
            caller,
        } = self;

        let userns = user_namespace(mapping)?;
        let tree = DetachedMount::clone_tree(&source, recursive)?;

        if let Some(userns) = userns {
            tree.idmap(userns)?;
        }
        tree.publish(&target)?;

        match caller {
            Some(caller) => Err(caller.exec()),
            None => Ok(()),
        }
    }
}

/// Realize the mapping as a user namespace, if there is one.
fn user_namespace(mapping: MountMapping) -> IdmountResult<Option<UserNamespace>> {
    match mapping {
        MountMapping::Entries(maps) if maps.is_empty() => {
            tracing::debug!("No idmap given, publishing a plain bind mount");
            Ok(None)
        }
        MountMapping::Entries(maps) => UserNamespace::create(maps).map(Some),
        MountMapping::Namespace(path) => UserNamespace::open(&path).map(Some),
    }
}
