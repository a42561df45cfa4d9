//! UID/GID mappings for idmapped mounts.
//!
//! An [`IdMapSet`] is built once from the command line and then handed by
//! value to the namespace builder. Entries keep their insertion order, which
//! is the order the kernel sees them in `/proc/<pid>/{u,g}id_map`.

mod parse;

use std::fmt;

use idmount_common::{IdmountError, IdmountResult};

pub use parse::{MapArg, MountMapping, parse_entries, parse_mount_mapping};

/// Largest write the kernel accepts for a single map file (exclusive).
pub const MAX_MAP_BYTES: usize = 4096;

/// Largest number of extents the kernel accepts per map.
pub const MAX_EXTENTS: usize = 340;

/// Which ID space an entry maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// User IDs.
    Uid,
    /// Group IDs.
    Gid,
}

impl IdKind {
    /// Both kinds, in the order their maps are written.
    pub const ALL: [Self; 2] = [Self::Uid, Self::Gid];

    /// Short lowercase name (`uid`/`gid`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uid => "uid",
            Self::Gid => "gid",
        }
    }

    /// Single-letter spec prefix (`u`/`g`).
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Uid => 'u',
            Self::Gid => 'g',
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One contiguous block of IDs mapped into a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapEntry {
    /// UID or GID.
    pub kind: IdKind,
    /// First ID inside the namespace.
    pub ns_id: u32,
    /// First ID on the host.
    pub host_id: u32,
    /// Number of consecutive IDs.
    pub range: u32,
}

impl IdMapEntry {
    /// Create a new ID mapping.
    #[must_use]
    pub const fn new(kind: IdKind, ns_id: u32, host_id: u32, range: u32) -> Self {
        Self {
            kind,
            ns_id,
            host_id,
            range,
        }
    }

    /// Format for /proc/<pid>/uid_map or gid_map.
    #[must_use]
    pub fn to_proc_format(&self) -> String {
        format!("{} {} {}\n", self.ns_id, self.host_id, self.range)
    }
}

impl fmt::Display for IdMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.kind.letter(),
            self.ns_id,
            self.host_id,
            self.range
        )
    }
}

/// Insertion-ordered set of UID and GID mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapSet {
    entries: Vec<IdMapEntry>,
}

impl IdMapSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no mappings were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries across both kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[IdMapEntry] {
        &self.entries
    }

    /// Entries of one kind, in insertion order.
    pub fn of_kind(&self, kind: IdKind) -> impl Iterator<Item = &IdMapEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Render the map file contents for `kind`.
    ///
    /// Returns `None` when there are no entries of that kind, so the map file
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IdmountError::IdMapTooLarge`] when the block would not fit
    /// into a single procfs write.
    pub fn render(&self, kind: IdKind) -> IdmountResult<Option<String>> {
        let mut content = String::new();
        let mut count = 0;
        for entry in self.of_kind(kind) {
            content.push_str(&entry.to_proc_format());
            count += 1;
        }

        if count == 0 {
            return Ok(None);
        }
        if count > MAX_EXTENTS || content.len() >= MAX_MAP_BYTES {
            return Err(IdmountError::IdMapTooLarge {
                kind: kind.name(),
                len: content.len(),
                entries: count,
            });
        }

        Ok(Some(content))
    }

    /// Check that both maps can be written.
    ///
    /// # Errors
    ///
    /// Returns the first [`IdmountError::IdMapTooLarge`] encountered.
    pub fn validate(&self) -> IdmountResult<()> {
        for kind in IdKind::ALL {
            self.render(kind)?;
        }
        Ok(())
    }
}

impl Extend<IdMapEntry> for IdMapSet {
    fn extend<T: IntoIterator<Item = IdMapEntry>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

impl FromIterator<IdMapEntry> for IdMapSet {
    fn from_iter<T: IntoIterator<Item = IdMapEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a IdMapSet {
    type Item = &'a IdMapEntry;
    type IntoIter = std::slice::Iter<'a, IdMapEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_map_format() {
        let map = IdMapEntry::new(IdKind::Uid, 0, 1000, 1);
        assert_eq!(map.to_proc_format(), "0 1000 1\n");
        assert_eq!(map.to_string(), "u:0:1000:1");
    }

    #[test]
    fn render_splits_by_kind() {
        let set: IdMapSet = [
            IdMapEntry::new(IdKind::Uid, 0, 10000, 10000),
            IdMapEntry::new(IdKind::Gid, 0, 20000, 20000),
            IdMapEntry::new(IdKind::Uid, 10000, 50000, 1),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            set.render(IdKind::Uid).unwrap().as_deref(),
            Some("0 10000 10000\n10000 50000 1\n")
        );
        assert_eq!(
            set.render(IdKind::Gid).unwrap().as_deref(),
            Some("0 20000 20000\n")
        );
    }

    #[test]
    fn render_skips_missing_kind() {
        let set: IdMapSet = [IdMapEntry::new(IdKind::Gid, 0, 1000, 1)]
            .into_iter()
            .collect();
        assert_eq!(set.render(IdKind::Uid).unwrap(), None);
        assert!(set.validate().is_ok());
    }

    #[test]
    fn too_many_extents_rejected() {
        let set: IdMapSet = (0..=MAX_EXTENTS as u32)
            .map(|i| IdMapEntry::new(IdKind::Uid, i, 100_000 + i, 1))
            .collect();

        let err = set.validate().unwrap_err();
        assert!(matches!(
            err,
            IdmountError::IdMapTooLarge {
                kind: "uid",
                entries: 341,
                ..
            }
        ));
    }

    #[test]
    fn oversized_block_rejected() {
        // 300 lines of "4000000000 4000000000 4000000000\n" exceed 4 KiB.
        let set: IdMapSet = (0..300)
            .map(|_| IdMapEntry::new(IdKind::Gid, 4_000_000_000, 4_000_000_000, 4_000_000_000))
            .collect();

        assert!(set.render(IdKind::Uid).unwrap().is_none());
        let err = set.render(IdKind::Gid).unwrap_err();
        assert!(matches!(
            err,
            IdmountError::IdMapTooLarge { kind: "gid", .. }
        ));
    }

    #[test]
    fn kernel_limit_is_reachable() {
        let set: IdMapSet = (0..MAX_EXTENTS as u32)
            .map(|i| IdMapEntry::new(IdKind::Uid, i, i, 1))
            .collect();
        assert!(set.validate().is_ok());
    }
}
