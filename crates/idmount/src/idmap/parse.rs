//! Idmap spec parsing.
//!
//! Grammar: `<kind>:<ns_id>:<host_id>:<range>` where `<kind>` is one of
//! `b`/`both`, `u`/`uid` or `g`/`gid`. Several specs may share one argument
//! when separated by whitespace.

use std::path::PathBuf;
use std::str::FromStr;

use idmount_common::{IdmountError, IdmountResult, ProcPaths};

use super::{IdKind, IdMapEntry, IdMapSet};

fn invalid(spec: &str, reason: impl Into<String>) -> IdmountError {
    IdmountError::InvalidIdMap {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_kinds(spec: &str, kind: &str) -> IdmountResult<&'static [IdKind]> {
    match kind {
        "b" | "both" => Ok(&IdKind::ALL),
        "u" | "uid" => Ok(&[IdKind::Uid]),
        "g" | "gid" => Ok(&[IdKind::Gid]),
        other => Err(invalid(spec, format!("unknown kind '{other}'"))),
    }
}

fn parse_id(spec: &str, field: &str, value: &str) -> IdmountResult<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(spec, format!("{field} must be a decimal number")));
    }
    value
        .parse()
        .map_err(|_| invalid(spec, format!("{field} does not fit in 32 bits")))
}

/// Parse a single idmap spec.
///
/// A `both` spec yields a UID entry followed by a GID entry with identical
/// numbers.
///
/// # Errors
///
/// Returns [`IdmountError::InvalidIdMap`] if the spec does not follow the
/// grammar.
pub fn parse_entries(spec: &str) -> IdmountResult<Vec<IdMapEntry>> {
    let fields: Vec<&str> = spec.split(':').collect();
    let [kind, ns_id, host_id, range] = fields.as_slice() else {
        return Err(invalid(spec, "expected <kind>:<ns_id>:<host_id>:<range>"));
    };

    let kinds = parse_kinds(spec, kind)?;
    let ns_id = parse_id(spec, "ns_id", ns_id)?;
    let host_id = parse_id(spec, "host_id", host_id)?;
    let range = parse_id(spec, "range", range)?;

    Ok(kinds
        .iter()
        .map(|&kind| IdMapEntry::new(kind, ns_id, host_id, range))
        .collect())
}

impl FromStr for IdMapSet {
    type Err = IdmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = Self::new();
        for spec in s.split_whitespace() {
            set.extend(parse_entries(spec)?);
        }
        if set.is_empty() {
            return Err(invalid(s, "no idmap given"));
        }
        Ok(set)
    }
}

/// One `--map-mount` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapArg {
    /// Explicit mappings.
    Entries(IdMapSet),
    /// Path of an existing user namespace, e.g. `/proc/1234/ns/user`.
    Namespace(PathBuf),
}

impl FromStr for MapArg {
    type Err = IdmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = PathBuf::from(s);
        if ProcPaths::new().contains(&path) {
            return Ok(Self::Namespace(path));
        }
        s.parse().map(Self::Entries)
    }
}

/// Where the idmap for the mount comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountMapping {
    /// Mappings realized in a fresh user namespace. May be empty.
    Entries(IdMapSet),
    /// An existing user namespace to borrow the mapping from.
    Namespace(PathBuf),
}

impl MountMapping {
    /// No idmap at all; the tree is published as a plain bind mount.
    #[must_use]
    pub fn none() -> Self {
        Self::Entries(IdMapSet::new())
    }

    /// Whether the mount is published without an idmap.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::Entries(set) if set.is_empty())
    }
}

impl Default for MountMapping {
    fn default() -> Self {
        Self::none()
    }
}

/// Combine all `--map-mount` values into one mapping.
///
/// # Errors
///
/// Returns [`IdmountError::ConflictingMappings`] when a namespace path is
/// combined with explicit mappings or with another namespace path.
pub fn parse_mount_mapping(args: impl IntoIterator<Item = MapArg>) -> IdmountResult<MountMapping> {
    let mut set = IdMapSet::new();
    let mut namespace: Option<PathBuf> = None;

    for arg in args {
        match arg {
            MapArg::Entries(entries) => set.extend(entries.entries().iter().copied()),
            MapArg::Namespace(path) => {
                if let Some(previous) = &namespace {
                    return Err(IdmountError::ConflictingMappings {
                        message: format!(
                            "both {} and {} given",
                            previous.display(),
                            path.display()
                        ),
                    });
                }
                namespace = Some(path);
            }
        }
    }

    match namespace {
        Some(path) if !set.is_empty() => Err(IdmountError::ConflictingMappings {
            message: format!("{} combined with explicit idmaps", path.display()),
        }),
        Some(path) => Ok(MountMapping::Namespace(path)),
        None => Ok(MountMapping::Entries(set)),
    }
}
