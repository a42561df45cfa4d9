//! # idmount
//!
//! Idmapped mounts from the command line.
//!
//! An idmapped mount is a bind mount of a source tree whose file ownership is
//! translated through a user namespace's ID map when seen at the target.
//! Nothing on disk is copied or chowned.
//!
//! ## Pipeline
//!
//! 1. Parse idmap specs into an [`idmap::IdMapSet`]
//! 2. Realize them in a throwaway user namespace ([`namespace::UserNamespace`])
//! 3. Clone the source mount into a detached tree ([`mount::DetachedMount`])
//! 4. Attach the namespace's idmap to the tree ([`mount::attach_idmap`])
//! 5. Move the tree onto the target ([`mount::publish`])
//!
//! ## Usage
//!
//! ```no_run
//! use idmount::IdmappedMount;
//! use idmount::idmap::{MapArg, parse_mount_mapping};
//!
//! # fn example() -> idmount_common::IdmountResult<()> {
//! let mapping = parse_mount_mapping(["b:0:10000:10000".parse::<MapArg>()?])?;
//! IdmappedMount::new("/data", "/mnt").mapping(mapping).run()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod idmap;
pub mod mount;
pub mod namespace;
pub mod runtime;

pub use runtime::IdmappedMount;
