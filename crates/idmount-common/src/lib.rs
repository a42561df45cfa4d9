//! # idmount-common
//!
//! Shared types for the idmount workspace:
//! - The common error type and result alias
//! - Paths into `/proc` used while building user namespaces

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{IdmountError, IdmountResult};
pub use paths::ProcPaths;
