//! Orchestration of an idmapped mount.

pub mod caller;
mod orchestrator;

pub use caller::CallerHandoff;
pub use orchestrator::IdmappedMount;
