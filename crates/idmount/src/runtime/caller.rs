//! Moving the caller into its own user namespace.
//!
//! After the mount is published, `--map-caller` replaces this process with an
//! external helper (`lxc-usernsexec` by default) that creates a user namespace
//! with the requested mapping and starts a shell inside it.

use std::os::unix::process::CommandExt;
use std::process::Command;

use idmount_common::{IdmountError, IdmountResult};

use crate::idmap::IdMapSet;

/// Default helper used to enter a mapped user namespace.
pub const DEFAULT_HELPER: &str = "lxc-usernsexec";

/// Default program started inside the caller's namespace.
pub const DEFAULT_SHELL: &str = "bash";

/// Exec hand-off to an external user namespace helper.
#[derive(Debug, Clone)]
pub struct CallerHandoff {
    maps: IdMapSet,
    program: String,
    shell: String,
}

impl CallerHandoff {
    /// Create a hand-off for `maps` using the default helper and shell.
    ///
    /// # Errors
    ///
    /// Returns [`IdmountError::IdMapTooLarge`] if the maps could never be
    /// written by the helper.
    pub fn new(maps: IdMapSet) -> IdmountResult<Self> {
        maps.validate()?;
        Ok(Self {
            maps,
            program: DEFAULT_HELPER.to_string(),
            shell: DEFAULT_SHELL.to_string(),
        })
    }

    /// Use a different helper program.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Start a different program inside the namespace.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Mappings handed to the helper.
    #[must_use]
    pub const fn maps(&self) -> &IdMapSet {
        &self.maps
    }

    /// The helper invocation: `<program> -m <idmap>... -- <shell>`.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        for entry in &self.maps {
            cmd.arg("-m").arg(entry.to_string());
        }
        cmd.arg("--").arg(&self.shell);
        cmd
    }

    /// Replace the current process with the helper.
    ///
    /// Only returns if the helper could not be started.
    #[must_use]
    pub fn exec(self) -> IdmountError {
        tracing::debug!(program = %self.program, shell = %self.shell, "Handing caller off");
        let source = self.command().exec();
        IdmountError::CallerHelper {
            program: self.program,
            source,
        }
    }
}
