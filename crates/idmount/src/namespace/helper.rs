#![allow(unsafe_code)]
//! Stopped helper process that owns a fresh user namespace.
//!
//! The kernel only lets a user namespace's maps be written through the
//! `/proc` entries of a process living in it. The helper is forked, moves
//! itself into a new user namespace and stops. The parent then configures the
//! namespace from outside, takes a handle to it and kills the helper.

use std::io;

use idmount_common::{IdmountError, IdmountResult};

/// A forked child frozen with `SIGSTOP` inside a new user namespace.
///
/// Dropping the helper kills and reaps the child.
#[derive(Debug)]
pub struct StoppedHelper {
    pid: libc::pid_t,
    reaped: bool,
}

impl StoppedHelper {
    /// Fork the helper and wait until it has stopped itself.
    ///
    /// # Errors
    ///
    /// Returns [`IdmountError::Namespace`] if the fork fails or the child
    /// could not create its user namespace.
    pub fn spawn() -> IdmountResult<Self> {
        // SAFETY: the child only performs async-signal-safe syscalls before
        // `_exit`, so forking from a threaded parent is sound.
        let pid = unsafe { libc::fork() };

        if pid < 0 {
            return Err(IdmountError::Namespace {
                message: "fork failed".to_string(),
                source: io::Error::last_os_error(),
            });
        }

        if pid == 0 {
            // SAFETY: single-threaded forked child; only raw syscalls until `_exit`.
            unsafe {
                if libc::unshare(libc::CLONE_NEWUSER) != 0 {
                    let errno = io::Error::last_os_error()
                        .raw_os_error()
                        .unwrap_or(libc::EINVAL);
                    libc::_exit(errno);
                }
                libc::kill(libc::getpid(), libc::SIGSTOP);
                libc::_exit(0);
            }
        }

        let mut helper = Self { pid, reaped: false };
        helper.wait_stopped()?;

        tracing::debug!(pid, "Helper stopped in new user namespace");
        Ok(helper)
    }

    /// Process ID of the helper.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid.unsigned_abs()
    }

    /// Kill and reap the helper.
    pub fn terminate(mut self) {
        self.kill_and_reap();
    }

    fn wait_stopped(&mut self) -> IdmountResult<()> {
        let status = self.wait(libc::WUNTRACED)?;
        if libc::WIFSTOPPED(status) {
            return Ok(());
        }

        self.reaped = true;
        Err(IdmountError::Namespace {
            message: "helper could not create a user namespace".to_string(),
            source: exit_error(status),
        })
    }

    /// `waitpid` for the helper, retrying on `EINTR`.
    fn wait(&self, options: libc::c_int) -> IdmountResult<libc::c_int> {
        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: `status` is a valid out-pointer for the duration of the call.
            let result = unsafe { libc::waitpid(self.pid, &mut status, options) };
            if result == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(IdmountError::Namespace {
                    message: format!("waitpid({}) failed", self.pid),
                    source: err,
                });
            }
            if result == self.pid {
                return Ok(status);
            }
        }
    }

    fn kill_and_reap(&mut self) {
        if self.reaped {
            return;
        }

        // SAFETY: `pid` is our unreaped child, so it cannot have been recycled.
        unsafe {
            libc::kill(self.pid, libc::SIGKILL);
        }

        // The helper's exit status carries no information once it is killed.
        match self.wait(0) {
            Ok(status) => tracing::debug!(pid = self.pid, status, "Reaped helper"),
            Err(err) => tracing::warn!(pid = self.pid, error = %err, "Failed to reap helper"),
        }
        self.reaped = true;
    }
}

/// Error for a helper that ended instead of stopping.
///
/// A nonzero exit code is the errno `unshare` failed with.
fn exit_error(status: libc::c_int) -> io::Error {
    if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) != 0 {
        io::Error::from_raw_os_error(libc::WEXITSTATUS(status))
    } else {
        io::Error::other(format!("helper ended with status {status:#x}"))
    }
}

impl Drop for StoppedHelper {
    fn drop(&mut self) {
        self.kill_and_reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_is_reported_as_errno() {
        // Exited with status EPERM, as `_exit(errno)` after a refused unshare.
        let status = libc::EPERM << 8;
        assert!(libc::WIFEXITED(status));

        let err = exit_error(status);
        assert_eq!(err.raw_os_error(), Some(libc::EPERM));
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn signal_death_is_not_an_errno() {
        let status = libc::SIGKILL;
        assert!(libc::WIFSIGNALED(status));

        let err = exit_error(status);
        assert_eq!(err.raw_os_error(), None);
        assert!(err.to_string().contains("0x9"));
    }

    #[test]
    fn clean_exit_without_stop_is_an_error() {
        assert_eq!(exit_error(0).raw_os_error(), None);
    }

    #[cfg(feature = "integration")]
    #[test]
    fn helper_lives_in_other_namespace() {
        let helper = StoppedHelper::spawn().unwrap();
        let ours = std::fs::read_link("/proc/self/ns/user").unwrap();
        let theirs = std::fs::read_link(format!("/proc/{}/ns/user", helper.pid())).unwrap();
        assert_ne!(ours, theirs);

        let pid = helper.pid();
        helper.terminate();
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }

    #[cfg(feature = "integration")]
    #[test]
    fn drop_reaps_helper() {
        let pid = {
            let helper = StoppedHelper::spawn().unwrap();
            helper.pid()
        };
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }
}
