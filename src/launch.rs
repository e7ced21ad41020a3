//! Process launch strategies
//!
//! Four ways to start a program, all beginning with a fork:
//! - [`run`]: foreground, waits for the child and propagates its exit
//! - [`spawn`]: double-fork, detached; the daemon reparents to process 1
//! - [`respawn`]: like spawn, but the daemon persists a respawn record
//! - [`zombize`]: single fork, never waited on here; the supervision
//!   loop's generic reap collects the exit
//!
//! Child-side contract: the hotplug descriptor (when supplied) is closed
//! first, standard streams are rebound to the requested terminal device,
//! the working directory is reset to `/`, and a failed exec terminates the
//! child with status 127. Stream and directory failures are reported and
//! non-fatal: process 1 must be able to launch on a degraded filesystem.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, close, dup2, execv, fork, getpid, ForkResult, Pid};

use crate::hotplug::HotplugSocket;
use crate::registry::Registry;

/// Reserved exit status for a child whose exec failed.
pub const EXEC_FAILED: i32 = 127;

/// What to execute and where to attach it. Immutable once built; each
/// launch strategy consumes a reference and forks from it.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    path: PathBuf,
    argv: Vec<String>,
    tty: Option<PathBuf>,
}

impl LaunchRequest {
    /// By convention `argv[0]` equals `path`; callers that want a
    /// different argv0 (login shells) pass their own vector.
    pub fn new(path: impl Into<PathBuf>, argv: Vec<String>) -> Self {
        Self {
            path: path.into(),
            argv,
            tty: None,
        }
    }

    /// Build from an applet-style command line: the first word is the
    /// program path and the whole slice is the argument vector.
    pub fn from_command(words: &[String]) -> Option<Self> {
        let first = words.first()?;
        Some(Self::new(first.clone(), words.to_vec()))
    }

    /// Rebind the child's standard streams to this terminal device.
    pub fn with_tty(mut self, dev: impl Into<PathBuf>) -> Self {
        self.tty = Some(dev.into());
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("fork: {0}")]
    Fork(Errno),

    #[error("waitpid: {0}")]
    Wait(Errno),

    #[error("argument contains NUL byte")]
    Nul(#[from] std::ffi::NulError),
}

/// Run in the foreground, wait, and propagate the exit: the child's own
/// status on a normal exit, 128 + the signal number when killed.
pub fn run(req: &LaunchRequest, hotplug: Option<&HotplugSocket>) -> Result<i32, LaunchError> {
    let image = ExecImage::prepare(req)?;

    match unsafe { fork() }.map_err(LaunchError::Fork)? {
        ForkResult::Parent { child } => wait_exit(child),
        ForkResult::Child => image.exec(hotplug),
    }
}

/// Launch detached: the intermediate child forks the daemon and exits
/// immediately, so the daemon is reparented to process 1 and only the
/// intermediate is waited on here.
pub fn spawn(req: &LaunchRequest, hotplug: Option<&HotplugSocket>) -> Result<(), LaunchError> {
    daemonize(req, hotplug, None)
}

/// Launch detached and respawn-eligible: the daemon records its command
/// line in `registry` before exec, so the supervision loop can relaunch
/// it when it exits. The terminal is forced; `/dev/null` when unset.
pub fn respawn(
    req: &LaunchRequest,
    registry: &Registry,
    hotplug: Option<&HotplugSocket>,
) -> Result<(), LaunchError> {
    let mut req = req.clone();
    if req.tty.is_none() {
        req.tty = Some(PathBuf::from("/dev/null"));
    }
    daemonize(&req, hotplug, Some(registry))
}

/// Fire and forget: single fork, no wait. The caller regains control
/// immediately, whether or not the child has already exited; reaping is
/// entirely the supervision loop's job.
pub fn zombize(req: &LaunchRequest, hotplug: Option<&HotplugSocket>) -> Result<Pid, LaunchError> {
    let image = ExecImage::prepare(req)?;

    match unsafe { fork() }.map_err(LaunchError::Fork)? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => image.exec(hotplug),
    }
}

fn daemonize(
    req: &LaunchRequest,
    hotplug: Option<&HotplugSocket>,
    registry: Option<&Registry>,
) -> Result<(), LaunchError> {
    let image = ExecImage::prepare(req)?;

    match unsafe { fork() }.map_err(LaunchError::Fork)? {
        ForkResult::Parent { child } => {
            let status = wait_exit(child)?;
            if status != 0 {
                log::warn!("daemonize intermediate exited {}", status);
            }
            Ok(())
        }
        ForkResult::Child => {
            match unsafe { fork() } {
                Ok(ForkResult::Parent { .. }) => unsafe { libc::_exit(0) },
                Ok(ForkResult::Child) => {
                    if let Some(registry) = registry {
                        if let Err(e) = registry.record(getpid(), req.argv()) {
                            log::warn!("respawn record: {}", e);
                        }
                    }
                    image.exec(hotplug)
                }
                Err(e) => {
                    log::error!("fork daemon: {}", e);
                    unsafe { libc::_exit(1) }
                }
            }
        }
    }
}

fn wait_exit(pid: Pid) -> Result<i32, LaunchError> {
    match waitpid(pid, None).map_err(LaunchError::Wait)? {
        WaitStatus::Exited(_, code) => Ok(code),
        WaitStatus::Signaled(_, signal, _) => {
            log::warn!("{} killed by {}", pid, signal);
            Ok(128 + signal as i32)
        }
        status => {
            log::warn!("unexpected wait status {:?}", status);
            Ok(1)
        }
    }
}

/// Everything the child needs after the fork, allocated before it.
struct ExecImage {
    path: CString,
    argv: Vec<CString>,
    tty: Option<CString>,
}

impl ExecImage {
    fn prepare(req: &LaunchRequest) -> Result<Self, LaunchError> {
        Ok(Self {
            path: CString::new(req.path.as_os_str().as_bytes())?,
            argv: req
                .argv
                .iter()
                .map(|arg| CString::new(arg.as_str()))
                .collect::<Result<_, _>>()?,
            tty: req
                .tty
                .as_ref()
                .map(|dev| CString::new(dev.as_os_str().as_bytes()))
                .transpose()?,
        })
    }

    /// Child side. Never returns: either the exec succeeds or the child
    /// dies with [`EXEC_FAILED`].
    fn exec(&self, hotplug: Option<&HotplugSocket>) -> ! {
        if let Some(hotplug) = hotplug {
            hotplug.close_in_child();
        }

        if let Some(dev) = &self.tty {
            rebind_stdio(dev);
        }

        if let Err(e) = chdir("/") {
            log::warn!("chdir /: {}", e);
        }

        let _ = execv(&self.path, &self.argv);
        unsafe { libc::_exit(EXEC_FAILED) }
    }
}

/// Reopen stdin read-only and stdout write-only on `dev`, then duplicate
/// stderr from stdout. Each step is best-effort: a terminal that fails to
/// open still lets the child exec with whatever streams it has left.
/// Closing the stream first makes the fresh descriptor land on its slot.
fn rebind_stdio(dev: &CStr) {
    let _ = close(libc::STDIN_FILENO);
    if unsafe { libc::open(dev.as_ptr(), libc::O_RDONLY | libc::O_NOCTTY) } == -1 {
        log::warn!("open {} for stdin: {}", dev.to_string_lossy(), Errno::last());
    }

    let _ = close(libc::STDOUT_FILENO);
    if unsafe { libc::open(dev.as_ptr(), libc::O_WRONLY | libc::O_NOCTTY) } == -1 {
        log::warn!("open {} for stdout: {}", dev.to_string_lossy(), Errno::last());
    }

    if let Err(e) = dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) {
        log::warn!("dup stderr: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_from_command() {
        let words = vec!["/bin/foo".to_string(), "-x".to_string()];
        let req = LaunchRequest::from_command(&words).unwrap();
        assert_eq!(req.argv(), &words[..]);
    }

    #[test]
    fn test_from_empty_command() {
        assert!(LaunchRequest::from_command(&[]).is_none());
    }

    #[test]
    fn test_with_tty() {
        let req = request(&["/bin/sh"]).with_tty("/dev/tty2");
        assert_eq!(req.tty.as_deref(), Some(Path::new("/dev/tty2")));
    }

    fn request(words: &[&str]) -> LaunchRequest {
        let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        LaunchRequest::from_command(&words).unwrap()
    }
}
