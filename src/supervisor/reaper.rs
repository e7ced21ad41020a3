//! Non-blocking zombie reaping
//!
//! Orphans reparent to process 1, so process 1 must wait() for them or the
//! process table fills with zombies. The engine keeps no table of live
//! children; one drain collects whatever the kernel has waiting.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Exit information for a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Exited(i32),
    Signaled(i32),
}

/// A child collected by one drain pass.
#[derive(Debug, Clone, Copy)]
pub struct Reaped {
    pub pid: Pid,
    pub exit: ExitKind,
}

/// Collect every currently-waitable child. One SIGCHLD can stand for
/// several exits, so callers drain instead of waiting for the reported
/// pid alone. Returns the reaped set; empty when nothing has exited.
pub fn reap_all() -> Vec<Reaped> {
    let mut reaped = Vec::new();

    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(WaitStatus::Exited(pid, code)) => {
                log::debug!("reaped {} (exited {})", pid, code);
                reaped.push(Reaped {
                    pid,
                    exit: ExitKind::Exited(code),
                });
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                log::debug!("reaped {} (killed by {})", pid, signal);
                reaped.push(Reaped {
                    pid,
                    exit: ExitKind::Signaled(signal as i32),
                });
            }
            Ok(_) => continue,
            Err(Errno::ECHILD) => break,
            Err(e) => {
                log::warn!("waitpid: {}", e);
                break;
            }
        }
    }

    reaped
}
