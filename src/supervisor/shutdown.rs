//! Terminal actions: power transitions and in-place re-execution
//!
//! Every path here runs after the loop has drained children, closed the
//! hotplug descriptor, and unblocked the signal set. On success none of
//! these return; a failure is reported and handed back, since there is
//! nothing further process 1 can do about a rejected reboot request.

use std::ffi::CString;

use nix::errno::Errno;
use nix::sys::reboot::{reboot, RebootMode};
use nix::unistd::{execv, sync};

/// Which terminating signal ended the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// SIGTERM: flush filesystems, power off.
    Poweroff,
    /// SIGINT: flush filesystems, reboot.
    Reboot,
    /// SIGUSR2: halt.
    Halt,
    /// SIGUSR1: exec the original argument vector over this process,
    /// preserving pid 1.
    ReExec,
}

/// Perform `action`. `argv` is the supervisor's original argument vector,
/// used only for [`Action::ReExec`]. Only returns on failure.
pub fn perform(action: Action, argv: &[String]) -> Errno {
    match action {
        Action::ReExec => reexec(argv),
        Action::Halt => power(RebootMode::RB_HALT_SYSTEM, false),
        Action::Reboot => power(RebootMode::RB_AUTOBOOT, true),
        Action::Poweroff => power(RebootMode::RB_POWER_OFF, true),
    }
}

fn power(mode: RebootMode, flush: bool) -> Errno {
    if flush {
        sync();
    }

    let Err(e) = reboot(mode);
    log::error!("reboot: {}", e);
    e
}

fn reexec(argv: &[String]) -> Errno {
    let cstrings: Result<Vec<CString>, _> = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect();

    let Ok(args) = cstrings else {
        log::error!("re-exec: argument contains NUL byte");
        return Errno::EINVAL;
    };
    let Some(path) = args.first() else {
        log::error!("re-exec: empty argument vector");
        return Errno::EINVAL;
    };

    let Err(e) = execv(path, &args);
    log::error!("re-exec {}: {}", argv[0], e);
    e
}
