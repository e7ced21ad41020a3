//! Signal set and event wait for the supervision loop
//!
//! The six managed signals are blocked for the loop's whole lifetime and
//! consumed one at a time with `sigwaitinfo(2)`. Blocking means none are
//! lost between waits; repeats of one signal number coalesce into a single
//! pending notification, which is why the child-exited handler always
//! drains every waitable child rather than trusting the reported pid
//! alone.

use nix::errno::Errno;
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use nix::unistd::Pid;

use crate::hotplug;

/// One decoded wake-up of the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// SIGCHLD. `pid` is the child the kernel reported; coalescing means
    /// other children may be waitable too.
    ChildExited { pid: Pid },
    /// The hotplug descriptor has queued datagrams.
    HotplugReady,
    /// SIGTERM: power off.
    Terminate,
    /// SIGINT: reboot.
    Interrupt,
    /// SIGUSR1: replace the supervisor in place.
    ReExecute,
    /// SIGUSR2: halt.
    Halt,
}

/// The fixed set of signals the loop owns.
pub struct SignalSet {
    set: SigSet,
}

impl SignalSet {
    pub fn new() -> Self {
        let mut set = SigSet::empty();
        for signal in [
            Signal::SIGTERM,
            Signal::SIGINT,
            Signal::SIGUSR1,
            Signal::SIGUSR2,
            Signal::SIGCHLD,
            hotplug::READY_SIGNAL,
        ] {
            set.add(signal);
        }
        Self { set }
    }

    /// Block the whole set. Must precede opening the hotplug socket and
    /// launching the first child, or a signal could fire unqueued.
    pub fn block(&self) -> Result<(), Errno> {
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&self.set), None)
    }

    /// Undo [`SignalSet::block`] during the final shutdown window.
    pub fn unblock(&self) -> Result<(), Errno> {
        sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&self.set), None)
    }

    /// Block until one signal of the set is pending and decode it into an
    /// [`Event`]. Interruption by an unrelated signal retries the wait.
    pub fn wait(&self) -> Result<Event, Errno> {
        loop {
            let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
            let signo = unsafe { libc::sigwaitinfo(self.set.as_ref(), &mut info) };

            if signo == -1 {
                let errno = Errno::last();
                if errno == Errno::EINTR {
                    continue;
                }
                return Err(errno);
            }

            match decode(signo, &info) {
                Some(event) => return Ok(event),
                None => log::warn!("ignoring unexpected signal {}", signo),
            }
        }
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(signo: libc::c_int, info: &libc::siginfo_t) -> Option<Event> {
    match Signal::try_from(signo) {
        Ok(Signal::SIGCHLD) => Some(Event::ChildExited {
            pid: Pid::from_raw(unsafe { info.si_pid() }),
        }),
        Ok(Signal::SIGTERM) => Some(Event::Terminate),
        Ok(Signal::SIGINT) => Some(Event::Interrupt),
        Ok(Signal::SIGUSR1) => Some(Event::ReExecute),
        Ok(Signal::SIGUSR2) => Some(Event::Halt),
        Ok(signal) if signal == hotplug::READY_SIGNAL => Some(Event::HotplugReady),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_signal(signal: Signal) -> Option<Event> {
        let info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        decode(signal as libc::c_int, &info)
    }

    #[test]
    fn test_decode_covers_the_managed_set() {
        assert_eq!(decode_signal(Signal::SIGTERM), Some(Event::Terminate));
        assert_eq!(decode_signal(Signal::SIGINT), Some(Event::Interrupt));
        assert_eq!(decode_signal(Signal::SIGUSR1), Some(Event::ReExecute));
        assert_eq!(decode_signal(Signal::SIGUSR2), Some(Event::Halt));
        assert_eq!(decode_signal(hotplug::READY_SIGNAL), Some(Event::HotplugReady));
        assert!(matches!(
            decode_signal(Signal::SIGCHLD),
            Some(Event::ChildExited { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unmanaged_signals() {
        assert_eq!(decode_signal(Signal::SIGHUP), None);
        assert_eq!(decode_signal(Signal::SIGALRM), None);
    }
}
