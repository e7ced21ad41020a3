//! Integration tests for the blocked-signal event wait
//!
//! `sigprocmask` and `raise` are thread-scoped here: each test blocks the
//! set on its own thread and raises thread-directed signals, so the
//! harness's other threads never see them.

use tinit::supervisor::{Event, SignalSet};

fn raise(signal: libc::c_int) {
    assert_eq!(unsafe { libc::raise(signal) }, 0);
}

#[test]
fn test_wait_decodes_terminating_signals() {
    let signals = SignalSet::new();
    signals.block().unwrap();

    raise(libc::SIGUSR2);
    assert_eq!(signals.wait().unwrap(), Event::Halt);

    raise(libc::SIGUSR1);
    assert_eq!(signals.wait().unwrap(), Event::ReExecute);

    raise(libc::SIGTERM);
    assert_eq!(signals.wait().unwrap(), Event::Terminate);

    raise(libc::SIGINT);
    assert_eq!(signals.wait().unwrap(), Event::Interrupt);

    signals.unblock().unwrap();
}

#[test]
fn test_wait_decodes_hotplug_readiness() {
    let signals = SignalSet::new();
    signals.block().unwrap();

    raise(libc::SIGIO);
    assert_eq!(signals.wait().unwrap(), Event::HotplugReady);

    signals.unblock().unwrap();
}

#[test]
fn test_wait_decodes_child_exit() {
    let signals = SignalSet::new();
    signals.block().unwrap();

    raise(libc::SIGCHLD);
    assert!(matches!(
        signals.wait().unwrap(),
        Event::ChildExited { .. }
    ));

    signals.unblock().unwrap();
}

#[test]
fn test_pending_signals_coalesce() {
    let signals = SignalSet::new();
    signals.block().unwrap();

    // three raises, one pending notification
    raise(libc::SIGUSR2);
    raise(libc::SIGUSR2);
    raise(libc::SIGUSR2);
    assert_eq!(signals.wait().unwrap(), Event::Halt);

    // the set is drained: a different signal is seen next, not a repeat
    raise(libc::SIGTERM);
    assert_eq!(signals.wait().unwrap(), Event::Terminate);

    signals.unblock().unwrap();
}
