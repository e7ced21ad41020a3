//! The supervision loop
//!
//! Top-level state machine of process 1:
//! `STARTING → RUNNING → DRAINING → <terminal action>`.
//!
//! STARTING blocks the signal set, opens the hotplug listener, prepares
//! the respawn registry, and spawns the boot script. RUNNING then blocks
//! on exactly one thing: the next signal of the set. Every dispatch runs
//! to completion before the next wait, so no two state transitions of
//! process 1 can interleave.

mod reaper;
mod shutdown;
mod signals;

pub use reaper::{reap_all, ExitKind, Reaped};
pub use shutdown::Action;
pub use signals::{Event, SignalSet};

use std::convert::Infallible;
use std::path::Path;
use std::process;

use nix::errno::Errno;
use nix::unistd::Pid;

use crate::hotplug::{HotplugError, HotplugSocket};
use crate::launch::{self, LaunchRequest};
use crate::registry::Registry;
use crate::uevent;

/// Boot script, invoked once at startup with a single `start` argument.
const BOOT_SCRIPT: &str = "/etc/init.d/rcS";
const BOOT_ARG: &str = "start";

/// Shell spawned on announced terminals. argv0 carries the login dash.
const SHELL: &str = "/bin/sh";
const SHELL_ARGV0: &str = "-sh";

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("cannot block signal set: {0}")]
    Block(Errno),

    #[error("signal wait: {0}")]
    Wait(Errno),

    #[error(transparent)]
    Hotplug(#[from] HotplugError),

    #[error("{0:?} transition failed")]
    Transition(Action),
}

/// Check if we are running as process 1.
pub fn is_pid1() -> bool {
    process::id() == 1
}

/// The supervision engine. Owns the signal set and the hotplug descriptor
/// between STARTING and DRAINING.
pub struct Supervisor {
    argv: Vec<String>,
    registry: Registry,
}

impl Supervisor {
    /// `argv` is the supervisor's own argument vector, kept verbatim for
    /// the re-exec transition.
    pub fn new(argv: Vec<String>) -> Self {
        Self::with_registry(argv, Registry::runtime())
    }

    pub fn with_registry(argv: Vec<String>, registry: Registry) -> Self {
        Self { argv, registry }
    }

    /// Run the supervisor until a terminating signal arrives and the
    /// corresponding power transition is performed. Only returns on
    /// failure: fatal setup errors, or a transition the OS rejected.
    pub fn run(self) -> Result<Infallible, SupervisorError> {
        // STARTING
        let signals = SignalSet::new();
        signals.block().map_err(SupervisorError::Block)?;

        let hotplug = HotplugSocket::open()?;

        log::info!("tinit started");

        if let Err(e) = self.registry.ensure_dir() {
            log::warn!("registry dir: {}", e);
        }
        // records left behind by an unclean stop or a re-exec: live pids
        // are still our children and their records are still good
        self.registry.collect_stale(|_, _| true);

        let boot = LaunchRequest::new(
            BOOT_SCRIPT,
            vec![BOOT_SCRIPT.to_string(), BOOT_ARG.to_string()],
        );
        if let Err(e) = launch::spawn(&boot, Some(&hotplug)) {
            log::error!("boot script: {}", e);
        }

        // RUNNING
        let action = loop {
            match signals.wait().map_err(SupervisorError::Wait)? {
                Event::ChildExited { pid } => {
                    self.respawn_from_record(pid, Some(&hotplug));
                    for child in reaper::reap_all() {
                        self.respawn_from_record(child.pid, Some(&hotplug));
                    }
                }
                Event::HotplugReady => self.drain_hotplug(&hotplug),
                Event::Terminate => break Action::Poweroff,
                Event::Interrupt => break Action::Reboot,
                Event::ReExecute => break Action::ReExec,
                Event::Halt => break Action::Halt,
            }
        };

        // DRAINING
        reaper::reap_all();
        hotplug.close();
        if let Err(e) = signals.unblock() {
            log::warn!("unblock signal set: {}", e);
        }

        log::info!("tinit stopped");

        shutdown::perform(action, &self.argv);
        Err(SupervisorError::Transition(action))
    }

    /// Consume the pid's registry record, if any, and relaunch the
    /// recorded command line. A pid with no record is the common case and
    /// a no-op.
    fn respawn_from_record(&self, pid: Pid, hotplug: Option<&HotplugSocket>) {
        match self.registry.take(pid) {
            Ok(None) => {}
            Ok(Some(argv)) => {
                log::info!("{} exited, respawning {}", pid, argv.join(" "));
                let Some(req) = LaunchRequest::from_command(&argv) else {
                    return;
                };
                if let Err(e) = launch::respawn(&req, &self.registry, hotplug) {
                    log::error!("respawn: {}", e);
                }
            }
            Err(e) => log::warn!("respawn record for {}: {}", pid, e),
        }
    }

    fn drain_hotplug(&self, hotplug: &HotplugSocket) {
        hotplug.drain(|line| {
            if let uevent::Line::Variable {
                key: "DEVNAME",
                value,
            } = line
            {
                if uevent::wants_login_shell(value) {
                    self.spawn_shell(value, hotplug);
                }
            }
        });
    }

    /// Askfirst shell on a freshly announced terminal: fire and forget,
    /// bound to the device, reaped later like any other orphan.
    fn spawn_shell(&self, devname: &str, hotplug: &HotplugSocket) {
        log::info!("terminal {} appeared, spawning shell", devname);

        let req = LaunchRequest::new(SHELL, vec![SHELL_ARGV0.to_string()])
            .with_tty(Path::new("/dev").join(devname));

        match launch::zombize(&req, Some(hotplug)) {
            Ok(pid) => log::debug!("shell on {} running as {}", devname, pid),
            Err(e) => log::error!("shell on {}: {}", devname, e),
        }
    }
}
