//! Multi-call applet dispatch
//!
//! The binary answers to more names than its own: symlinked as `reboot`,
//! `poweroff`, `halt`, or `re-exec` it signals the running supervisor;
//! as `spawn`, `respawn`, or `zombize` it invokes the matching launch
//! strategy on a locally supplied command line.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::launch::{self, LaunchRequest};
use crate::registry::Registry;

/// Everything the multi-call binary answers to besides its own name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applet {
    /// Deliver this signal to process 1.
    Signal(Signal),
    /// Detached launch of the given command.
    Spawn,
    /// Detached, respawn-eligible launch against the null device.
    Respawn,
    /// Fire-and-forget launch of the given command.
    Zombize,
}

impl Applet {
    /// Resolve an invocation name: the base name of argv[0], or the first
    /// argument when the canonical binary delegates.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reboot" => Some(Self::Signal(Signal::SIGINT)),
            "poweroff" => Some(Self::Signal(Signal::SIGTERM)),
            "halt" => Some(Self::Signal(Signal::SIGUSR2)),
            "re-exec" => Some(Self::Signal(Signal::SIGUSR1)),
            "spawn" => Some(Self::Spawn),
            "respawn" => Some(Self::Respawn),
            "zombize" => Some(Self::Zombize),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppletError {
    #[error("unrecognized applet {0:?}")]
    Unrecognized(String),

    #[error("missing command")]
    MissingCommand,

    #[error("cannot signal process 1: {0}")]
    Kill(Errno),

    #[error(transparent)]
    Launch(#[from] launch::LaunchError),
}

/// Run `name` as an applet. `args` is the COMMAND vector for the launch
/// applets, forwarded verbatim as the target's argument vector.
pub fn dispatch(name: &str, args: &[String]) -> Result<(), AppletError> {
    let applet =
        Applet::from_name(name).ok_or_else(|| AppletError::Unrecognized(name.to_string()))?;

    match applet {
        Applet::Signal(signal) => {
            kill(Pid::from_raw(1), signal).map_err(AppletError::Kill)?;
        }
        Applet::Spawn => {
            let req = command(args)?;
            launch::spawn(&req, None)?;
        }
        Applet::Respawn => {
            let req = command(args)?;
            launch::respawn(&req, &Registry::runtime(), None)?;
        }
        Applet::Zombize => {
            let req = command(args)?;
            launch::zombize(&req, None)?;
        }
    }

    Ok(())
}

fn command(args: &[String]) -> Result<LaunchRequest, AppletError> {
    LaunchRequest::from_command(args).ok_or(AppletError::MissingCommand)
}
