//! tinit - minimal process-1 supervisor for embedded Linux
//!
//! Owns the machine's process lifecycle from boot to shutdown:
//! - Runs the system init script at startup
//! - Reaps every orphaned child
//! - Spawns login shells on kernel-announced terminals
//! - Restarts respawn-registered processes when they exit
//! - Performs the poweroff/reboot/halt/re-exec transitions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                     tinit                       │
//! ├──────────────┬───────────────┬──────────────────┤
//! │   Applets    │  Supervision  │ Hotplug Listener │
//! │  (multicall) │     Loop      │    (netlink)     │
//! ├──────────────┴───────┬───────┴──────────────────┤
//! │   Process Launcher   │     Respawn Registry     │
//! └──────────────────────┴──────────────────────────┘
//! ```
//!
//! All state transitions of process 1 are serialized through one blocking
//! wait on a blocked signal set; see [`supervisor`].

pub mod applet;
pub mod hotplug;
pub mod launch;
pub mod registry;
pub mod supervisor;
pub mod uevent;
