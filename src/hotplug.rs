//! Kernel hotplug (uevent) listener
//!
//! One netlink socket bound to the kernel's uevent multicast group.
//! Instead of blocking reads, the descriptor is switched to signal-driven
//! I/O: queued datagrams raise [`READY_SIGNAL`] on the owning process, and
//! the supervision loop drains the queue when it dequeues that signal.
//!
//! The descriptor is process-wide, single-owner state. Every forked child
//! closes it before doing anything else (see [`crate::launch`]), and the
//! supervision loop closes it exactly once while draining.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::socket::{
    bind, recv, socket, AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol, SockType,
};
use nix::unistd::getpid;

use crate::uevent;

/// Large enough for any single uevent datagram.
const UEVENT_BUFFER_SIZE: usize = 2048;

/// Multicast group the kernel broadcasts uevents to.
const UEVENT_GROUP: u32 = 1;

/// Raised on the owning process whenever datagrams are queued.
pub const READY_SIGNAL: Signal = Signal::SIGIO;

#[derive(Debug, thiserror::Error)]
pub enum HotplugError {
    #[error("netlink socket: {0}")]
    Socket(Errno),

    #[error("netlink bind: {0}")]
    Bind(Errno),

    #[error("async notification setup: {0}")]
    Notify(Errno),
}

/// Owner of the netlink uevent descriptor.
#[derive(Debug)]
pub struct HotplugSocket {
    fd: OwnedFd,
}

impl HotplugSocket {
    /// Open the socket, bind it to the uevent group under our pid, and
    /// configure signal-driven delivery. Any failure here is fatal to the
    /// supervisor: without hotplug notifications there is no listener to
    /// recover later.
    pub fn open() -> Result<Self, HotplugError> {
        let fd = socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::empty(),
            SockProtocol::NetlinkKObjectUEvent,
        )
        .map_err(HotplugError::Socket)?;

        let addr = NetlinkAddr::new(getpid().as_raw() as u32, UEVENT_GROUP);
        bind(fd.as_raw_fd(), &addr).map_err(HotplugError::Bind)?;

        setup_async(fd.as_raw_fd(), READY_SIGNAL)?;

        Ok(Self { fd })
    }

    /// Drain every queued datagram, handing each parsed line to `visit`.
    /// Stops when the queue is empty; receive errors end the drain and are
    /// reported, not propagated.
    pub fn drain<F>(&self, mut visit: F)
    where
        F: FnMut(uevent::Line<'_>),
    {
        let mut buf = [0u8; UEVENT_BUFFER_SIZE];

        loop {
            let len = match recv(self.fd.as_raw_fd(), &mut buf, MsgFlags::empty()) {
                Ok(0) => break,
                Ok(len) => len,
                Err(Errno::EAGAIN) => break,
                Err(e) => {
                    log::warn!("netlink recv: {}", e);
                    break;
                }
            };

            uevent::parse_datagram(&buf[..len], &mut visit);
        }
    }

    /// Close on the child side of a fork, before exec or anything else, so
    /// no launched program inherits the descriptor.
    pub fn close_in_child(&self) {
        if let Err(e) = nix::unistd::close(self.fd.as_raw_fd()) {
            log::warn!("close netlink fd: {}", e);
        }
    }

    /// Close the descriptor (the supervision loop's DRAINING step).
    pub fn close(self) {
        drop(self);
    }
}

/// `F_SETSIG` + `F_SETOWN` + `O_ASYNC|O_NONBLOCK`: readiness raises
/// `signal` on this process instead of requiring a blocking read. nix has
/// no wrapper for `F_SETSIG`, so the whole setup stays on raw `fcntl`.
fn setup_async(fd: RawFd, signal: Signal) -> Result<(), HotplugError> {
    // `libc` does not export `F_SETSIG` for every target (e.g. linux-gnu),
    // though the value is fixed by the Linux ABI.
    const F_SETSIG: libc::c_int = 10;
    if unsafe { libc::fcntl(fd, F_SETSIG, signal as libc::c_int) } == -1 {
        return Err(HotplugError::Notify(Errno::last()));
    }

    if unsafe { libc::fcntl(fd, libc::F_SETOWN, libc::getpid()) } == -1 {
        return Err(HotplugError::Notify(Errno::last()));
    }

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(HotplugError::Notify(Errno::last()));
    }

    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_ASYNC | libc::O_NONBLOCK) } == -1 {
        return Err(HotplugError::Notify(Errno::last()));
    }

    Ok(())
}
