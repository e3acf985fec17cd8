//! A zero-copy packet I/O ring protocol and socket family core, modeled on
//! AF_XDP but with the kernel/NIC side simulated in-process: no real socket,
//! no real interrupt, no real NIC driver is involved anywhere in this crate.
//! A test or demo supplies the "device" and "hook" collaborators
//! (see [`xsk::device`]) that a real kernel would otherwise provide.
//!
//! The umem/ring/socket vocabulary and the producer/consumer ring protocol
//! itself are unchanged from the real thing: one fill ring, one completion
//! ring, one rx ring, one tx ring, SPSC, free-running 32-bit counters,
//! acquire/release handoff.

pub mod xdp;
pub mod xsk;

pub use xsk::{BufIdx, DeviceControl, FrameProps, IfCtx, IfInfo, Socket, SocketConfig, Stats, Umem, UmemConfig};

use std::fmt;

/// The error taxonomy of this socket family (spec §7), independent of how
/// any particular operation surfaces it (a `Result` return, a getsockopt
/// snapshot, a log line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XskError {
    /// A caller-supplied argument is out of range or ill-formed.
    Invalid,
    /// No free frame/descriptor slot was available.
    NoBufs,
    /// A memory registration or allocation failed.
    NoMem,
    /// A ring has no room left for the requested reservation.
    NoSpace,
    /// The operation would block; retry is the caller's responsibility.
    Again,
    /// A payload exceeds the device's current MTU.
    MsgSize,
    /// The named device does not exist.
    NoDev,
    /// The device has no queue with that id, or is not XDP-capable.
    NoXio,
    /// The device exists but is administratively or carrier down.
    NetDown,
    /// The requested resource is already claimed by another owner.
    Busy,
    /// A handle was used out of the state it requires (e.g. before bind).
    BadHandle,
    /// The requested configuration is not supported by this implementation.
    NotSupported,
    /// The caller lacks the privilege this operation requires.
    Perm,
}

impl fmt::Display for XskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            XskError::Invalid => "invalid argument",
            XskError::NoBufs => "no buffers available",
            XskError::NoMem => "out of memory",
            XskError::NoSpace => "no space left in ring",
            XskError::Again => "operation would block",
            XskError::MsgSize => "message too long for device MTU",
            XskError::NoDev => "no such device",
            XskError::NoXio => "no such queue on device",
            XskError::NetDown => "network is down",
            XskError::Busy => "resource busy",
            XskError::BadHandle => "handle used in wrong state",
            XskError::NotSupported => "operation not supported",
            XskError::Perm => "operation not permitted",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for XskError {}

pub(crate) fn fatal(msg: &str) -> ! {
    log::error!("{msg}");
    panic!("{msg}");
}
