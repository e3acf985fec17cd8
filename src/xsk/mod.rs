//! The simulated kernel/user split for this socket family.
//!
//! Everything here plays the role that, for a real AF_XDP socket, would be
//! split across the kernel (ring producer/consumer discipline, umem
//! pinning, bind/setsockopt handling) and libc (mmap, socket, sendmsg). We
//! have no real kernel to defer to, so the hook-layer dispatch and the NIC
//! are modeled as explicit collaborators (`device`) that a test or demo
//! plugs in, and the rest — rings, umem, socket lifecycle, RX/TX engines —
//! is a faithful from-scratch implementation of the protocol spec.md
//! describes.

pub mod device;
pub mod family;
pub mod iface;
pub mod poll;
pub mod ring;
pub mod rx;
pub mod socket;
pub mod tx;
pub mod umem;
pub mod user;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use device::{Device, Hook, HookBuffer};
pub use iface::{IfCtx, IfInfo};
pub use ring::{RingCons, RingProd};
pub use socket::{BindFlags, RingKind, Socket, SocketConfig};
pub use umem::{Frame, Umem, UmemConfig};

/// An index to a buffer in some ring.
///
/// Not a pure offset: masking by the ring's capacity is needed to resolve a
/// slot. Producer and consumer heads are free-running modulo 2^32, so only a
/// ring that knows its own mask can turn this into a memory location.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BufIdx(pub u32);

/// A frozen snapshot of a umem's sizing, broadcast to every ring bound to
/// it so that ring-level descriptor validation (spec.md §4.1) needs no back
/// reference to the umem itself.
#[derive(Debug, Clone, Copy)]
pub struct FrameProps {
    pub frame_size: u32,
    pub headroom: u32,
    pub num_frames: u32,
}

/// Per-socket counters, §6's `STATISTICS` getsockopt payload plus the
/// supplementary fields of `XdpStatisticsV2` (SPEC_FULL.md item C.4).
#[derive(Debug, Default)]
pub struct Stats {
    pub rx_dropped: AtomicU64,
    pub rx_invalid_descs: AtomicU64,
    pub tx_invalid_descs: AtomicU64,
    pub rx_ring_full: AtomicU64,
    pub rx_fill_ring_empty_descs: AtomicU64,
    pub tx_ring_empty_descs: AtomicU64,
}

impl Stats {
    pub fn snapshot(&self) -> crate::xdp::XdpStatistics {
        crate::xdp::XdpStatistics {
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            rx_invalid_descs: self.rx_invalid_descs.load(Ordering::Relaxed),
            tx_invalid_descs: self.tx_invalid_descs.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot_v2(&self) -> crate::xdp::XdpStatisticsV2 {
        crate::xdp::XdpStatisticsV2 {
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            rx_invalid_descs: self.rx_invalid_descs.load(Ordering::Relaxed),
            tx_invalid_descs: self.tx_invalid_descs.load(Ordering::Relaxed),
            rx_ring_full: self.rx_ring_full.load(Ordering::Relaxed),
            rx_fill_ring_empty_descs: self.rx_fill_ring_empty_descs.load(Ordering::Relaxed),
            tx_ring_empty_descs: self.tx_ring_empty_descs.load(Ordering::Relaxed),
        }
    }
}

/// A set of `(device, queue)` pairs currently claimed by some umem's
/// fill/completion ring pair, guarding against two owners racing to
/// register for the same device queue.
///
/// Grounded directly on the teacher's `ControlSet`/`XskDeviceControl`
/// (`xsk/umem.rs`): a `spin::RwLock` behind a small trait object, kept
/// exactly where the teacher already used it because nothing about this
/// exclusion check benefits from a blocking mutex.
pub trait ControlSet: Send + Sync {
    fn insert(&self, ctx: IfCtx) -> bool;
    fn contains(&self, ctx: &IfCtx) -> bool;
    fn remove(&self, ctx: &IfCtx);
}

#[derive(Clone)]
pub struct DeviceControl {
    inner: Arc<dyn ControlSet>,
}

impl DeviceControl {
    pub fn new() -> Self {
        DeviceControl {
            inner: Arc::new(SpinLockedControlSet::default()),
        }
    }
}

impl Default for DeviceControl {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for DeviceControl {
    type Target = dyn ControlSet;
    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

#[derive(Default)]
struct SpinLockedControlSet {
    inner: spin::RwLock<std::collections::BTreeSet<IfCtx>>,
}

impl ControlSet for SpinLockedControlSet {
    fn insert(&self, ctx: IfCtx) -> bool {
        self.inner.write().insert(ctx)
    }

    fn contains(&self, ctx: &IfCtx) -> bool {
        self.inner.read().contains(ctx)
    }

    fn remove(&self, ctx: &IfCtx) {
        self.inner.write().remove(ctx);
    }
}
