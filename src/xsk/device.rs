//! The collaborators spec §1 places out of scope: the NIC driver and the
//! hook point that delivers inbound frames. A real AF_XDP socket gets both
//! for free from the kernel; this crate models them as traits so that the
//! ring/socket/RX/TX engine code can be exercised without a real kernel or
//! NIC, exactly as `tests/` and `demos/` do.

use crate::XskError;

/// A simulated network device: the thing a bound socket's TX engine submits
/// completed frames to, and whose MTU/up-down state gates transmission.
pub trait Device: Send + Sync {
    /// Maximum transmittable frame length, in bytes.
    fn mtu(&self) -> u32;

    /// Number of RX queues this device exposes. `bind`'s `queue_id` must be
    /// strictly less than this (spec §4.3 "Bind" preconditions).
    fn num_rx_queues(&self) -> u32;

    /// Whether the device is currently administratively and carrier up.
    fn is_up(&self) -> bool;

    /// Whether this device can be bound for raw packet I/O at all.
    fn supports_raw_packets(&self) -> bool {
        true
    }

    /// Submit one frame for transmission. Never blocks; a device that is
    /// momentarily unable to accept more frames returns
    /// [`XskError::Again`].
    fn transmit(&self, frame: &[u8]) -> Result<(), XskError>;
}

/// One inbound frame delivered by the hook point, ready to be copied into a
/// fill-ring frame by the RX engine (spec §4.4).
#[derive(Debug, Clone)]
pub struct HookBuffer {
    pub data: Vec<u8>,
}

impl HookBuffer {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        HookBuffer { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The inbound delivery point a device is attached to. Spec §4.4 calls this
/// "the hook" generically; here it is anything that can be asked "is there a
/// frame queued for `(ifindex, queue_id)`".
pub trait Hook: Send + Sync {
    /// Pop the next queued frame for this device/queue, if any. Never
    /// blocks.
    fn poll(&self, ifindex: u32, queue_id: u32) -> Option<HookBuffer>;
}
