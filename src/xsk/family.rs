//! The socket-family registry (spec §6): a stand-in for the kernel's
//! `AF_XDP` address family number and the "is this device XDP-capable"
//! check a real `bind(2)` performs against the NIC driver.

/// Address family value used by [`crate::xdp::SockAddrXdp`]. Chosen to match
/// the real kernel's `AF_XDP = 44` so that wire structures stay
/// bit-compatible with the interface this crate mirrors.
pub const AF_XDP: u16 = 44;

/// Whether a device is capable of carrying raw packet I/O of the kind this
/// socket family requires (spec §6: "raw packet capability check").
///
/// Grounded on the teacher's `with_xdp_socket`/netns-cookie probe
/// (`xsk/socket.rs`): a capability probe that a real bind would run against
/// the driver. Since there is no real driver here, the check is delegated to
/// the [`super::device::Device`] collaborator itself.
pub fn supports_raw_packets(device: &dyn super::device::Device) -> bool {
    device.supports_raw_packets()
}
