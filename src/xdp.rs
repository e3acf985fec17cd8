//! Wire-compatible structures for the external interfaces of this socket
//! family. These mirror the shape of the real AF_XDP kernel interface (see
//! `linux/if_xdp.h`) but redefine the data-ring descriptor as an explicit
//! `{index, length, offset}` triple rather than a single opaque `addr`, so
//! that index-bounds and offset/length validation can be expressed without
//! decoding an address back into a frame index (see `xsk::ring`).
#![allow(missing_docs)]

/// Rx/Tx descriptor.
///
/// The layout of this struct is part of the ring-mapping interface: 12
/// bytes, natural alignment, no padding.
#[repr(C)]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct XdpDesc {
    /// Index into the umem's frame array.
    pub index: u32,
    /// Number of valid payload bytes at `offset`.
    pub length: u32,
    /// Byte offset within the frame where the payload starts.
    pub offset: u32,
}

const _NO_PADDING: () = {
    assert!(core::mem::size_of::<XdpDesc>() == 12);
};

/// Argument to the `UMEM_REG` configuration option.
#[repr(C)]
#[derive(Default, Debug, Copy, Clone)]
pub struct UmemReg {
    pub addr: u64,
    pub len: u64,
    pub frame_size: u32,
    pub headroom: u32,
}

/// Socket-address structure for `bind`, binary-compatible and packed.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone)]
pub struct SockAddrXdp {
    pub family: u16,
    pub flags: u16,
    pub ifindex: u32,
    pub queue_id: u32,
    pub shared_umem_handle: u32,
}

impl SockAddrXdp {
    /// `flags` bit requesting that `shared_umem_handle` identify the umem owner.
    pub const SHARED_UMEM: u16 = 0x1;
}

impl Default for SockAddrXdp {
    fn default() -> Self {
        SockAddrXdp {
            family: crate::xsk::family::AF_XDP,
            flags: 0,
            ifindex: 0,
            queue_id: 0,
            shared_umem_handle: 0,
        }
    }
}

/// `STATISTICS` getsockopt result: the three counters spec.md requires.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct XdpStatistics {
    pub rx_dropped: u64,
    pub rx_invalid_descs: u64,
    pub tx_invalid_descs: u64,
}

/// Extended statistics snapshot, as exposed by newer kernels. Carried for
/// completeness (see SPEC_FULL.md, item C.4); not required by spec.md.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
#[non_exhaustive]
pub struct XdpStatisticsV2 {
    pub rx_dropped: u64,
    pub rx_invalid_descs: u64,
    pub tx_invalid_descs: u64,
    pub rx_ring_full: u64,
    pub rx_fill_ring_empty_descs: u64,
    pub tx_ring_empty_descs: u64,
}

/// Page offsets at which the four rings of a bound socket are mappable.
pub mod mmap_offsets {
    pub const RX_RING: u64 = 0;
    pub const TX_RING: u64 = 0x8000_0000;
    pub const FILL_RING: u64 = 0x1_0000_0000;
    pub const COMPLETION_RING: u64 = 0x1_8000_0000;
}
