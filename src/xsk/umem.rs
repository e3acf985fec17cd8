//! The umem: one registered region of memory, carved into equally sized
//! frames (spec §4.2).
//!
//! Grounded on the teacher's `XskUmem`/`XskUmemConfig` (`xsk/umem.rs`): real
//! anonymous `mmap` + `mlock` backing, frame geometry validated up front,
//! the device-exclusion `ControlSet` kept for fill/completion ownership.
//! Where the teacher registers this memory with the kernel via a
//! `setsockopt(UMEM_REG)`, this crate simply records the geometry locally —
//! there is no kernel here to hand the pointer to.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::xsk::{BufIdx, DeviceControl, FrameProps, IfCtx};
use crate::XskError;

/// Umem sizing, the argument to [`Umem::new`]; mirrors [`crate::xdp::UmemReg`]
/// (spec §4.2, §6).
#[derive(Debug, Clone, Copy)]
pub struct UmemConfig {
    pub frame_size: u32,
    pub frame_headroom: u32,
    pub frame_count: u32,
}

impl Default for UmemConfig {
    fn default() -> Self {
        UmemConfig {
            frame_size: 4096,
            frame_headroom: 0,
            frame_count: 1 << 10,
        }
    }
}

/// A single frame's payload window, as handed back by [`Umem::frame`].
pub struct Frame {
    pub offset: u64,
    pub addr: NonNull<[u8]>,
}

struct UmemArea {
    base: NonNull<u8>,
    len: usize,
}

// Safety: the area is only ever accessed through frame windows whose
// exclusive use is governed by the ring ownership discipline above it.
unsafe impl Send for UmemArea {}
unsafe impl Sync for UmemArea {}

impl UmemArea {
    fn alloc(len: usize) -> Result<Self, XskError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(XskError::NoMem);
        }
        // Best-effort: a umem that gets paged out mid-DMA would be a real
        // correctness bug on actual hardware; we have no hardware, but we
        // keep the call so the memory-management shape matches the
        // teacher's (`xsk/umem.rs` registers the region for exactly this
        // reason). Failure here is not fatal to the simulation.
        unsafe { libc::mlock(ptr, len) };
        Ok(UmemArea {
            base: NonNull::new(ptr as *mut u8).expect("mmap returned non-null on success"),
            len,
        })
    }
}

impl Drop for UmemArea {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.base.as_ptr() as *mut _, self.len) };
    }
}

struct UmemInner {
    config: UmemConfig,
    area: UmemArea,
    control: DeviceControl,
}

/// A registered umem. Cheap to clone: clones share the same backing
/// allocation and device-exclusion set, exactly as binding multiple
/// sockets to one umem (spec §4.3 "shared umem") requires.
#[derive(Clone)]
pub struct Umem {
    inner: Arc<UmemInner>,
}

impl Umem {
    /// Register a new umem. Validates frame geometry (spec §4.2: frame size
    /// and headroom must leave room for a payload, frame count must be
    /// nonzero) before allocating.
    pub fn new(config: UmemConfig) -> Result<Self, XskError> {
        if config.frame_size == 0 || config.frame_count == 0 {
            return Err(XskError::Invalid);
        }
        if !config.frame_size.is_power_of_two() {
            return Err(XskError::Invalid);
        }
        if u64::from(config.frame_headroom) >= u64::from(config.frame_size) {
            return Err(XskError::Invalid);
        }
        // Implementation-chosen ceiling on frame count (spec §4.2), well
        // above any size this crate's tests or demos exercise.
        const MAX_FRAMES: u32 = 1 << 24;
        if config.frame_count > MAX_FRAMES {
            return Err(XskError::Invalid);
        }
        let len = (config.frame_size as u64)
            .checked_mul(config.frame_count as u64)
            .ok_or(XskError::Invalid)?;
        let area = UmemArea::alloc(len as usize)?;
        Ok(Umem {
            inner: Arc::new(UmemInner {
                config,
                area,
                control: DeviceControl::new(),
            }),
        })
    }

    pub fn config(&self) -> UmemConfig {
        self.inner.config
    }

    /// Whether `self` and `other` are clones of the same registered umem
    /// (same backing allocation), as opposed to two distinct umems that
    /// merely share identical geometry. Used to validate a shared-umem
    /// bind handle (spec §4.2 "Sharing").
    pub fn same_as(&self, other: &Umem) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn props(&self) -> FrameProps {
        FrameProps {
            frame_size: self.inner.config.frame_size,
            headroom: self.inner.config.frame_headroom,
            num_frames: self.inner.config.frame_count,
        }
    }

    pub(crate) fn control(&self) -> &DeviceControl {
        &self.inner.control
    }

    /// The whole backing region, for diagnostics or bulk initialization.
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.inner.area.base.as_ptr(), self.inner.area.len) }
    }

    /// Resolve a frame index to its payload window (spec §4.2 `data`).
    pub fn frame(&self, idx: BufIdx) -> Result<Frame, XskError> {
        let cfg = self.inner.config;
        if idx.0 >= cfg.frame_count {
            return Err(XskError::Invalid);
        }
        let offset = u64::from(idx.0) * u64::from(cfg.frame_size);
        let ptr = unsafe { self.inner.area.base.as_ptr().add(offset as usize) };
        let slice = std::ptr::slice_from_raw_parts_mut(ptr, cfg.frame_size as usize);
        Ok(Frame {
            offset,
            addr: NonNull::new(slice).expect("frame pointer within mapped region is non-null"),
        })
    }

    /// The frame's payload window, past its configured headroom (spec §4.2
    /// `data_with_headroom`).
    pub fn frame_payload(&self, idx: BufIdx) -> Result<&mut [u8], XskError> {
        let frame = self.frame(idx)?;
        let headroom = self.inner.config.frame_headroom as usize;
        let slice = unsafe { &mut *frame.addr.as_ptr() };
        Ok(&mut slice[headroom..])
    }

    /// Register ownership of a `(device, queue)` pair's fill/completion
    /// side, refusing a second concurrent owner (spec §4.3's "claims" a
    /// queue, grounded on the teacher's `ControlSet`/`fq_cq`).
    pub(crate) fn claim(&self, ctx: IfCtx) -> Result<(), XskError> {
        if self.inner.control.insert(ctx) {
            Ok(())
        } else {
            Err(XskError::Busy)
        }
    }

    pub(crate) fn release_claim(&self, ctx: &IfCtx) {
        self.inner.control.remove(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_frame_size() {
        let cfg = UmemConfig {
            frame_size: 100,
            frame_headroom: 0,
            frame_count: 1,
        };
        assert_eq!(Umem::new(cfg).unwrap_err(), XskError::Invalid);
    }

    #[test]
    fn rejects_headroom_at_or_above_frame_size() {
        let cfg = UmemConfig {
            frame_size: 64,
            frame_headroom: 64,
            frame_count: 1,
        };
        assert_eq!(Umem::new(cfg).unwrap_err(), XskError::Invalid);
    }

    #[test]
    fn frame_out_of_range_is_invalid() {
        let umem = Umem::new(UmemConfig {
            frame_size: 2048,
            frame_headroom: 0,
            frame_count: 4,
        })
        .unwrap();
        assert_eq!(umem.frame(BufIdx(4)).unwrap_err(), XskError::Invalid);
        assert!(umem.frame(BufIdx(3)).is_ok());
    }
}
