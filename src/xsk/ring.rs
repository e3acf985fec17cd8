//! The generic single-producer/single-consumer ring (spec §4.1, §6, §8
//! invariants 1/3/9/10).
//!
//! Grounded on the teacher's `xsk/ring.rs` `XskRing`/`XskRingProd`/
//! `XskRingCons` split, generalized from a `mmap`-backed raw byte region to
//! an in-process `Box<[UnsafeCell<T>]>` since this crate has no real kernel
//! memory to map: there is no fd, no `mmap`, only a plain allocation shared
//! through an `Arc`. The producer/consumer counter discipline — free-running
//! `u32`s, a cached copy of the peer's counter refreshed only when the
//! locally cached value looks insufficient, `Acquire` load / `Release`
//! store pairing at the handoff — is unchanged.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::xsk::FrameProps;

/// A slot type that can be validated against the umem it is used with.
/// Rx/Tx descriptors validate their `index`/`offset`/`length` triple
/// (spec §4.1 "descriptor bounds validation"); fill/completion entries
/// validate only the frame index.
pub trait Slot: Copy + Default {
    fn validate(&self, props: &FrameProps) -> bool;
}

impl Slot for crate::xsk::BufIdx {
    fn validate(&self, props: &FrameProps) -> bool {
        self.0 < props.num_frames
    }
}

impl Slot for crate::xdp::XdpDesc {
    fn validate(&self, props: &FrameProps) -> bool {
        if self.index >= props.num_frames {
            return false;
        }
        let payload_end = self.offset as u64 + self.length as u64;
        payload_end <= props.frame_size as u64
    }
}

/// The shared ring buffer: one allocation, two cache-line separated
/// counters (spec §6), reachable from both a [`RingProd`] and a [`RingCons`]
/// handle via `Arc`.
pub struct Ring<T> {
    mask: u32,
    slots: Box<[UnsafeCell<T>]>,
    producer: CachePadded<AtomicU32>,
    consumer: CachePadded<AtomicU32>,
    nb_invalid: AtomicU64,
    need_wakeup: AtomicBool,
}

// Slots are only ever accessed through the exclusive window a reservation
// or a peek currently owns; the SPSC discipline below is what keeps that
// window exclusive between the one producer and the one consumer.
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T: Slot> Ring<T> {
    /// Build a new ring. `capacity` must be a power of two (spec §4.1).
    pub fn new(capacity: u32) -> Arc<Self> {
        assert!(capacity.is_power_of_two(), "ring capacity must be a power of two");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Arc::new(Ring {
            mask: capacity - 1,
            slots,
            producer: CachePadded::new(AtomicU32::new(0)),
            consumer: CachePadded::new(AtomicU32::new(0)),
            nb_invalid: AtomicU64::new(0),
            need_wakeup: AtomicBool::new(false),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    /// Nominal backing size in bytes: the two free-running counters (spec
    /// §6's header) plus the slot array. Used by [`crate::xsk::socket::Socket::mmap`]
    /// to reject a mapping request larger than the ring's actual allocation.
    pub fn byte_len(&self) -> usize {
        2 * std::mem::size_of::<u32>() + self.capacity() as usize * std::mem::size_of::<T>()
    }

    pub fn invalid_count(&self) -> u64 {
        self.nb_invalid.load(Ordering::Relaxed)
    }

    pub fn needs_wakeup(&self) -> bool {
        self.need_wakeup.load(Ordering::Relaxed)
    }

    pub fn set_needs_wakeup(&self, value: bool) {
        self.need_wakeup.store(value, Ordering::Relaxed);
    }

    /// SAFETY: caller must hold exclusive logical ownership of `index`
    /// (inside an outstanding reservation or peek window).
    unsafe fn slot(&self, index: u32) -> *mut T {
        self.slots[(index & self.mask) as usize].get()
    }
}

/// Producer-side handle: the only thing allowed to advance `producer`.
pub struct RingProd<T: Slot> {
    ring: Arc<Ring<T>>,
    local_producer: u32,
    cached_consumer: u32,
    reserved: u32,
}

impl<T: Slot> RingProd<T> {
    pub fn new(ring: Arc<Ring<T>>) -> Self {
        let local_producer = ring.producer.load(Ordering::Relaxed);
        let cached_consumer = ring.consumer.load(Ordering::Acquire);
        RingProd {
            ring,
            local_producer,
            cached_consumer,
            reserved: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    pub fn ring(&self) -> &Arc<Ring<T>> {
        &self.ring
    }

    /// Invariant 1 (spec §8): `0 <= producer - consumer <= capacity`.
    pub fn count_free(&mut self) -> u32 {
        let outstanding = self.local_producer.wrapping_add(self.reserved).wrapping_sub(self.cached_consumer);
        let free = self.ring.capacity().wrapping_sub(outstanding);
        // `cached_consumer` only ever lags the real consumer counter, never
        // leads it (we only ever refresh it from the ring, never invent a
        // value), so the free count computed from it only ever understates
        // the true free count. Refreshing once it reads exactly zero is
        // therefore enough; there is no wrapped-negative case to guard.
        if free == 0 {
            self.cached_consumer = self.ring.consumer.load(Ordering::Acquire);
        }
        let outstanding = self.local_producer.wrapping_add(self.reserved).wrapping_sub(self.cached_consumer);
        self.ring.capacity().wrapping_sub(outstanding)
    }

    /// Reserve up to `n` slots. Returns the number actually reserved, which
    /// may be less than `n` (spec §4.1: "never blocks").
    pub fn reserve(&mut self, n: u32) -> u32 {
        let free = self.count_free();
        let got = n.min(free);
        self.reserved += got;
        got
    }

    /// Give back `n` previously reserved (but not yet submitted) slots.
    pub fn cancel(&mut self, n: u32) {
        self.reserved = self.reserved.saturating_sub(n);
    }

    /// Write `value` into the `j`th slot of the current reservation,
    /// `j < reserved`.
    pub fn write(&mut self, j: u32, value: T) {
        debug_assert!(j < self.reserved);
        let index = self.local_producer.wrapping_add(j);
        unsafe { *self.ring.slot(index) = value };
    }

    /// Publish every reserved slot to the consumer (`Release` store: spec
    /// §4.1's producer -> consumer handoff).
    pub fn submit(&mut self) -> u32 {
        self.submit_n(self.reserved)
    }

    /// Publish only the first `n` reserved slots (`n <= reserved`);
    /// whatever remains reserved beyond that is given back, unpublished.
    /// Used by the ergonomic writers in [`crate::xsk::user`] when a caller
    /// reserved more capacity than it ended up writing.
    pub fn submit_n(&mut self, n: u32) -> u32 {
        // Clamped rather than asserted: idempotent under a `commit()` that
        // is itself consumed by `Drop` afterwards (see `xsk::user`).
        let n = n.min(self.reserved);
        self.local_producer = self.local_producer.wrapping_add(n);
        self.ring.producer.store(self.local_producer, Ordering::Release);
        self.reserved = 0;
        n
    }
}

/// Consumer-side handle: the only thing allowed to advance `consumer`.
pub struct RingCons<T: Slot> {
    ring: Arc<Ring<T>>,
    local_consumer: u32,
    cached_producer: u32,
    peeked: u32,
}

impl<T: Slot> RingCons<T> {
    pub fn new(ring: Arc<Ring<T>>) -> Self {
        let local_consumer = ring.consumer.load(Ordering::Relaxed);
        let cached_producer = ring.producer.load(Ordering::Acquire);
        RingCons {
            ring,
            local_consumer,
            cached_producer,
            peeked: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    pub fn ring(&self) -> &Arc<Ring<T>> {
        &self.ring
    }

    pub fn count_available(&mut self) -> u32 {
        let consumed_so_far = self.local_consumer.wrapping_add(self.peeked);
        let mut available = self.cached_producer.wrapping_sub(consumed_so_far);
        if (available as i32) <= 0 {
            self.cached_producer = self.ring.producer.load(Ordering::Acquire);
            available = self.cached_producer.wrapping_sub(consumed_so_far);
        }
        available
    }

    /// Peek up to `n` slots without validation. Returns the number actually
    /// available, which may be less than `n`.
    pub fn peek(&mut self, n: u32) -> u32 {
        let available = self.count_available();
        let got = n.min(available);
        self.peeked += got;
        got
    }

    /// Peek a single slot, auto-discarding (and counting as invalid,
    /// spec §4.1/§6 `rx_invalid_descs`/`tx_invalid_descs`) any entries that
    /// fail [`Slot::validate`] against `props`. Returns the first valid
    /// entry, or `None` if the ring is drained of valid entries for now.
    ///
    /// This is how rx/tx descriptor rings implement spec §4.4/§4.5's
    /// "an invalid descriptor is silently skipped (treated as consumed)".
    pub fn peek_valid(&mut self, props: &FrameProps) -> Option<T> {
        loop {
            if self.peek(1) == 0 {
                return None;
            }
            let index = self.local_consumer.wrapping_add(self.peeked - 1);
            let value = unsafe { *self.ring.slot(index) };
            if value.validate(props) {
                return Some(value);
            }
            // Invalid: immediately release as consumed, never retried.
            self.ring.nb_invalid.fetch_add(1, Ordering::Relaxed);
            self.release(1);
        }
    }

    /// Read the `j`th peeked slot, `j < peeked`.
    pub fn read(&self, j: u32) -> T {
        debug_assert!(j < self.peeked);
        let index = self.local_consumer.wrapping_add(j);
        unsafe { *self.ring.slot(index) }
    }

    /// Give back `n` previously peeked (but not yet released) slots.
    pub fn cancel(&mut self, n: u32) {
        self.peeked = self.peeked.saturating_sub(n);
    }

    /// Release every peeked slot back to the producer (`Release` store:
    /// spec §4.1's consumer -> producer handoff).
    pub fn release(&mut self, n: u32) -> u32 {
        let n = n.min(self.peeked);
        self.local_consumer = self.local_consumer.wrapping_add(n);
        self.ring.consumer.store(self.local_consumer, Ordering::Release);
        self.peeked -= n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_then_drain_round_trip() {
        let ring: Arc<Ring<crate::xsk::BufIdx>> = Ring::new(8);
        let mut prod = RingProd::new(ring.clone());
        let mut cons = RingCons::new(ring);

        let got = prod.reserve(4);
        assert_eq!(got, 4);
        for j in 0..4 {
            prod.write(j, crate::xsk::BufIdx(j));
        }
        assert_eq!(prod.submit(), 4);

        assert_eq!(cons.peek(8), 4);
        for j in 0..4 {
            assert_eq!(cons.read(j), crate::xsk::BufIdx(j));
        }
        assert_eq!(cons.release(4), 4);

        assert_eq!(prod.count_free(), 8);
    }

    #[test]
    fn reserve_never_exceeds_capacity() {
        let ring: Arc<Ring<crate::xsk::BufIdx>> = Ring::new(4);
        let mut prod = RingProd::new(ring);
        assert_eq!(prod.reserve(100), 4);
        assert_eq!(prod.reserve(1), 0);
    }
}
