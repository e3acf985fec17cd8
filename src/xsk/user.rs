//! Ergonomic consumer-facing helpers (SPEC_FULL.md item C.2), generalized
//! from the teacher's `xsk/user.rs` `WriteFill`/`ReadComplete`/`WriteTx`/
//! `ReadRx` proxy types: reserve/peek once, then `insert`/`read` repeatedly,
//! `commit`/`release` once. Dropping a proxy without committing/releasing
//! rolls the reservation back instead of leaking ring capacity.
//!
//! Each proxy is generic over anything that derefs mutably to the ring
//! handle it wraps, so a [`Socket`](crate::Socket) can hand out a
//! `MutexGuard` directly (holding the lock for exactly the proxy's
//! lifetime) without any unsafe lifetime extension.

use std::ops::DerefMut;

use crate::xdp::XdpDesc;
use crate::xsk::ring::{RingCons, RingProd};
use crate::xsk::BufIdx;

/// Reserves fill-ring slots and lets the caller hand back frame indices for
/// the RX engine to use.
pub struct WriteFill<G: DerefMut<Target = RingProd<BufIdx>>> {
    ring: G,
    reserved: u32,
    written: u32,
}

impl<G: DerefMut<Target = RingProd<BufIdx>>> WriteFill<G> {
    pub fn new(mut ring: G, n: u32) -> Self {
        let reserved = ring.reserve(n);
        WriteFill { ring, reserved, written: 0 }
    }

    pub fn capacity(&self) -> u32 {
        self.reserved - self.written
    }

    /// Hand back as many frame indices from `it` as there is reserved room
    /// for. Returns the number inserted.
    pub fn insert(&mut self, it: impl Iterator<Item = BufIdx>) -> u32 {
        let mut n = 0;
        for idx in it.take((self.reserved - self.written) as usize) {
            self.ring.write(self.written, idx);
            self.written += 1;
            n += 1;
        }
        n
    }

    /// Publish everything written so far.
    pub fn commit(self) -> u32 {
        let mut this = self;
        this.ring.submit_n(this.written)
    }
}

impl<G: DerefMut<Target = RingProd<BufIdx>>> Drop for WriteFill<G> {
    fn drop(&mut self) {
        self.ring.submit_n(self.written);
    }
}

/// Reads and releases completed frame indices from the completion ring.
pub struct ReadComplete<G: DerefMut<Target = RingCons<BufIdx>>> {
    ring: G,
    peeked: u32,
    read: u32,
}

impl<G: DerefMut<Target = RingCons<BufIdx>>> ReadComplete<G> {
    pub fn new(mut ring: G, n: u32) -> Self {
        let peeked = ring.peek(n);
        ReadComplete { ring, peeked, read: 0 }
    }

    pub fn capacity(&self) -> u32 {
        self.peeked - self.read
    }

    pub fn read(&mut self) -> Option<BufIdx> {
        if self.read == self.peeked {
            return None;
        }
        let idx = self.ring.read(self.read);
        self.read += 1;
        Some(idx)
    }

    pub fn release(self) -> u32 {
        let mut this = self;
        let n = this.ring.release(this.read);
        this.read = 0;
        this.peeked = 0;
        n
    }
}

impl<G: DerefMut<Target = RingCons<BufIdx>>> Drop for ReadComplete<G> {
    fn drop(&mut self) {
        self.ring.release(self.read);
        self.ring.cancel(self.peeked - self.read);
    }
}

/// Reserves tx-ring slots and lets the caller hand over descriptors for the
/// TX engine to transmit.
pub struct WriteTx<G: DerefMut<Target = RingProd<XdpDesc>>> {
    ring: G,
    reserved: u32,
    written: u32,
}

impl<G: DerefMut<Target = RingProd<XdpDesc>>> WriteTx<G> {
    pub fn new(mut ring: G, n: u32) -> Self {
        let reserved = ring.reserve(n);
        WriteTx { ring, reserved, written: 0 }
    }

    pub fn capacity(&self) -> u32 {
        self.reserved - self.written
    }

    pub fn insert(&mut self, it: impl Iterator<Item = XdpDesc>) -> u32 {
        let mut n = 0;
        for desc in it.take((self.reserved - self.written) as usize) {
            self.ring.write(self.written, desc);
            self.written += 1;
            n += 1;
        }
        n
    }

    pub fn commit(self) -> u32 {
        let mut this = self;
        this.ring.submit_n(this.written)
    }
}

impl<G: DerefMut<Target = RingProd<XdpDesc>>> Drop for WriteTx<G> {
    fn drop(&mut self) {
        self.ring.submit_n(self.written);
    }
}

/// Reads and releases rx descriptors.
pub struct ReadRx<G: DerefMut<Target = RingCons<XdpDesc>>> {
    ring: G,
    peeked: u32,
    read: u32,
}

impl<G: DerefMut<Target = RingCons<XdpDesc>>> ReadRx<G> {
    pub fn new(mut ring: G, n: u32) -> Self {
        let peeked = ring.peek(n);
        ReadRx { ring, peeked, read: 0 }
    }

    pub fn capacity(&self) -> u32 {
        self.peeked - self.read
    }

    pub fn read(&mut self) -> Option<XdpDesc> {
        if self.read == self.peeked {
            return None;
        }
        let desc = self.ring.read(self.read);
        self.read += 1;
        Some(desc)
    }

    pub fn release(self) -> u32 {
        let mut this = self;
        let n = this.ring.release(this.read);
        this.read = 0;
        this.peeked = 0;
        n
    }
}

impl<G: DerefMut<Target = RingCons<XdpDesc>>> Drop for ReadRx<G> {
    fn drop(&mut self) {
        self.ring.release(self.read);
        self.ring.cancel(self.peeked - self.read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsk::ring::Ring;

    #[test]
    fn write_fill_drop_without_commit_rolls_back_unwritten() {
        let ring = Ring::new(8);
        let mut prod = RingProd::new(ring.clone());
        {
            let mut w = WriteFill::new(&mut prod, 4);
            w.insert(std::iter::once(BufIdx(1)));
            // dropped without calling commit(): only the 1 written entry
            // should be published.
        }
        let mut cons = RingCons::new(ring);
        assert_eq!(cons.peek(8), 1);
        assert_eq!(cons.read(0), BufIdx(1));
    }
}
