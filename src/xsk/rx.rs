//! The RX data-path engine (spec §4.4).
//!
//! Algorithm, matched to spec.md exactly: validate the frame fits, peek the
//! fill ring for a free frame, copy the hook's payload into that frame past
//! its headroom, produce one rx descriptor, discard the fill entry only on
//! success. A dropped frame (no free fill entry, or payload too large for a
//! frame) increments `rx_dropped` and is never retried.

use std::sync::Arc;

use crate::xdp::XdpDesc;
use crate::xsk::device::Hook;
use crate::xsk::ring::{RingCons, RingProd};
use crate::xsk::{BufIdx, IfCtx, Stats, Umem};

/// An upper bound on frames drained per [`RxEngine::service`] call, so a
/// hook with an unbounded backlog cannot make one call run forever. Chosen
/// generously relative to typical ring sizes; callers wanting more just
/// call `service` again.
const RX_SERVICE_LIMIT: u32 = 1 << 16;

pub struct RxEngine {
    ctx: IfCtx,
    fill: RingCons<BufIdx>,
    rx: RingProd<XdpDesc>,
    hook: Arc<dyn Hook>,
    stats: Arc<Stats>,
}

impl RxEngine {
    pub fn new(ctx: IfCtx, fill: RingCons<BufIdx>, rx: RingProd<XdpDesc>, hook: Arc<dyn Hook>, stats: Arc<Stats>) -> Self {
        RxEngine { ctx, fill, rx, hook, stats }
    }

    /// Drain as many frames as the hook currently has queued, bounded by rx
    /// ring space and fill ring availability. Returns the number of rx
    /// descriptors produced.
    pub fn service(&mut self, umem: &Umem) -> u32 {
        let props = umem.props();
        let mut produced = 0;
        // Set when this call finds hook traffic it cannot place because the
        // fill ring is starved of donated frames: the kernel-side of the
        // fill ring is then idle pending a donation, and needs an explicit
        // wake (spec.md SPEC_FULL.md item C.1) rather than a level-triggered
        // poll to be told so.
        let mut fill_starved = false;

        for _ in 0..RX_SERVICE_LIMIT {
            if self.rx.count_free() == 0 {
                // The hook has a buffer queued and this counts as one
                // failed `rx` call (spec §4.4 step 4, §7): the caller
                // treats it as a drop, not merely a full-ring event.
                self.stats.rx_ring_full.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                self.stats.rx_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                break;
            }
            let Some(buf) = self.hook.poll(self.ctx.ifindex, self.ctx.queue_id) else {
                break;
            };

            let capacity = u64::from(props.frame_size) - u64::from(props.headroom);
            if buf.len() as u64 > capacity {
                self.stats.rx_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                continue;
            }

            if self.fill.peek(1) == 0 {
                self.stats
                    .rx_fill_ring_empty_descs
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                self.stats.rx_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                fill_starved = true;
                continue;
            }
            let idx = self.fill.read(0);
            self.fill.release(1);

            let Ok(payload) = umem.frame_payload(idx) else {
                // The fill ring handed us a frame index the umem itself
                // rejects; this cannot happen for a umem/ring pair created
                // together, so treat it as a dropped frame rather than a
                // panic.
                self.stats.rx_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                continue;
            };
            payload[..buf.len()].copy_from_slice(&buf.data);

            let reserved = self.rx.reserve(1);
            debug_assert_eq!(reserved, 1, "rx ring space was checked above");
            self.rx.write(
                0,
                XdpDesc {
                    index: idx.0,
                    length: buf.len() as u32,
                    offset: props.headroom,
                },
            );
            self.rx.submit();
            produced += 1;
        }

        self.fill.ring().set_needs_wakeup(fill_starved);
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsk::ring::Ring;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct QueueHook(Mutex<VecDeque<Vec<u8>>>);
    impl Hook for QueueHook {
        fn poll(&self, _ifindex: u32, _queue_id: u32) -> Option<crate::xsk::HookBuffer> {
            self.0.lock().unwrap().pop_front().map(crate::xsk::HookBuffer::new)
        }
    }

    #[test]
    fn drops_when_no_fill_buffer_available() {
        let umem = Umem::new(crate::xsk::UmemConfig {
            frame_size: 64,
            frame_headroom: 0,
            frame_count: 4,
        })
        .unwrap();
        let fill_ring = Ring::new(4);
        let rx_ring = Ring::new(4);
        let fill = RingCons::new(fill_ring);
        let rx_prod = RingProd::new(rx_ring.clone());

        let hook = Arc::new(QueueHook(Mutex::new(VecDeque::from([vec![1, 2, 3]]))));
        let stats = Arc::new(Stats::default());
        let mut engine = RxEngine::new(IfCtx::new(1, 0), fill, rx_prod, hook, stats.clone());

        let produced = engine.service(&umem);
        assert_eq!(produced, 0);
        assert_eq!(stats.rx_dropped.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn delivers_when_fill_buffer_available() {
        let umem = Umem::new(crate::xsk::UmemConfig {
            frame_size: 64,
            frame_headroom: 16,
            frame_count: 4,
        })
        .unwrap();
        let fill_ring = Ring::new(4);
        let rx_ring = Ring::new(4);
        let mut fill_prod = RingProd::new(fill_ring.clone());
        let fill_cons = RingCons::new(fill_ring);
        let rx_prod = RingProd::new(rx_ring.clone());
        let mut rx_cons = RingCons::new(rx_ring);

        assert_eq!(fill_prod.reserve(1), 1);
        fill_prod.write(0, BufIdx(2));
        fill_prod.submit();

        let hook = Arc::new(QueueHook(Mutex::new(VecDeque::from([vec![9, 9, 9]]))));
        let stats = Arc::new(Stats::default());
        let mut engine = RxEngine::new(IfCtx::new(1, 0), fill_cons, rx_prod, hook, stats.clone());

        let produced = engine.service(&umem);
        assert_eq!(produced, 1);
        assert_eq!(rx_cons.peek(1), 1);
        let desc = rx_cons.read(0);
        assert_eq!(desc.index, 2);
        assert_eq!(desc.length, 3);
        assert_eq!(desc.offset, 16);
    }
}
