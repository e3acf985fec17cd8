//! The TX data-path engine (spec §4.5).
//!
//! Non-blocking only: a caller finding the engine already busy gets
//! [`XskError::Again`] back rather than waiting. Each service call drains up
//! to [`TX_BATCH`] descriptors: peek one, reserve its eventual completion
//! slot *before* attempting transmission (so a completion is never promised
//! without a reservation backing it), check it against the device's current
//! MTU, hand it to the device, and discard the tx descriptor only once its
//! completion has been queued. The completion reservation is published by
//! a small RAII guard so that an early return or unwind inside the loop
//! body still returns the frame to its owner — spec.md is explicit that
//! this path "must never fail"; if it somehow did, that is a programming
//! error in this crate, not a recoverable runtime condition, so it is fatal.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, TryLockError};

use crate::xdp::XdpDesc;
use crate::xsk::device::Device;
use crate::xsk::ring::{RingCons, RingProd};
use crate::xsk::{BufIdx, IfCtx, Stats, Umem};
use crate::XskError;

/// Maximum descriptors drained per [`TxEngine::service`] call (spec §4.5).
pub const TX_BATCH: u32 = 16;

struct TxState {
    tx: RingCons<XdpDesc>,
    comp: RingProd<BufIdx>,
}

pub struct TxEngine {
    ctx: IfCtx,
    state: Mutex<TxState>,
    device: Arc<dyn Device>,
    stats: Arc<Stats>,
}

struct CompletionGuard<'a> {
    comp: &'a mut RingProd<BufIdx>,
    idx: Option<BufIdx>,
}

impl CompletionGuard<'_> {
    /// Abandon this reservation without publishing it: the caller is
    /// responsible for giving the underlying slot back via
    /// `RingProd::cancel` once this guard is dropped (spec §4.5's msgsize
    /// path, E4: "completion ring unchanged").
    fn disarm(&mut self) {
        self.idx = None;
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if let Some(idx) = self.idx.take() {
            self.comp.write(0, idx);
            let published = self.comp.submit();
            if published != 1 {
                crate::fatal("tx completion guard failed to publish a reserved slot");
            }
        }
    }
}

impl TxEngine {
    pub fn new(ctx: IfCtx, tx: RingCons<XdpDesc>, comp: RingProd<BufIdx>, device: Arc<dyn Device>, stats: Arc<Stats>) -> Self {
        TxEngine {
            ctx,
            state: Mutex::new(TxState { tx, comp }),
            device,
            stats,
        }
    }

    pub fn ctx(&self) -> IfCtx {
        self.ctx
    }

    /// Drain up to [`TX_BATCH`] descriptors. Returns the number of frames
    /// submitted to the device (frames completed due to an MTU rejection
    /// are not counted as submitted). Fails with [`XskError::Again`] if
    /// another call is already in progress on this socket.
    pub fn service(&self, umem: &Umem) -> Result<u32, XskError> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(XskError::Again),
            Err(TryLockError::Poisoned(_)) => crate::fatal("tx engine mutex poisoned"),
        };

        if !self.device.is_up() {
            return Err(XskError::NetDown);
        }

        let props = umem.props();
        let invalid_before = state.tx.ring().invalid_count();
        let mut submitted = 0;

        for _ in 0..TX_BATCH {
            let Some(desc) = state.tx.peek_valid(&props) else {
                break;
            };

            if state.comp.count_free() == 0 {
                state.tx.cancel(1);
                self.stats.tx_ring_empty_descs.fetch_add(1, Ordering::Relaxed);
                break;
            }
            state.comp.reserve(1);
            let mut guard = CompletionGuard {
                comp: &mut state.comp,
                idx: Some(BufIdx(desc.index)),
            };

            if desc.length > self.device.mtu() {
                log::debug!("tx frame {} exceeds device mtu, rejecting sendmsg", desc.index);
                guard.disarm();
                drop(guard);
                // Neither ring changes (spec §4.5 step 3, E4): the
                // reservation is given back unpublished and the
                // descriptor stays peeked-but-unreleased on the tx ring.
                state.comp.cancel(1);
                state.tx.cancel(1);
                return Err(XskError::MsgSize);
            }

            let payload = match umem.frame(BufIdx(desc.index)) {
                Ok(frame) => {
                    let region = unsafe { &*frame.addr.as_ptr() };
                    let start = desc.offset as usize;
                    &region[start..start + desc.length as usize]
                }
                Err(_) => {
                    drop(guard);
                    state.tx.release(1);
                    continue;
                }
            };

            match self.device.transmit(payload) {
                Ok(()) => {
                    drop(guard);
                    state.tx.release(1);
                    submitted += 1;
                }
                Err(XskError::Again) => {
                    // Leave both the tx descriptor and the completion
                    // reservation for the next call: nothing happened yet.
                    std::mem::forget(guard);
                    state.comp.cancel(1);
                    state.tx.cancel(1);
                    break;
                }
                Err(_other) => {
                    // Permanent failure for this frame: return ownership
                    // via completion, but do not count it as transmitted.
                    drop(guard);
                    state.tx.release(1);
                }
            }
        }

        let invalid_now = state.tx.ring().invalid_count() - invalid_before;
        if invalid_now > 0 {
            self.stats.tx_invalid_descs.fetch_add(invalid_now, Ordering::Relaxed);
        }

        // Drained: nothing left for the tx ring's consumer side to chew on
        // until a producer submits more (spec.md SPEC_FULL.md item C.1).
        let tx_idle = state.tx.count_available() == 0;
        state.tx.ring().set_needs_wakeup(tx_idle);

        Ok(submitted)
    }
}
