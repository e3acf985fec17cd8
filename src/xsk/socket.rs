//! Socket lifecycle (spec §4.3): create -> configure -> bind -> (rebind)* ->
//! release, with the ordering preconditions spec.md places on each
//! transition. Grounded on the teacher's `XskSocket`/`XskUmem::bind`
//! (`xsk/socket.rs`, `xsk/umem.rs`), generalized since this crate attaches
//! to a simulated [`super::device::Device`]/[`super::device::Hook`] pair
//! instead of a real kernel netdev.

use std::sync::{Arc, Mutex};

use crate::xsk::device::{Device, Hook};
use crate::xsk::poll::{PollFlags, WaitQueue};
use crate::xsk::ring::{Ring, RingCons, RingProd};
use crate::xsk::rx::RxEngine;
use crate::xsk::tx::TxEngine;
use crate::xsk::user::{ReadComplete, ReadRx, WriteFill, WriteTx};
use crate::xsk::{BufIdx, IfCtx, Stats, Umem};
use crate::XskError;
use crate::xdp::XdpDesc;

bitflags_like::bitflags! {
    /// Bind-time flags (spec §4.3, mirroring `SockAddrXdp::SHARED_UMEM`).
    pub struct BindFlags: u16 {
        const SHARED_UMEM = 0x1;
    }
}

mod bitflags_like {
    // A tiny hand-rolled stand-in so this crate does not pull in the
    // `bitflags` crate for a single one-bit flag set; the teacher itself
    // has no use for bitflags anywhere in its own dependency tree.
    macro_rules! bitflags {
        (
            $(#[$meta:meta])*
            pub struct $name:ident: $ty:ty {
                $(const $variant:ident = $value:expr;)*
            }
        ) => {
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $name(pub $ty);

            impl $name {
                $(pub const $variant: $name = $name($value);)*

                pub fn contains(&self, other: $name) -> bool {
                    self.0 & other.0 == other.0
                }
            }

            impl std::ops::BitOr for $name {
                type Output = $name;
                fn bitor(self, rhs: $name) -> $name {
                    $name(self.0 | rhs.0)
                }
            }
        };
    }
    pub(crate) use bitflags;
}

/// Ring sizes and bind flags for a socket, the argument to [`Socket::bind`]
/// (spec §4.3, mirroring the teacher's `XskSocketConfig`).
#[derive(Debug, Clone, Copy)]
pub struct SocketConfig {
    pub rx_size: Option<u32>,
    pub tx_size: Option<u32>,
    pub fill_size: u32,
    pub comp_size: u32,
    pub bind_flags: BindFlags,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            rx_size: Some(1 << 11),
            tx_size: Some(1 << 11),
            fill_size: 1 << 11,
            comp_size: 1 << 11,
            bind_flags: BindFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unbound,
    Bound,
    Released,
}

/// The rx-side state of a binding, present only when `SocketConfig::rx_size`
/// was `Some` at bind time (spec §4.3 bind precondition: "socket has at
/// least one of rx/tx").
struct RxSide {
    cons: Mutex<RingCons<XdpDesc>>,
    engine: Mutex<RxEngine>,
}

/// The tx-side state of a binding, present only when `SocketConfig::tx_size`
/// was `Some` at bind time.
struct TxSide {
    prod: Mutex<RingProd<XdpDesc>>,
    engine: TxEngine,
}

struct Bound {
    ctx: IfCtx,
    /// Whether this socket itself holds the umem's fill/completion
    /// exclusion claim on `ctx`, as opposed to inheriting one already held
    /// by the socket it shares a umem with (spec §4.2 "Sharing"). Only the
    /// claiming socket's `release` gives the claim back.
    claimed: bool,
    fill_prod: Mutex<RingProd<BufIdx>>,
    comp_cons: Mutex<RingCons<BufIdx>>,
    rx: Option<RxSide>,
    tx: Option<TxSide>,
    waitq: WaitQueue,
}

/// A socket: a handle to one (or, with a shared umem, one of several) rx/tx
/// and fill/completion ring set, bound to a single device queue at a time.
pub struct Socket {
    umem: Umem,
    config: SocketConfig,
    state: State,
    bound: Option<Bound>,
    stats: Arc<Stats>,
    /// Set by [`Socket::new_shared`]: the `(device, queue)` the owning
    /// socket is bound to. `bind` on this socket must target the same
    /// pair and must not re-claim the umem's fill/completion exclusion
    /// (spec §4.3 "Shared-umem").
    shared_owner_ctx: Option<IfCtx>,
}

impl Socket {
    /// Create an unbound socket against `umem` (spec §4.3: "create").
    pub fn new(umem: Umem, config: SocketConfig) -> Self {
        Socket {
            umem,
            config,
            state: State::Unbound,
            bound: None,
            stats: Arc::new(Stats::default()),
            shared_owner_ctx: None,
        }
    }

    /// Create a socket that will inherit `owner`'s umem (spec §4.2
    /// "Sharing", §4.3 "Shared-umem"). `owner` must already be bound; this
    /// socket's later `bind` call must target the identical
    /// `(device, queue)` pair or it fails with [`XskError::Invalid`].
    pub fn new_shared(owner: &Socket, config: SocketConfig) -> Result<Self, XskError> {
        let owner_bound = owner.bound.as_ref().ok_or(XskError::BadHandle)?;
        Ok(Socket {
            umem: owner.umem.clone(),
            config,
            state: State::Unbound,
            bound: None,
            stats: Arc::new(Stats::default()),
            shared_owner_ctx: Some(owner_bound.ctx),
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Attach this socket to a device queue (spec §4.3 "bind"). Claims
    /// exclusive fill/completion ownership of `(device, queue)` on the
    /// umem; a second socket attempting to bind the same pair without
    /// [`BindFlags::SHARED_UMEM`] gets [`XskError::Busy`].
    pub fn bind(&mut self, ctx: IfCtx, device: Arc<dyn Device>, hook: Arc<dyn Hook>) -> Result<(), XskError> {
        if self.state == State::Bound {
            return Err(XskError::BadHandle);
        }
        if !crate::xsk::family::supports_raw_packets(&*device) {
            return Err(XskError::NoXio);
        }
        if ctx.queue_id >= device.num_rx_queues() {
            return Err(XskError::NoXio);
        }
        if !device.is_up() {
            return Err(XskError::NetDown);
        }

        let claimed = match self.shared_owner_ctx {
            Some(owner_ctx) => {
                // Shared-umem bind: must target the identical (device,
                // queue) pair the owner is bound to; the umem's
                // fill/completion exclusion claim is already held by the
                // owner and is not re-acquired here (spec §4.2 "Sharing").
                if owner_ctx != ctx {
                    return Err(XskError::Invalid);
                }
                false
            }
            None => {
                self.umem.claim(ctx)?;
                true
            }
        };

        // Bind precondition (spec §4.3): "socket has at least one of rx/tx".
        if self.config.rx_size.is_none() && self.config.tx_size.is_none() {
            if claimed {
                self.umem.release_claim(&ctx);
            }
            return Err(XskError::Invalid);
        }
        for size in [self.config.rx_size, self.config.tx_size]
            .into_iter()
            .flatten()
            .chain([self.config.fill_size, self.config.comp_size])
        {
            if !size.is_power_of_two() {
                if claimed {
                    self.umem.release_claim(&ctx);
                }
                return Err(XskError::Invalid);
            }
        }

        let fill_ring = Ring::<BufIdx>::new(self.config.fill_size);
        let comp_ring = Ring::<BufIdx>::new(self.config.comp_size);
        let fill_prod = RingProd::new(fill_ring.clone());
        let fill_cons = RingCons::new(fill_ring);
        let comp_prod = RingProd::new(comp_ring.clone());
        let comp_cons = RingCons::new(comp_ring);

        // An own-umem bind always creates both control rings (spec §4.2
        // precondition), but only the side(s) actually configured get a
        // consumer/producer plus a data-path engine; the unused control
        // ring handle (fill when there is no rx, completion when there is
        // no tx) is simply dropped, matching "socket has at least one of
        // rx/tx" rather than requiring both.
        let rx = match self.config.rx_size {
            Some(rx_size) => {
                let rx_ring = Ring::<XdpDesc>::new(rx_size);
                let rx_prod = RingProd::new(rx_ring.clone());
                let rx_cons = RingCons::new(rx_ring);
                let engine = RxEngine::new(ctx, fill_cons, rx_prod, hook, self.stats.clone());
                Some(RxSide {
                    cons: Mutex::new(rx_cons),
                    engine: Mutex::new(engine),
                })
            }
            None => {
                drop(fill_cons);
                None
            }
        };

        let tx = match self.config.tx_size {
            Some(tx_size) => {
                let tx_ring = Ring::<XdpDesc>::new(tx_size);
                let tx_prod = RingProd::new(tx_ring.clone());
                let tx_cons = RingCons::new(tx_ring);
                let engine = TxEngine::new(ctx, tx_cons, comp_prod, device, self.stats.clone());
                Some(TxSide {
                    prod: Mutex::new(tx_prod),
                    engine,
                })
            }
            None => {
                drop(comp_prod);
                None
            }
        };

        self.bound = Some(Bound {
            ctx,
            claimed,
            fill_prod: Mutex::new(fill_prod),
            comp_cons: Mutex::new(comp_cons),
            rx,
            tx,
            waitq: WaitQueue::new(),
        });
        self.state = State::Bound;
        log::debug!("socket bound to ifindex={} queue_id={}", ctx.ifindex, ctx.queue_id);
        Ok(())
    }

    /// Rebind to a different device queue, per SPEC_FULL.md §D: drains the
    /// old binding's outstanding tx completions before releasing its claim
    /// and attaching the new one.
    pub fn rebind(&mut self, ctx: IfCtx, device: Arc<dyn Device>, hook: Arc<dyn Hook>) -> Result<(), XskError> {
        if self.state != State::Bound {
            return Err(XskError::BadHandle);
        }
        {
            let bound = self.bound.as_ref().expect("state Bound implies bound is Some");
            // Drain: service tx until no descriptors remain pending, i.e.
            // no reserved-but-unpublished completion work is outstanding
            // under the old binding. A tx-less binding has nothing to
            // drain.
            if let Some(tx) = bound.tx.as_ref() {
                loop {
                    let remaining = {
                        let mut tx_prod = tx.prod.lock().unwrap_or_else(|e| e.into_inner());
                        tx_prod.count_free() < tx_prod.capacity()
                    };
                    if !remaining {
                        break;
                    }
                    match tx.engine.service(&self.umem) {
                        Ok(0) => break,
                        Ok(_) => continue,
                        Err(XskError::Again) => continue,
                        Err(_) => break,
                    }
                }
            }
        }
        self.release()?;
        self.state = State::Unbound;
        self.bound = None;
        self.bind(ctx, device, hook)
    }

    /// Release the binding (spec §4.3 "release"): idempotent, safe to call
    /// on an already-released or never-bound socket.
    pub fn release(&mut self) -> Result<(), XskError> {
        if let Some(bound) = self.bound.take() {
            if bound.claimed {
                self.umem.release_claim(&bound.ctx);
            }
        }
        self.state = State::Released;
        Ok(())
    }

    fn bound(&self) -> Result<&Bound, XskError> {
        self.bound.as_ref().ok_or(XskError::BadHandle)
    }

    /// Run the RX engine once (spec §4.4). Fails with
    /// [`XskError::BadHandle`] if this socket was bound without an rx ring.
    pub fn service_rx(&self) -> Result<u32, XskError> {
        let bound = self.bound()?;
        let rx = bound.rx.as_ref().ok_or(XskError::BadHandle)?;
        let needed_before = self.rx_needs_wakeup();
        let mut engine = rx.engine.lock().unwrap_or_else(|e| e.into_inner());
        let n = engine.service(&self.umem);
        drop(engine);
        if n > 0 || self.rx_needs_wakeup() != needed_before {
            bound.waitq.notify();
        }
        Ok(n)
    }

    /// Run the TX engine once (spec §4.5). Fails with [`XskError::NoBufs`]
    /// if this socket was bound without a tx ring ("If tx ring is absent,
    /// fail nobufs").
    pub fn service_tx(&self) -> Result<u32, XskError> {
        let bound = self.bound()?;
        let tx = bound.tx.as_ref().ok_or(XskError::NoBufs)?;
        let needed_before = self.tx_needs_wakeup();
        let n = tx.engine.service(&self.umem)?;
        if n > 0 || self.tx_needs_wakeup() != needed_before {
            bound.waitq.notify();
        }
        Ok(n)
    }

    /// Whether the fill ring is currently flagged as needing an explicit
    /// wake (SPEC_FULL.md item C.1): `false` for a socket bound without an
    /// rx ring, since there is then no fill ring to starve.
    pub fn rx_needs_wakeup(&self) -> bool {
        match self.bound.as_ref() {
            Some(bound) => bound.fill_prod.lock().unwrap_or_else(|e| e.into_inner()).ring().needs_wakeup(),
            None => false,
        }
    }

    /// Whether the tx ring is currently flagged as needing an explicit wake.
    pub fn tx_needs_wakeup(&self) -> bool {
        match self.bound.as_ref() {
            Some(bound) => match bound.tx.as_ref() {
                Some(tx) => tx.prod.lock().unwrap_or_else(|e| e.into_inner()).ring().needs_wakeup(),
                None => false,
            },
            None => false,
        }
    }

    /// Explicitly kick the RX engine, the way a real socket's `wake()` would
    /// issue the syscall that lets the kernel resume filling the fill ring.
    /// Here, where there is no separate kernel thread to kick, "waking" it
    /// is servicing it directly.
    pub fn wake_rx(&self) -> Result<u32, XskError> {
        self.service_rx()
    }

    /// Explicitly kick the TX engine; see [`Socket::wake_rx`].
    pub fn wake_tx(&self) -> Result<u32, XskError> {
        self.service_tx()
    }

    pub fn fill(&self, n: u32) -> Result<WriteFill<std::sync::MutexGuard<'_, RingProd<BufIdx>>>, XskError> {
        let bound = self.bound()?;
        let guard = bound.fill_prod.lock().unwrap_or_else(|e| e.into_inner());
        Ok(WriteFill::new(guard, n))
    }

    pub fn complete(&self, n: u32) -> Result<ReadComplete<std::sync::MutexGuard<'_, RingCons<BufIdx>>>, XskError> {
        let bound = self.bound()?;
        let guard = bound.comp_cons.lock().unwrap_or_else(|e| e.into_inner());
        Ok(ReadComplete::new(guard, n))
    }

    pub fn transmit(&self, n: u32) -> Result<WriteTx<std::sync::MutexGuard<'_, RingProd<XdpDesc>>>, XskError> {
        let bound = self.bound()?;
        let tx = bound.tx.as_ref().ok_or(XskError::NoBufs)?;
        let guard = tx.prod.lock().unwrap_or_else(|e| e.into_inner());
        Ok(WriteTx::new(guard, n))
    }

    pub fn receive(&self, n: u32) -> Result<ReadRx<std::sync::MutexGuard<'_, RingCons<XdpDesc>>>, XskError> {
        let bound = self.bound()?;
        let rx = bound.rx.as_ref().ok_or(XskError::BadHandle)?;
        let guard = rx.cons.lock().unwrap_or_else(|e| e.into_inner());
        Ok(ReadRx::new(guard, n))
    }

    /// Readiness snapshot (spec §4.6), never blocks. A socket bound without
    /// an rx (resp. tx) ring is never readable (resp. writable).
    pub fn poll(&self) -> Result<PollFlags, XskError> {
        let bound = self.bound()?;
        let readable = match bound.rx.as_ref() {
            Some(rx) => rx.cons.lock().unwrap_or_else(|e| e.into_inner()).count_available() > 0,
            None => false,
        };
        let writable = match bound.tx.as_ref() {
            Some(tx) => tx.prod.lock().unwrap_or_else(|e| e.into_inner()).count_free() > 0,
            None => false,
        };
        Ok(PollFlags {
            readable,
            writable,
            rx_needs_wakeup: self.rx_needs_wakeup(),
            tx_needs_wakeup: self.tx_needs_wakeup(),
        })
    }

    /// Block until the socket becomes ready or `timeout` elapses.
    pub fn poll_wait(&self, timeout: std::time::Duration) -> Result<PollFlags, XskError> {
        let flags = self.poll()?;
        if flags.any() {
            return Ok(flags);
        }
        let bound = self.bound()?;
        bound.waitq.wait(timeout);
        self.poll()
    }

    pub fn statistics(&self) -> crate::xdp::XdpStatistics {
        self.stats.snapshot()
    }

    pub fn statistics_v2(&self) -> crate::xdp::XdpStatisticsV2 {
        self.stats.snapshot_v2()
    }

    /// Map one of the four well-known ring regions (spec §4.6, §6
    /// `mmap_offsets`): `offset` must exactly name a configured ring's page
    /// offset, and `len` must not exceed that ring's backing allocation.
    ///
    /// This crate simulates the kernel and user sides of the protocol in a
    /// single address space, so there is no second address space to
    /// actually remap memory into; what a real `mmap(2)` would hand back as
    /// a raw page range, this returns as a [`RingKind`] selector that
    /// identifies which ring the caller is now permitted to drive through
    /// [`Socket::fill`]/[`Socket::complete`]/[`Socket::transmit`]/
    /// [`Socket::receive`]. Every precondition and rejection spec §4.6
    /// describes is still enforced: an unconfigured ring's offset is
    /// rejected, and a request larger than the ring's real size is
    /// rejected.
    pub fn mmap(&self, offset: u64, len: usize) -> Result<RingKind, XskError> {
        use crate::xdp::mmap_offsets;

        let bound = self.bound()?;
        let (kind, byte_len) = match offset {
            mmap_offsets::RX_RING => {
                let rx = bound.rx.as_ref().ok_or(XskError::Invalid)?;
                let len = rx.cons.lock().unwrap_or_else(|e| e.into_inner()).ring().byte_len();
                (RingKind::Rx, len)
            }
            mmap_offsets::TX_RING => {
                let tx = bound.tx.as_ref().ok_or(XskError::Invalid)?;
                let len = tx.prod.lock().unwrap_or_else(|e| e.into_inner()).ring().byte_len();
                (RingKind::Tx, len)
            }
            mmap_offsets::FILL_RING => {
                let len = bound.fill_prod.lock().unwrap_or_else(|e| e.into_inner()).ring().byte_len();
                (RingKind::Fill, len)
            }
            mmap_offsets::COMPLETION_RING => {
                let len = bound.comp_cons.lock().unwrap_or_else(|e| e.into_inner()).ring().byte_len();
                (RingKind::Completion, len)
            }
            _ => return Err(XskError::Invalid),
        };
        if len > byte_len {
            return Err(XskError::Invalid);
        }
        Ok(kind)
    }
}

/// Which of a bound socket's four rings a successful [`Socket::mmap`] call
/// named, by its page offset (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    Rx,
    Tx,
    Fill,
    Completion,
}

impl Drop for Socket {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
