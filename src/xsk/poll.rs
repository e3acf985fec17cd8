//! Readiness notification (spec §4.6): "is there anything for me to do on
//! this socket" combined with a blocking wait primitive, since this crate
//! has no generic socket readability to hook into the way a real `epoll`
//! would.
//!
//! The teacher defers entirely to `libc::poll` against a real fd
//! (`XskDeviceQueue::wake`, `XskTxRing::wake`, `xsk/user.rs`); there is no fd
//! here, so readiness is computed directly from ring state and a
//! [`WaitQueue`] (`Condvar`-based) stands in for the blocking half of
//! `poll(2)`.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Which directions of a bound socket currently have work pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollFlags {
    /// The rx ring has at least one descriptor available to read.
    pub readable: bool,
    /// The tx ring has at least one free slot to reserve.
    pub writable: bool,
    /// The fill ring went idle last service call with the hook still
    /// offering traffic; an explicit [`crate::xsk::Socket::wake_rx`] is
    /// warranted rather than waiting for the next level-triggered poll.
    pub rx_needs_wakeup: bool,
    /// The tx ring was found fully drained last service call; an explicit
    /// [`crate::xsk::Socket::wake_tx`] is warranted.
    pub tx_needs_wakeup: bool,
}

impl PollFlags {
    pub fn any(&self) -> bool {
        self.readable || self.writable || self.rx_needs_wakeup || self.tx_needs_wakeup
    }
}

/// A condition-variable wait queue that the RX/TX engines signal after
/// making progress, so a caller blocked in [`WaitQueue::wait`] wakes
/// promptly instead of spinning.
pub struct WaitQueue {
    generation: Mutex<u64>,
    cv: Condvar,
}

impl WaitQueue {
    pub fn new() -> Self {
        WaitQueue {
            generation: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// Called by an engine after it changes ring state a waiter might care
    /// about.
    pub fn notify(&self) {
        let mut gen = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *gen = gen.wrapping_add(1);
        self.cv.notify_all();
    }

    /// Block until the next [`WaitQueue::notify`] or `timeout` elapses,
    /// whichever comes first. Returns whether a notification was observed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let gen = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let start = *gen;
        let (guard, result) = self
            .cv
            .wait_timeout_while(gen, timeout, |g| *g == start)
            .unwrap_or_else(|e| e.into_inner());
        drop(guard);
        !result.timed_out()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
