//! Shared test harness: a synthetic [`Device`]/[`Hook`] pair standing in for
//! the NIC driver and packet-processing hook spec.md places out of scope
//! (§1), in the same spirit as the teacher's own lack of a mockable kernel
//! (the teacher instead only ever runs against a real one).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use afxdp_core::xsk::device::{Device, Hook, HookBuffer};
use afxdp_core::XskError;

pub struct TestDevice {
    pub mtu: u32,
    pub num_rx_queues: u32,
    pub up: AtomicBool,
    pub transmitted: Mutex<Vec<Vec<u8>>>,
    pub refuse_next: AtomicBool,
}

impl TestDevice {
    pub fn new(mtu: u32) -> Arc<Self> {
        Arc::new(TestDevice {
            mtu,
            num_rx_queues: 4,
            up: AtomicBool::new(true),
            transmitted: Mutex::new(Vec::new()),
            refuse_next: AtomicBool::new(false),
        })
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

impl Device for TestDevice {
    fn mtu(&self) -> u32 {
        self.mtu
    }

    fn num_rx_queues(&self) -> u32 {
        self.num_rx_queues
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    fn transmit(&self, frame: &[u8]) -> Result<(), XskError> {
        if self.refuse_next.swap(false, Ordering::SeqCst) {
            return Err(XskError::Again);
        }
        self.transmitted.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

pub struct QueueHook {
    pub queue: Mutex<VecDeque<Vec<u8>>>,
}

impl QueueHook {
    pub fn new() -> Arc<Self> {
        Arc::new(QueueHook {
            queue: Mutex::new(VecDeque::new()),
        })
    }

    pub fn push(&self, data: impl Into<Vec<u8>>) {
        self.queue.lock().unwrap().push_back(data.into());
    }
}

impl Hook for QueueHook {
    fn poll(&self, _ifindex: u32, _queue_id: u32) -> Option<HookBuffer> {
        self.queue.lock().unwrap().pop_front().map(HookBuffer::new)
    }
}
