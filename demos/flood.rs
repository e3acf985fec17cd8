//! Drives the RX and TX engines against a simulated device/hook pair in a
//! tight, non-blocking loop: the steady-state, low-syscall-rate pattern the
//! teacher's own `flood.rs`/`flood-mt.rs` demonstrate against a real NIC,
//! reproduced here with `needs_wakeup` driving when to actually poll instead
//! of a real `poll(2)` call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use afxdp_core::xsk::device::{Device, Hook, HookBuffer};
use afxdp_core::xsk::{BufIdx, IfCtx, Socket, SocketConfig, Umem, UmemConfig};
use afxdp_core::xdp::XdpDesc;
use afxdp_core::XskError;

struct LoopbackDevice {
    mtu: u32,
}

impl Device for LoopbackDevice {
    fn mtu(&self) -> u32 {
        self.mtu
    }

    fn num_rx_queues(&self) -> u32 {
        1
    }

    fn is_up(&self) -> bool {
        true
    }

    fn transmit(&self, frame: &[u8]) -> Result<(), XskError> {
        log::trace!("flood: transmitted {} bytes", frame.len());
        Ok(())
    }
}

struct FeedHook {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl Hook for FeedHook {
    fn poll(&self, _ifindex: u32, _queue_id: u32) -> Option<HookBuffer> {
        self.queue.lock().unwrap().pop_front().map(HookBuffer::new)
    }
}

fn main() {
    env_logger::init();
    let args = <Args as clap::Parser>::parse();

    let umem = Umem::new(UmemConfig {
        frame_size: 2048,
        frame_headroom: 0,
        frame_count: args.frame_count,
    })
    .expect("umem registration");

    let mut socket = Socket::new(umem.clone(), SocketConfig::default());
    let device = Arc::new(LoopbackDevice { mtu: 1500 });
    let hook = Arc::new(FeedHook {
        queue: Mutex::new(VecDeque::new()),
    });

    let ctx = IfCtx::new(args.ifindex, args.queue_id);
    socket.bind(ctx, device, hook.clone()).expect("bind");

    // Donate every frame to the fill ring up front, same as a real consumer
    // would before asking the kernel for any RX traffic.
    {
        let mut fill = socket.fill(args.frame_count).expect("fill handle");
        fill.insert((0..args.frame_count).map(BufIdx));
        fill.commit();
    }

    let mut rx_total = 0u64;
    let mut tx_total = 0u64;

    for round in 0..args.rounds {
        hook.queue.lock().unwrap().push_back(vec![0xAB; 64]);
        let produced = socket.service_rx().expect("rx service");
        rx_total += u64::from(produced);

        if let Ok(mut rx) = socket.receive(args.frame_count) {
            let mut drained = Vec::new();
            while let Some(desc) = rx.read() {
                drained.push(desc);
            }
            let n = rx.release();
            if n > 0 {
                let mut fill = socket.fill(n).expect("fill handle");
                fill.insert(drained.iter().map(|d: &XdpDesc| BufIdx(d.index)));
                fill.commit();
            }
        }

        if round % args.tx_every == 0 {
            let mut tx = socket.transmit(1).expect("tx handle");
            tx.insert(std::iter::once(XdpDesc {
                index: 0,
                length: 64,
                offset: 0,
            }));
            tx.commit();
        }

        let result = if socket.tx_needs_wakeup() {
            log::trace!("flood: tx ring idle, issuing explicit wake instead of a blind service call");
            socket.wake_tx()
        } else {
            socket.service_tx()
        };
        match result {
            Ok(n) => tx_total += u64::from(n),
            Err(XskError::Again) => {}
            Err(e) => log::warn!("tx service error: {e}"),
        }

        if socket.rx_needs_wakeup() {
            log::trace!("flood: fill ring starved, hook traffic is being dropped until refilled");
        }
    }

    eprintln!("rx_total={rx_total} tx_total={tx_total}");
    eprintln!("stats: {:?}", socket.statistics());
}

#[derive(clap::Parser)]
struct Args {
    #[arg(long, default_value_t = 1)]
    ifindex: u32,
    #[arg(long, default_value_t = 0)]
    queue_id: u32,
    #[arg(long, default_value_t = 64)]
    frame_count: u32,
    #[arg(long, default_value_t = 10_000)]
    rounds: u64,
    #[arg(long, default_value_t = 4)]
    tx_every: u64,
}
