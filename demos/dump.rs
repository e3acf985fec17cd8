//! Registers a umem, binds a socket to a simulated device queue, and dumps
//! the resulting ring geometry and statistics. The in-process counterpart
//! to the teacher's `examples/dump.rs`, which does the identical thing
//! against a real `enp8s0` via a real kernel.

use std::sync::Arc;

use afxdp_core::xsk::device::{Device, Hook, HookBuffer};
use afxdp_core::xsk::{IfCtx, Socket, SocketConfig, Umem, UmemConfig};
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
        log::trace!("loopback: transmitting {} bytes", frame.len());
        Ok(())
    }
}

struct EmptyHook;

impl Hook for EmptyHook {
    fn poll(&self, _ifindex: u32, _queue_id: u32) -> Option<HookBuffer> {
        None
    }
}

fn main() {
    env_logger::init();
    let args = <Args as clap::Parser>::parse();

    let umem = Umem::new(UmemConfig {
        frame_size: args.frame_size,
        frame_headroom: 0,
        frame_count: args.frame_count,
    })
    .expect("umem registration");

    let mut socket = Socket::new(umem.clone(), SocketConfig::default());
    let device = Arc::new(LoopbackDevice { mtu: 1500 });
    let hook = Arc::new(EmptyHook);

    socket
        .bind(IfCtx::new(args.ifindex, args.queue_id), device, hook)
        .expect("bind");

    eprintln!("Success!");
    eprintln!("umem: frame_size={} frame_count={}", umem.config().frame_size, umem.config().frame_count);
    eprintln!("stats: {:?}", socket.statistics());
}

#[derive(clap::Parser)]
struct Args {
    #[arg(long, default_value_t = 1)]
    ifindex: u32,
    #[arg(long, default_value_t = 0)]
    queue_id: u32,
    #[arg(long, default_value_t = 4096)]
    frame_size: u32,
    #[arg(long, default_value_t = 1024)]
    frame_count: u32,
}
