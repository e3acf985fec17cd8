//! Property 6 (data_with_headroom addressing) and property 8 (release
//! idempotence) from spec.md §8.

mod common;

use afxdp_core::xsk::{BufIdx, IfCtx, Socket, SocketConfig};
use afxdp_core::{Umem, UmemConfig};
use common::{QueueHook, TestDevice};

#[test]
fn data_with_headroom_matches_base_plus_index_times_frame_size_plus_headroom() {
    let frame_size = 256u32;
    let headroom = 32u32;
    let num_frames = 10u32;
    let umem = Umem::new(UmemConfig {
        frame_size,
        frame_headroom: headroom,
        frame_count: num_frames,
    })
    .unwrap();

    let base = umem.data().as_ptr();
    for i in 0..num_frames {
        let payload = umem.frame_payload(BufIdx(i)).unwrap();
        let expected = unsafe { base.add((i * frame_size + headroom) as usize) };
        assert_eq!(payload.as_ptr() as *const u8, expected);
        assert_eq!(payload.len(), (frame_size - headroom) as usize);
    }
}

#[test]
fn release_is_idempotent() {
    let umem = Umem::new(UmemConfig {
        frame_size: 2048,
        frame_headroom: 0,
        frame_count: 4,
    })
    .unwrap();
    let mut socket = Socket::new(umem, SocketConfig::default());
    let device = TestDevice::new(1500);
    let hook = QueueHook::new();

    // Idempotent even when never bound.
    socket.release().unwrap();
    socket.release().unwrap();

    socket.bind(IfCtx::new(1, 0), device, hook).unwrap();
    socket.release().unwrap();
    socket.release().unwrap();
    socket.release().unwrap();
}
