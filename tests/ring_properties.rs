//! Property-based invariants from spec.md §8: ring occupancy bounds (1),
//! descriptor bounds validation (3), exact-capacity boundary behavior (9),
//! and the `offset + length == frame_size` boundary (10).

use proptest::prelude::*;

use afxdp_core::xsk::ring::{Ring, RingCons, RingProd};
use afxdp_core::xsk::{BufIdx, FrameProps};
use afxdp_core::xdp::XdpDesc;

fn props() -> FrameProps {
    FrameProps {
        frame_size: 2048,
        headroom: 0,
        num_frames: 16,
    }
}

proptest! {
    /// Invariant 1: `0 <= producer - consumer <= capacity` after any
    /// sequence of reserve/submit/peek/release operations, expressed here
    /// as "count_free + outstanding == capacity" always holding.
    #[test]
    fn ring_occupancy_never_exceeds_capacity(
        ops in proptest::collection::vec(0u32..6, 0..200),
    ) {
        let ring = Ring::<BufIdx>::new(16);
        let mut prod = RingProd::new(ring.clone());
        let mut cons = RingCons::new(ring);
        let mut outstanding: i64 = 0;

        for op in ops {
            match op {
                0..=2 => {
                    let got = prod.reserve(3);
                    for j in 0..got {
                        prod.write(j, BufIdx(j));
                    }
                    prod.submit();
                    outstanding += i64::from(got);
                }
                _ => {
                    let got = cons.peek(3);
                    cons.release(got);
                    outstanding -= i64::from(got);
                }
            }
            prop_assert!(outstanding >= 0);
            prop_assert!(outstanding <= 16);
        }
    }

    /// Invariant 9: a ring of capacity N accepts exactly N outstanding
    /// reservations; the N+1'th reports full (reserves 0).
    #[test]
    fn ring_reserve_saturates_at_capacity(capacity_pow in 1u32..8) {
        let capacity = 1u32 << capacity_pow;
        let ring = Ring::<BufIdx>::new(capacity);
        let mut prod = RingProd::new(ring);

        let got = prod.reserve(capacity);
        prop_assert_eq!(got, capacity);
        let overflow = prod.reserve(1);
        prop_assert_eq!(overflow, 0);
    }

    /// Invariant 3/10: a descriptor with `offset + length == frame_size` is
    /// accepted; `offset + length == frame_size + 1` is rejected.
    #[test]
    fn descriptor_bound_is_exact(offset in 0u32..2048) {
        let p = props();
        let length = p.frame_size - offset;
        let exact = XdpDesc { index: 0, length, offset };
        prop_assert!(validate(&exact, &p));

        let over = XdpDesc { index: 0, length: length + 1, offset };
        prop_assert!(!validate(&over, &p));
    }

    /// Invariant 3: an out-of-range frame index is always rejected
    /// regardless of offset/length.
    #[test]
    fn descriptor_index_bound_is_checked(index in 0u32..64, offset in 0u32..512, length in 0u32..512) {
        let p = props();
        let desc = XdpDesc { index, length, offset };
        let result = validate(&desc, &p);
        if index >= p.num_frames {
            prop_assert!(!result);
        }
    }
}

fn validate(desc: &XdpDesc, props: &FrameProps) -> bool {
    use afxdp_core::xsk::ring::Slot;
    desc.validate(props)
}

#[test]
fn ring_construction_rejects_non_power_of_two() {
    let result = std::panic::catch_unwind(|| Ring::<BufIdx>::new(3));
    assert!(result.is_err());
}

#[test]
fn ring_construction_rejects_zero() {
    let result = std::panic::catch_unwind(|| Ring::<BufIdx>::new(0));
    assert!(result.is_err());
}
