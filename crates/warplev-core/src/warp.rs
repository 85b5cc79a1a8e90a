//! Lock-step SIMD-group collectives, simulated on the CPU.
//!
//! The column update distributes the query blocks of one DP column over the
//! lanes of a fixed-width SIMD group. Two cross-lane operations are needed:
//! a multi-word addition whose carries ripple upward between lanes, and a
//! one-bit left shift whose MSBs travel into the next lane. On a CUDA device
//! these are `__shfl_up_sync` loops; here each collective operates on a slice
//! with one entry per active lane, in lock-step: inputs are snapshot before
//! any lane writes, exactly as a hardware shuffle observes its sources.
//!
//! Lane 0 is the group boundary and receives zero from below in every
//! shuffle.

use crate::columns::{Word, WORD_SIZE};

/// Number of lanes in one SIMD group.
pub const WARP_SIZE: usize = 32;

/// Multi-word addition `sum = a + b` across the active lanes.
///
/// Each lane adds locally in a 64-bit accumulator and extracts its carry;
/// carries are shuffled up one lane and re-added until no lane holds one.
/// A single Myers column step generates at most one cross-lane carry, so the
/// loop settles after one round in practice, but the loop is kept tolerant
/// of longer ripples (an all-ones lane can cascade).
pub(crate) fn group_add(a: &[Word], b: &[Word], sum: &mut [Word]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), sum.len());
    let lanes = a.len();

    let mut acc: Vec<u64> = (0..lanes).map(|k| a[k] as u64 + b[k] as u64).collect();
    let mut carry: Vec<Word> = acc.iter().map(|&r| (r >> WORD_SIZE) as Word).collect();
    for r in acc.iter_mut() {
        *r &= Word::MAX as u64;
    }

    while carry.iter().any(|&c| c != 0) {
        // Upshift shuffle: lane k receives lane k-1's carry, lane 0 gets 0.
        let mut incoming = vec![0; lanes];
        incoming[1..].copy_from_slice(&carry[..lanes - 1]);
        for k in 0..lanes {
            acc[k] += incoming[k] as u64;
        }
        carry = acc.iter().map(|&r| (r >> WORD_SIZE) as Word).collect();
        for r in acc.iter_mut() {
            *r &= Word::MAX as u64;
        }
    }

    for k in 0..lanes {
        sum[k] = acc[k] as Word;
    }
}

/// One-bit left shift across the whole column held by the active lanes.
///
/// Within a lane this is `<< 1`; each lane's MSB becomes the next lane's
/// LSB. Lane 0 shifts in a zero (the caller injects any boundary bit
/// afterwards).
pub(crate) fn group_shift_left(v: &mut [Word]) {
    for k in (0..v.len()).rev() {
        let from_below = if k == 0 { 0 } else { v[k - 1] >> (WORD_SIZE - 1) };
        v[k] = (v[k] << 1) | from_below;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_add_no_carry() {
        let a = [1, 2, 3];
        let b = [10, 20, 30];
        let mut sum = [0; 3];
        group_add(&a, &b, &mut sum);
        assert_eq!(sum, [11, 22, 33]);
    }

    #[test]
    fn test_group_add_single_carry() {
        let a = [0xffff_ffff, 0, 7];
        let b = [1, 0, 0];
        let mut sum = [0; 3];
        group_add(&a, &b, &mut sum);
        assert_eq!(sum, [0, 1, 7]);
    }

    #[test]
    fn test_group_add_carry_cascade() {
        // Lane 0 overflows, and lane 1 is all-ones so the incoming carry
        // ripples on into lane 2: two rounds of the settle loop.
        let a = [0xffff_ffff, 0xffff_ffff, 0];
        let b = [1, 0, 0];
        let mut sum = [0; 3];
        group_add(&a, &b, &mut sum);
        assert_eq!(sum, [0, 0, 1]);
    }

    #[test]
    fn test_group_add_carry_stops_at_top_lane() {
        let a = [0xffff_ffff];
        let b = [1];
        let mut sum = [0; 1];
        group_add(&a, &b, &mut sum);
        assert_eq!(sum, [0]);
    }

    #[test]
    fn test_group_shift_left_msb_travels() {
        let mut v = [0x8000_0000, 0, 0x8000_0001];
        group_shift_left(&mut v);
        assert_eq!(v, [0, 1, 2]);
    }

    #[test]
    fn test_group_shift_left_lane0_gets_zero() {
        let mut v = [0x1];
        group_shift_left(&mut v);
        assert_eq!(v, [0x2]);
    }
}
