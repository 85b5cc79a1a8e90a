//! Warp-cooperative Myers column advance and score-matrix fill.
//!
//! One SIMD group advances one DP column per iteration (Myers 1999,
//! block-parallel variant). Lane k owns block k of the column, and by
//! striding blocks k, k+32, k+2*32, … for queries longer than 32×32 rows.
//! The horizontal +1 mask requires an addition that spans the whole column,
//! so carries ripple between lanes ([`crate::warp::group_add`]); the final
//! one-bit shift likewise crosses lane boundaries
//! ([`crate::warp::group_shift_left`]).
//!
//! The boundary delta entering block 0 of each column is +1: the implicit
//! row 0 of the global-alignment matrix is 0, 1, 2, …

use crate::columns::{word_count, ColumnSet, Word, WORD_SIZE};
use crate::warp::{group_add, group_shift_left, WARP_SIZE};

/// Advance one stride of query blocks by one target column.
///
/// `pv`/`mv` hold the lanes' block state from the previous column and are
/// updated in place; `eq` is the per-lane match mask for the current target
/// character; `highest_bit` selects each block's most significant valid row.
/// `carry_in` is the DP delta crossing into lane 0's block (nonzero only on
/// lane 0 by protocol); `carry_out[k]` receives the delta exiting block k at
/// this column, which is also the change of that block's top score.
fn advance_blocks(
    pv: &mut [Word],
    mv: &mut [Word],
    eq: &[Word],
    highest_bit: &[Word],
    carry_in: i32,
    carry_out: &mut [i32],
) {
    let lanes = pv.len();

    // xv uses the unmodified match mask; the carry injection below only
    // feeds the horizontal computation.
    let xv: Vec<Word> = (0..lanes).map(|k| eq[k] | mv[k]).collect();
    let mut eq_in: Vec<Word> = eq.to_vec();
    if carry_in < 0 {
        eq_in[0] |= 1;
    }

    let addend: Vec<Word> = (0..lanes).map(|k| eq_in[k] & pv[k]).collect();
    let mut xh = vec![0; lanes];
    group_add(&addend, pv, &mut xh);
    for k in 0..lanes {
        xh[k] = (xh[k] ^ pv[k]) | eq_in[k];
    }

    let mut ph: Vec<Word> = (0..lanes).map(|k| mv[k] | !(xh[k] | pv[k])).collect();
    let mut mh: Vec<Word> = (0..lanes).map(|k| pv[k] & xh[k]).collect();

    for k in 0..lanes {
        carry_out[k] = i32::from(ph[k] & highest_bit[k] != 0) - i32::from(mh[k] & highest_bit[k] != 0);
    }

    group_shift_left(&mut ph);
    group_shift_left(&mut mh);
    if carry_in < 0 {
        mh[0] |= 1;
    }
    if carry_in > 0 {
        ph[0] |= 1;
    }

    for k in 0..lanes {
        pv[k] = mh[k] | !(xv[k] | ph[k]);
        mv[k] = ph[k] & xv[k];
    }
}

/// Match mask of one query block against one target character.
///
/// Builds the four per-alphabet masks for the 32-row window and selects by
/// the target character; bits past the query end stay zero, as does the
/// whole mask for characters outside {A, C, G, T}.
fn block_match_mask(query: &[u8], block: usize, target_char: u8) -> Word {
    let offset = block * WORD_SIZE;
    let len = WORD_SIZE.min(query.len() - offset);
    let (mut peq_a, mut peq_c, mut peq_g, mut peq_t) = (0, 0, 0, 0);
    for i in 0..len {
        let bit = 1 << i;
        match query[offset + i] {
            b'A' => peq_a |= bit,
            b'C' => peq_c |= bit,
            b'G' => peq_g |= bit,
            b'T' => peq_t |= bit,
            _ => {}
        }
    }
    match target_char {
        b'A' => peq_a,
        b'C' => peq_c,
        b'G' => peq_g,
        b'T' => peq_t,
        _ => 0,
    }
}

/// The block's most significant valid bit: bit 31 for full blocks, bit
/// (n-1) mod 32 for the tail block.
#[inline]
fn highest_bit_of(block: usize, n_words: usize, query_len: usize) -> Word {
    if block == n_words - 1 {
        1 << ((query_len - 1) % WORD_SIZE)
    } else {
        1 << (WORD_SIZE - 1)
    }
}

/// Fill the packed (pv, mv, score) triple for every column of one alignment.
pub fn compute_score_matrix(query: &[u8], target: &[u8]) -> ColumnSet {
    let mut columns = ColumnSet::new(query.len(), target.len());
    let n_words = columns.n_words();

    for t in 1..=target.len() {
        let target_char = target[t - 1];
        let mut warp_carry = 1;
        let mut base = 0;
        while base < n_words {
            let active = WARP_SIZE.min(n_words - base);
            let mut pv: Vec<Word> = (0..active).map(|k| *columns.pv.at(base + k, t - 1)).collect();
            let mut mv: Vec<Word> = (0..active).map(|k| *columns.mv.at(base + k, t - 1)).collect();
            let eq: Vec<Word> = (0..active)
                .map(|k| block_match_mask(query, base + k, target_char))
                .collect();
            let highest_bit: Vec<Word> = (0..active)
                .map(|k| highest_bit_of(base + k, n_words, query.len()))
                .collect();
            let mut carry_out = vec![0; active];

            advance_blocks(&mut pv, &mut mv, &eq, &highest_bit, warp_carry, &mut carry_out);

            for k in 0..active {
                let b = base + k;
                *columns.pv.at_mut(b, t) = pv[k];
                *columns.mv.at_mut(b, t) = mv[k];
                let prev = *columns.score.at(b, t - 1);
                *columns.score.at_mut(b, t) = prev + carry_out[k];
            }

            // The carry leaving the stride's top lane feeds lane 0 of the
            // next stride; it only exists when the stride filled the group.
            warp_carry = if active == WARP_SIZE { carry_out[active - 1] } else { 0 };
            base += WARP_SIZE;
        }
    }
    columns
}

/// Edit distance only, keeping a single rolling column.
///
/// Returns n for an empty target and m for an empty query, otherwise the
/// DP value at (n, m).
pub fn compute_edit_distance(query: &[u8], target: &[u8]) -> i32 {
    if target.is_empty() {
        return query.len() as i32;
    }
    if query.is_empty() {
        return target.len() as i32;
    }

    let n_words = word_count(query.len());
    let mut pv = vec![!0; n_words];
    let mut mv = vec![0; n_words];
    let mut score: Vec<i32> = (0..n_words)
        .map(|b| ((b + 1) * WORD_SIZE).min(query.len()) as i32)
        .collect();

    for &target_char in target {
        let mut warp_carry = 1;
        let mut base = 0;
        while base < n_words {
            let active = WARP_SIZE.min(n_words - base);
            let eq: Vec<Word> = (0..active)
                .map(|k| block_match_mask(query, base + k, target_char))
                .collect();
            let highest_bit: Vec<Word> = (0..active)
                .map(|k| highest_bit_of(base + k, n_words, query.len()))
                .collect();
            let mut carry_out = vec![0; active];

            advance_blocks(
                &mut pv[base..base + active],
                &mut mv[base..base + active],
                &eq,
                &highest_bit,
                warp_carry,
                &mut carry_out,
            );

            for k in 0..active {
                score[base + k] += carry_out[k];
            }
            warp_carry = if active == WARP_SIZE { carry_out[active - 1] } else { 0 };
            base += WARP_SIZE;
        }
    }
    score[n_words - 1]
}
