//! Backtrace decoder: walks the packed columns from (n, m) to (0, 0) and
//! emits a run of edit operations.
//!
//! Each step recomputes the three neighbor cells from the (pv, mv, score)
//! triples and picks, in contractual order, left, then above, then
//! diagonal. The order is part of the output contract: it makes paths
//! deterministic for ties.

use crate::columns::ColumnSet;

/// Diagonal step, characters equal.
pub const OP_MATCH: i8 = 0;
/// Diagonal step with a substitution. The row tail fill (target exhausted)
/// also emits this code for its vertical steps; see [`OP_INSERT_TARGET`].
pub const OP_MISMATCH: i8 = 1;
/// Horizontal step: a character inserted in the query / consumed from the
/// target. Also used by the column tail fill.
pub const OP_INSERT_QUERY: i8 = 2;
/// Vertical step in the main loop: a character inserted in the target /
/// consumed from the query.
///
/// The emitted-code contract is quirky here and preserved verbatim: the
/// main loop writes 3 for a vertical step, while the tail fill writes 1
/// for the same move. Consumers must treat a 1 as vertical whenever the
/// walk has already exhausted the target.
pub const OP_INSERT_TARGET: i8 = 3;

/// A traceback path, ordered from (n, m) back toward (0, 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentPath {
    pub ops: Vec<i8>,
}

impl AlignmentPath {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of non-match operations; equals the edit distance.
    pub fn edit_count(&self) -> usize {
        self.ops.iter().filter(|&&op| op != OP_MATCH).count()
    }
}

/// Decode the path for the alignment whose columns were filled by
/// [`crate::myers::compute_score_matrix`].
pub fn backtrace(columns: &ColumnSet) -> AlignmentPath {
    let mut i = columns.query_len();
    let mut j = columns.target_len();
    let mut ops = Vec::with_capacity(i + j);

    let mut myscore = if i > 0 && j > 0 { columns.cell(i, j) } else { 0 };

    while i > 0 && j > 0 {
        let above = columns.cell(i - 1, j);
        let diag = columns.cell(i - 1, j - 1);
        let left = columns.cell(i, j - 1);
        if left + 1 == myscore {
            ops.push(OP_INSERT_QUERY);
            myscore = left;
            j -= 1;
        } else if above + 1 == myscore {
            ops.push(OP_INSERT_TARGET);
            myscore = above;
            i -= 1;
        } else {
            ops.push(if diag == myscore { OP_MATCH } else { OP_MISMATCH });
            myscore = diag;
            i -= 1;
            j -= 1;
        }
    }
    while i > 0 {
        ops.push(OP_MISMATCH);
        i -= 1;
    }
    while j > 0 {
        ops.push(OP_INSERT_QUERY);
        j -= 1;
    }

    AlignmentPath { ops }
}

/// Replay an emitted path against its sequence pair.
///
/// Walks the ops in emitted order starting from (n, m) and checks that every
/// step is consistent (matches really match, diagonal mismatches really
/// differ) and that the walk ends exactly at (0, 0). Returns the number of
/// edit operations, or `None` for an inconsistent path. A code 1 is a
/// diagonal substitution while target characters remain and a vertical step
/// once the target is exhausted, per the emitted-code contract.
pub fn replay_path(query: &[u8], target: &[u8], ops: &[i8]) -> Option<usize> {
    let mut i = query.len();
    let mut j = target.len();
    let mut edits = 0;
    for &op in ops {
        match op {
            OP_MATCH => {
                if i == 0 || j == 0 || query[i - 1] != target[j - 1] {
                    return None;
                }
                i -= 1;
                j -= 1;
            }
            OP_MISMATCH => {
                if i == 0 {
                    return None;
                }
                if j > 0 {
                    if query[i - 1] == target[j - 1] {
                        return None;
                    }
                    j -= 1;
                }
                i -= 1;
                edits += 1;
            }
            OP_INSERT_QUERY => {
                if j == 0 {
                    return None;
                }
                j -= 1;
                edits += 1;
            }
            OP_INSERT_TARGET => {
                if i == 0 {
                    return None;
                }
                i -= 1;
                edits += 1;
            }
            _ => return None,
        }
    }
    (i == 0 && j == 0).then_some(edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::myers::compute_score_matrix;
    use crate::reference;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn path_of(query: &[u8], target: &[u8]) -> AlignmentPath {
        backtrace(&compute_score_matrix(query, target))
    }

    #[test]
    fn test_perfect_match() {
        let path = path_of(b"ACGT", b"ACGT");
        assert_eq!(path.ops, vec![OP_MATCH; 4]);
    }

    #[test]
    fn test_single_substitution() {
        // G vs C at query position 2; the path runs from (4,4) to (0,0).
        let path = path_of(b"ACGT", b"ACCT");
        assert_eq!(path.ops, vec![OP_MATCH, OP_MISMATCH, OP_MATCH, OP_MATCH]);
        assert_eq!(path.edit_count(), 1);
    }

    #[test]
    fn test_empty_target_tail_fill() {
        let path = path_of(b"AAAA", b"");
        assert_eq!(path.ops, vec![OP_MISMATCH; 4]);
    }

    #[test]
    fn test_empty_query_tail_fill() {
        let path = path_of(b"", b"CCCC");
        assert_eq!(path.ops, vec![OP_INSERT_QUERY; 4]);
    }

    #[test]
    fn test_both_empty() {
        let path = path_of(b"", b"");
        assert!(path.is_empty());
    }

    #[test]
    fn test_single_target_insertion() {
        let path = path_of(b"ACG", b"ACCG");
        let matches = path.ops.iter().filter(|&&op| op == OP_MATCH).count();
        let inserts = path.ops.iter().filter(|&&op| op == OP_INSERT_QUERY).count();
        assert_eq!((matches, inserts, path.len()), (3, 1, 4));
    }

    #[test]
    fn test_tail_block_substitution_path() {
        // 33-row query: the last valid row sits alone in the tail block.
        let query: Vec<u8> = (0..33).map(|i| if i % 3 == 0 { b'G' } else { b'T' }).collect();
        let mut target = query.clone();
        target[32] = b'A';
        let path = path_of(&query, &target);
        assert_eq!(path.edit_count(), 1);
        assert_eq!(path.len(), 33);
        assert_eq!(replay_path(&query, &target, &path.ops), Some(1));
    }

    #[test]
    fn test_replay_rejects_bad_paths() {
        assert_eq!(replay_path(b"ACGT", b"ACGT", &[OP_MATCH; 3]), None);
        assert_eq!(replay_path(b"ACGT", b"ACCT", &[OP_MATCH; 4]), None);
        assert_eq!(replay_path(b"A", b"A", &[4]), None);
    }

    #[test]
    fn test_replayed_edits_equal_distance() {
        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..60 {
            let n = rng.random_range(0..90);
            let m = rng.random_range(0..90);
            let q: Vec<u8> = (0..n).map(|_| b"ACGT"[rng.random_range(0..4)]).collect();
            let t: Vec<u8> = (0..m).map(|_| b"ACGT"[rng.random_range(0..4)]).collect();
            let path = path_of(&q, &t);
            let distance = reference::edit_distance(&q, &t) as usize;
            assert_eq!(replay_path(&q, &t, &path.ops), Some(distance), "n={n} m={m}");
            assert_eq!(path.edit_count(), distance, "n={n} m={m}");
        }
    }
}
