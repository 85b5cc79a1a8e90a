//! Single-pair alignment entry points.
//!
//! Callers must supply sequences over {A, C, G, T}; other bytes match
//! nothing and the result is unspecified.

use crate::backtrace::{backtrace, AlignmentPath};
use crate::myers;

/// Unit-cost edit distance between `query` and `target`.
pub fn edit_distance(query: &[u8], target: &[u8]) -> i32 {
    myers::compute_edit_distance(query, target)
}

/// Edit distance plus the traceback path (ordered from (n, m) to (0, 0)).
pub fn align(query: &[u8], target: &[u8]) -> (i32, AlignmentPath) {
    let columns = myers::compute_score_matrix(query, target);
    let distance = columns.cell(query.len(), target.len());
    (distance, backtrace(&columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrace::replay_path;

    #[test]
    fn test_align_reports_consistent_distance() {
        for (q, t) in [
            (b"ACGT".as_slice(), b"ACGT".as_slice()),
            (b"ACGT", b"ACCT"),
            (b"AAAA", b""),
            (b"", b"CCCC"),
            (b"", b""),
            (b"ACG", b"ACCG"),
            (b"GATTACA", b"TACT"),
        ] {
            let (distance, path) = align(q, t);
            assert_eq!(replay_path(q, t, &path.ops), Some(distance as usize));
        }
    }

    #[test]
    fn test_empty_cases() {
        assert_eq!(edit_distance(b"", b""), 0);
        assert_eq!(edit_distance(b"ACGTACGT", b""), 8);
        assert_eq!(edit_distance(b"", b"ACG"), 3);
    }
}
