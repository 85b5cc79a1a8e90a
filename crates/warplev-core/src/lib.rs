//! Warplev core: bit-parallel Levenshtein alignment over a simulated
//! lock-step SIMD group.
//!
//! This crate is the CPU reference for the warplev aligner. It implements
//! the same algorithm the CUDA backend runs on a warp — Myers' bit-parallel
//! edit-distance columns distributed across 32 cooperating lanes — with the
//! cross-lane shuffles realized as snapshot-semantics slice operations:
//! - Packed DP columns: (pv, mv) delta bit-vectors plus block-top scores
//! - Lock-step group collectives (carry-rippling add, cross-lane shift)
//! - Warp-cooperative column advance and score-matrix fill
//! - Backtrace decoding of packed columns into edit-operation paths
//! - A naive quadratic DP used as ground truth
//!
//! NOT implemented (by design): affine or custom scoring, semi-global and
//! local alignment, alphabets beyond {A, C, G, T}.

pub mod align;
pub mod backtrace;
pub mod columns;
pub mod matrix;
pub mod myers;
pub mod reference;
pub mod warp;
