//! CUDA kernel source for warplev.
//!
//! All GPU kernels are embedded as a single CUDA C string, compiled at runtime
//! via NVRTC (NVIDIA Runtime Compilation). This avoids requiring nvcc at build time.
//!
//! Kernel categories:
//! 1. Warp collectives: cross-lane multi-word add and one-bit left shift
//! 2. The Myers block advance and the score-matrix compute kernel
//! 3. Backtrace kernel (single-threaded walk over the packed columns)
//! 4. Dense-matrix expansion kernel (diagnostic)
//!
//! Matrix layout is column-major per alignment: element (row, col) of an
//! n_words-row matrix lives at `col * n_words + row`, matching the host-side
//! `DenseMatrix` and the batched store's view addressing.

/// CUDA module name used when loading the compiled PTX.
pub const MODULE: &str = "warplev";

/// All kernel function names — must match the `extern "C"` declarations below.
pub const KERNEL_NAMES: &[&str] = &[
    "myers_compute_score_matrix",
    "myers_backtrace",
    "myers_expand_matrix",
];

/// CUDA C source for all warplev kernels.
///
/// Carry propagation on GPU:
///   The horizontal mask of Myers' recurrence needs `(eq & pv) + pv` computed
///   over the whole column, which spans up to 32 lanes × 32 bits per stride.
///   Each lane adds its words in a 64-bit accumulator, pushes the carry to
///   the lane above with `__shfl_up_sync`, and the loop repeats while
///   `__any_sync` reports an outstanding carry. One column step produces at
///   most one cross-lane carry, so the loop settles after a single round,
///   but an all-ones word can cascade and the loop handles that too.
///
/// Active mask:
///   When n_words is not a multiple of 32, the trailing stride populates only
///   the bottom `n_words % 32` lanes. That mask is passed to every shuffle
///   and vote so the group never issues divergent collectives.
pub const KERNEL_SOURCE: &str = r#"
extern "C" {

typedef unsigned int word_t;

#define WORD_SIZE 32
#define WARP_SIZE 32

// =====================================================================
// Warp collectives
// =====================================================================

// One-bit left shift across the lanes of the active mask: each lane's MSB
// becomes the LSB of the lane above; lane 0 shifts in a zero.
__device__ __forceinline__ word_t warp_leftshift_sync(unsigned int warp_mask, word_t v)
{
    const word_t from_below = __shfl_up_sync(warp_mask, v >> (WORD_SIZE - 1), 1);
    v <<= 1;
    if (threadIdx.x != 0)
        v |= from_below;
    return v;
}

// Multi-word addition across the active mask: local 64-bit add, then carries
// ripple upward one lane per round until no lane holds one.
__device__ __forceinline__ word_t warp_add_sync(unsigned int warp_mask, word_t a, word_t b)
{
    unsigned long long r = (unsigned long long)a + (unsigned long long)b;
    word_t carry = (word_t)(r >> WORD_SIZE);
    r &= 0xffffffffull;
    while (__any_sync(warp_mask, carry != 0)) {
        word_t incoming = __shfl_up_sync(warp_mask, carry, 1);
        if (threadIdx.x == 0)
            incoming = 0;
        r += incoming;
        carry = (word_t)(r >> WORD_SIZE);
        r &= 0xffffffffull;
    }
    return (word_t)r;
}

// =====================================================================
// Myers block advance
// =====================================================================

// Advance one query block by one target column.
//
// pv/mv bit i encode the +1/-1 delta between rows (block*32 + i) and
// (block*32 + i + 1). carry_in is the delta entering the block at this
// column's boundary; only lane 0 receives a nonzero value. Returns the
// delta leaving the block, which is also the change of the block-top score.
__device__ int myers_advance_block(unsigned int warp_mask, word_t highest_bit,
                                   word_t eq, word_t* pv_io, word_t* mv_io,
                                   int carry_in)
{
    word_t pv = *pv_io;
    word_t mv = *mv_io;

    // xv uses the unmodified match mask; the injected carry bit only feeds
    // the horizontal computation.
    const word_t xv = eq | mv;
    if (carry_in < 0)
        eq |= (word_t)1;

    word_t xh = warp_add_sync(warp_mask, eq & pv, pv);
    xh = (xh ^ pv) | eq;
    word_t ph = mv | ~(xh | pv);
    word_t mh = pv & xh;

    const int carry_out = ((ph & highest_bit) != 0) - ((mh & highest_bit) != 0);

    ph = warp_leftshift_sync(warp_mask, ph);
    mh = warp_leftshift_sync(warp_mask, mh);
    if (carry_in < 0)
        mh |= (word_t)1;
    if (carry_in > 0)
        ph |= (word_t)1;

    *pv_io = mh | ~(xv | ph);
    *mv_io = ph & xv;
    return carry_out;
}

// Match mask of one query block against one target character: the four
// per-alphabet masks are rebuilt and one is selected. Bits past the query
// end stay zero; characters outside ACGT match nothing.
__device__ word_t block_match_mask(const unsigned char* query, int query_len,
                                   int block, unsigned char target_char)
{
    word_t peq_a = 0, peq_c = 0, peq_g = 0, peq_t = 0;
    const int offset = block * WORD_SIZE;
    int len = query_len - offset;
    if (len > WORD_SIZE)
        len = WORD_SIZE;
    for (int i = 0; i < len; ++i) {
        const word_t bit = (word_t)1 << i;
        switch (query[offset + i]) {
            case 'A': peq_a |= bit; break;
            case 'C': peq_c |= bit; break;
            case 'G': peq_g |= bit; break;
            case 'T': peq_t |= bit; break;
            default: break;
        }
    }
    switch (target_char) {
        case 'A': return peq_a;
        case 'C': return peq_c;
        case 'G': return peq_g;
        case 'T': return peq_t;
        default: return (word_t)0;
    }
}

// =====================================================================
// Score-matrix compute kernel — one warp per launch
// =====================================================================

// Fills the packed (pv, mv, score) triple for one alignment. Lane k owns
// blocks k, k+32, k+64, ... of each column. Requires query_len > 0 and
// target_len > 0; matrices are n_words x (target_len + 1), column-major.
__global__ void myers_compute_score_matrix(
    word_t* __restrict__ pv,
    word_t* __restrict__ mv,
    int* __restrict__ score,
    const unsigned char* __restrict__ query,
    const unsigned char* __restrict__ target,
    int query_len,
    int target_len,
    int n_words)
{
    const int lane = threadIdx.x;

    // Column 0: DP(i, 0) = i. The tail block's invalid high pv bits are
    // harmless; recovery masks them.
    for (int idx = lane; idx < n_words; idx += WARP_SIZE) {
        int top = (idx + 1) * WORD_SIZE;
        if (top > query_len)
            top = query_len;
        pv[idx] = ~(word_t)0;
        mv[idx] = (word_t)0;
        score[idx] = top;
    }
    __syncwarp();

    for (int t = 1; t <= target_len; ++t) {
        // The implicit row 0 grows by one per column: +1 enters block 0.
        int warp_carry = (lane == 0) ? 1 : 0;
        for (int idx = lane; idx < n_words; idx += WARP_SIZE) {
            const unsigned int warp_mask = (idx / WARP_SIZE < n_words / WARP_SIZE)
                ? 0xffffffffu
                : (1u << (n_words % WARP_SIZE)) - 1u;

            word_t pv_local = pv[(t - 1) * n_words + idx];
            word_t mv_local = mv[(t - 1) * n_words + idx];
            const word_t highest_bit = (idx == n_words - 1)
                ? (word_t)1 << ((query_len - 1) % WORD_SIZE)
                : (word_t)1 << (WORD_SIZE - 1);
            const word_t eq = block_match_mask(query, query_len, idx, target[t - 1]);

            warp_carry = myers_advance_block(warp_mask, highest_bit, eq,
                                             &pv_local, &mv_local, warp_carry);

            score[t * n_words + idx] = score[(t - 1) * n_words + idx] + warp_carry;
            pv[t * n_words + idx] = pv_local;
            mv[t * n_words + idx] = mv_local;

            // Hand the stride's top carry to lane 0 for the next stride;
            // it only exists when this stride filled the whole warp.
            if (lane == 0)
                warp_carry = 0;
            if (warp_mask == 0xffffffffu)
                warp_carry = __shfl_down_sync(0xffffffffu, warp_carry, WARP_SIZE - 1);
            if (lane != 0)
                warp_carry = 0;
        }
        __syncwarp();
    }
}

// =====================================================================
// Cell recovery and backtrace
// =====================================================================

// Recover DP(i, j) for i >= 1 from the packed triple: start at the block-top
// score and undo the delta bits above bit (i-1).
__device__ int myers_get_score(const word_t* pv, const word_t* mv,
                               const int* score, int n_words,
                               word_t last_entry_mask, int i, int j)
{
    const int word_idx = (i - 1) / WORD_SIZE;
    const int bit_idx = (i - 1) % WORD_SIZE;
    word_t mask = (~(word_t)1) << bit_idx;
    if (word_idx == n_words - 1)
        mask &= last_entry_mask;
    int s = score[j * n_words + word_idx];
    s -= __popc(mask & pv[j * n_words + word_idx]);
    s += __popc(mask & mv[j * n_words + word_idx]);
    return s;
}

// Walk from (query_len, target_len) to (0, 0), emitting one op code per
// step into path[0..]. Tie-break order is left, above, diagonal. Op codes:
// 0 match, 1 mismatch (and the vertical tail fill), 2 horizontal,
// 3 vertical in the main loop.
__global__ void myers_backtrace(
    signed char* __restrict__ path,
    int* __restrict__ path_length,
    int max_path_length,
    const word_t* __restrict__ pv,
    const word_t* __restrict__ mv,
    const int* __restrict__ score,
    int n_words,
    int query_len,
    int target_len)
{
    if (blockIdx.x != 0 || threadIdx.x != 0)
        return;

    int i = query_len;
    int j = target_len;
    int pos = 0;

    const word_t last_entry_mask = (query_len % WORD_SIZE != 0)
        ? ((word_t)1 << (query_len % WORD_SIZE)) - 1
        : ~(word_t)0;

    // Row query_len is the top of the last block, so the start score is
    // stored directly.
    int myscore = (i > 0 && j > 0) ? score[j * n_words + (n_words - 1)] : 0;

    while (i > 0 && j > 0 && pos < max_path_length) {
        const int above = (i == 1) ? j
                                   : myers_get_score(pv, mv, score, n_words, last_entry_mask, i - 1, j);
        const int diag = (i == 1) ? (j - 1)
                                  : myers_get_score(pv, mv, score, n_words, last_entry_mask, i - 1, j - 1);
        const int left = myers_get_score(pv, mv, score, n_words, last_entry_mask, i, j - 1);
        signed char op;
        if (left + 1 == myscore) {
            op = 2;
            myscore = left;
            --j;
        } else if (above + 1 == myscore) {
            op = 3;
            myscore = above;
            --i;
        } else {
            op = (diag == myscore) ? 0 : 1;
            myscore = diag;
            --i;
            --j;
        }
        path[pos++] = op;
    }
    while (i > 0 && pos < max_path_length) {
        path[pos++] = 1;
        --i;
    }
    while (j > 0 && pos < max_path_length) {
        path[pos++] = 2;
        --j;
    }
    *path_length = pos;
}

// =====================================================================
// Dense expansion kernel (diagnostic)
// =====================================================================

// Expand the packed triple into the dense (query_len+1) x (target_len+1)
// score matrix, one thread per cell, column-major output.
__global__ void myers_expand_matrix(
    int* __restrict__ full,
    const word_t* __restrict__ pv,
    const word_t* __restrict__ mv,
    const int* __restrict__ score,
    int n_words,
    int query_len,
    int target_len)
{
    const int idx = blockIdx.x * blockDim.x + threadIdx.x;
    const int n_rows = query_len + 1;
    if (idx >= n_rows * (target_len + 1))
        return;
    const int i = idx % n_rows;
    const int j = idx / n_rows;
    if (i == 0) {
        full[idx] = j;
        return;
    }
    if (j == 0) {
        full[idx] = i;
        return;
    }
    const word_t last_entry_mask = (query_len % WORD_SIZE != 0)
        ? ((word_t)1 << (query_len % WORD_SIZE)) - 1
        : ~(word_t)0;
    full[idx] = myers_get_score(pv, mv, score, n_words, last_entry_mask, i, j);
}

} // extern "C"
"#;
