//! Warplev CUDA backend: warp-parallel Myers edit-distance alignment.
//!
//! This crate runs the bit-parallel Levenshtein algorithm implemented in
//! `warplev-core` on NVIDIA GPUs. One warp computes one alignment's packed
//! DP columns — each lane owns one 32-bit query block, and the cross-column
//! carries and shifts travel between lanes as warp shuffles — and a
//! single-threaded kernel decodes the traceback path from the packed state.
//!
//! # Architecture
//!
//! - **CUDA kernels** are embedded as CUDA C source in [`kernels`] and
//!   compiled at runtime via NVRTC. No `nvcc` needed at build time.
//! - **Batched matrix store** ([`store::BatchMatrixStore`]): one contiguous
//!   device allocation carved into per-alignment column-major views.
//! - **Batch driver** ([`aligner::GpuAligner::align_batch`]): per alignment,
//!   a compute launch (one warp) followed by a backtrace launch (one
//!   thread), serialized on the caller's stream; one stream sync at batch
//!   end.
//!
//! # Usage
//!
//! ```rust,no_run
//! use warplev_cuda::GpuAligner;
//!
//! let aligner = GpuAligner::new(0).expect("CUDA init failed");
//!
//! let distance = aligner.compute_edit_distance(b"ACGT", b"ACCT").unwrap();
//! assert_eq!(distance, 1);
//!
//! let paths = aligner
//!     .align_all(&[(b"ACGT".as_slice(), b"ACCT".as_slice())])
//!     .unwrap();
//! assert_eq!(paths[0].len(), 4);
//! ```

pub mod aligner;
pub mod kernels;
pub mod store;

// Re-export main types for convenience.
pub use aligner::GpuAligner;
pub use store::BatchMatrixStore;

use cudarc::driver::{DriverError, LaunchConfig};

/// Lanes per SIMD group; one warp advances one DP column per iteration.
pub const WARP_SIZE: u32 = 32;

/// CUDA thread block size for element-wise kernels.
pub const BLOCK_SIZE: u32 = 256;

/// Result type for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;

/// Errors that can occur during GPU operations.
#[derive(Debug)]
pub enum GpuError {
    /// CUDA driver error (device init, memory alloc, kernel launch).
    Driver(DriverError),
    /// NVRTC compilation error (should never happen with embedded source).
    Compile(String),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::Driver(e) => write!(f, "CUDA driver error: {e}"),
            GpuError::Compile(e) => write!(f, "NVRTC compile error: {e}"),
        }
    }
}

impl std::error::Error for GpuError {}

impl From<DriverError> for GpuError {
    fn from(e: DriverError) -> Self {
        GpuError::Driver(e)
    }
}

impl From<cudarc::nvrtc::CompileError> for GpuError {
    fn from(e: cudarc::nvrtc::CompileError) -> Self {
        GpuError::Compile(format!("{e:?}"))
    }
}

/// Compute a launch configuration for `num_threads` total threads.
pub fn launch_cfg(num_threads: u32) -> LaunchConfig {
    LaunchConfig {
        grid_dim: ((num_threads + BLOCK_SIZE - 1) / BLOCK_SIZE, 1, 1),
        block_dim: (BLOCK_SIZE, 1, 1),
        shared_mem_bytes: 0,
    }
}
