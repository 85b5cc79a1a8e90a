//! GPU aligner: device setup, batch driver, and the host-facing entry points.
//!
//! [`GpuAligner`] is the main entry point for warplev on GPU. Construction
//! initializes the CUDA device and NVRTC-compiles the kernel module; the
//! instance is then reused across batches.
//!
//! Scheduling model: each alignment's score matrix is computed by a single
//! warp, and its backtrace by a single thread. Within a batch, launches are
//! serialized on one stream, so the backtrace of alignment i observes the
//! columns produced by its compute launch, and the three column stores are
//! reused from one alignment to the next. Host-visible blocking happens at
//! the lengths copy-in, at explicit host copy-outs, and at the stream
//! synchronization that ends a batch.

use std::sync::Arc;

use cudarc::driver::{
    CudaDevice, CudaSlice, CudaStream, CudaView, DeviceSlice, LaunchAsync, LaunchConfig,
};

use warplev_core::backtrace::AlignmentPath;
use warplev_core::columns::{word_count, Word};
use warplev_core::matrix::DenseMatrix;

use crate::kernels::{KERNEL_NAMES, KERNEL_SOURCE, MODULE};
use crate::store::BatchMatrixStore;
use crate::{launch_cfg, GpuResult, WARP_SIZE};

/// One warp, one block.
fn warp_cfg() -> LaunchConfig {
    LaunchConfig {
        grid_dim: (1, 1, 1),
        block_dim: (WARP_SIZE, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// A single thread.
fn single_thread_cfg() -> LaunchConfig {
    LaunchConfig {
        grid_dim: (1, 1, 1),
        block_dim: (1, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// GPU-accelerated batch edit-distance aligner.
pub struct GpuAligner {
    /// CUDA device handle (shared reference).
    pub dev: Arc<CudaDevice>,
}

impl GpuAligner {
    /// Create an aligner on the given CUDA device.
    ///
    /// - Initializes CUDA device `ordinal` (typically 0)
    /// - Compiles the CUDA kernels via NVRTC
    ///
    /// This is an expensive one-time setup (~100ms for kernel compilation).
    pub fn new(device_ordinal: usize) -> GpuResult<Self> {
        let dev = CudaDevice::new(device_ordinal)?;

        let ptx = cudarc::nvrtc::compile_ptx(KERNEL_SOURCE)?;
        dev.load_ptx(ptx, MODULE, KERNEL_NAMES)?;

        Ok(Self { dev })
    }

    /// Launch the score-matrix kernel for one alignment on `stream`.
    ///
    /// Requires nonzero query and target lengths.
    #[allow(clippy::too_many_arguments)]
    fn launch_compute(
        &self,
        pv: &mut BatchMatrixStore<Word>,
        mv: &mut BatchMatrixStore<Word>,
        score: &mut BatchMatrixStore<i32>,
        query: &CudaView<'_, u8>,
        target: &CudaView<'_, u8>,
        query_len: usize,
        target_len: usize,
        stream: &CudaStream,
    ) -> GpuResult<()> {
        let n_words = word_count(query_len);
        let cols = target_len + 1;
        let mut pv_v = pv.view_mut(0, n_words, cols);
        let mut mv_v = mv.view_mut(0, n_words, cols);
        let mut score_v = score.view_mut(0, n_words, cols);
        let f = self.dev.get_func(MODULE, "myers_compute_score_matrix").unwrap();
        unsafe {
            f.launch_on_stream(
                stream,
                warp_cfg(),
                (
                    &mut pv_v,
                    &mut mv_v,
                    &mut score_v,
                    query,
                    target,
                    query_len as i32,
                    target_len as i32,
                    n_words as i32,
                ),
            )?;
        }
        Ok(())
    }

    /// Edit distance for a single pair.
    ///
    /// Returns n if the target is empty and m if the query is empty,
    /// otherwise the DP value at (n, m). Convenience wrapper; for
    /// throughput use [`GpuAligner::align_batch`].
    pub fn compute_edit_distance(&self, query: &[u8], target: &[u8]) -> GpuResult<i32> {
        if target.is_empty() {
            return Ok(query.len() as i32);
        }
        if query.is_empty() {
            return Ok(target.len() as i32);
        }

        let n_words = word_count(query.len());
        let cols = target.len() + 1;
        let stream = self.dev.fork_default_stream()?;

        let mut pv = BatchMatrixStore::<Word>::new(&self.dev, 1, n_words * cols)?;
        let mut mv = BatchMatrixStore::<Word>::new(&self.dev, 1, n_words * cols)?;
        let mut score = BatchMatrixStore::<i32>::new(&self.dev, 1, n_words * cols)?;
        let query_d = self.dev.htod_copy(query.to_vec())?;
        let target_d = self.dev.htod_copy(target.to_vec())?;

        self.launch_compute(
            &mut pv,
            &mut mv,
            &mut score,
            &query_d.slice(..),
            &target_d.slice(..),
            query.len(),
            target.len(),
            &stream,
        )?;

        let scores = score.copy_to_host(&self.dev, 0, n_words, cols, &stream)?;
        Ok(*scores.at(n_words - 1, cols - 1))
    }

    /// Dense `(n+1) × (m+1)` score matrix for a single pair.
    ///
    /// Diagnostic entry point: fills the packed columns, expands them into a
    /// dense matrix on device, and copies the result to the host.
    pub fn compute_full_score_matrix(
        &self,
        query: &[u8],
        target: &[u8],
    ) -> GpuResult<DenseMatrix<i32>> {
        let n = query.len();
        let m = target.len();
        let n_words = word_count(n);
        let cols = m + 1;
        let stream = self.dev.fork_default_stream()?;

        let mut pv = BatchMatrixStore::<Word>::new(&self.dev, 1, n_words.max(1) * cols)?;
        let mut mv = BatchMatrixStore::<Word>::new(&self.dev, 1, n_words.max(1) * cols)?;
        let mut score = BatchMatrixStore::<i32>::new(&self.dev, 1, n_words.max(1) * cols)?;

        if n > 0 && m > 0 {
            let query_d = self.dev.htod_copy(query.to_vec())?;
            let target_d = self.dev.htod_copy(target.to_vec())?;
            self.launch_compute(
                &mut pv,
                &mut mv,
                &mut score,
                &query_d.slice(..),
                &target_d.slice(..),
                n,
                m,
                &stream,
            )?;
        }

        let total = (n + 1) * (m + 1);
        let mut full = BatchMatrixStore::<i32>::new(&self.dev, 1, total)?;
        {
            let mut full_v = full.view_mut(0, n + 1, m + 1);
            let pv_v = pv.view(0, n_words, cols);
            let mv_v = mv.view(0, n_words, cols);
            let score_v = score.view(0, n_words, cols);
            let f = self.dev.get_func(MODULE, "myers_expand_matrix").unwrap();
            unsafe {
                f.launch_on_stream(
                    &stream,
                    launch_cfg(total as u32),
                    (
                        &mut full_v,
                        &pv_v,
                        &mv_v,
                        &score_v,
                        n_words as i32,
                        n as i32,
                        m as i32,
                    ),
                )?;
            }
        }

        full.copy_to_host(&self.dev, 0, n + 1, m + 1, &stream)
    }

    /// Align a batch of sequence pairs already resident on the device.
    ///
    /// Buffer layout:
    /// - `sequences`: `2 * n_alignments * max_target_query_length` bytes,
    ///   alignment 0 query, alignment 0 target, alignment 1 query, …, each
    ///   padded to `max_target_query_length`.
    /// - `sequence_lengths`: `2 * n_alignments` i32s, (query_len, target_len)
    ///   pairs.
    /// - `paths_out`: `n_alignments * max_path_length` op codes, each path
    ///   written from its slot's index 0 upward, ordered from (n, m) back
    ///   toward (0, 0).
    /// - `path_lengths_out`: one i32 per alignment.
    ///
    /// Returns after synchronizing `stream`. Mis-sized buffers are
    /// programming errors and panic.
    #[allow(clippy::too_many_arguments)]
    pub fn align_batch(
        &self,
        paths_out: &mut CudaSlice<i8>,
        path_lengths_out: &mut CudaSlice<i32>,
        max_path_length: usize,
        sequences: &CudaSlice<u8>,
        sequence_lengths: &CudaSlice<i32>,
        max_target_query_length: usize,
        n_alignments: usize,
        stream: &CudaStream,
    ) -> GpuResult<()> {
        if n_alignments == 0 {
            return Ok(());
        }
        assert_eq!(
            sequence_lengths.len(),
            2 * n_alignments,
            "sequence_lengths must hold one (query_len, target_len) pair per alignment"
        );
        assert!(
            sequences.len() >= 2 * n_alignments * max_target_query_length,
            "sequences buffer too small for batch layout"
        );
        assert!(
            paths_out.len() >= n_alignments * max_path_length,
            "paths_out must hold max_path_length slots per alignment"
        );
        assert!(path_lengths_out.len() >= n_alignments);

        // The driver needs the per-alignment shapes host-side to size views
        // and launches; one blocking copy-in at batch start.
        self.dev.wait_for(stream)?;
        let lengths = self.dev.dtoh_sync_copy(sequence_lengths)?;

        let mut n_words_max = 0;
        let mut m_max = 0;
        for a in 0..n_alignments {
            let query_len = lengths[2 * a] as usize;
            let target_len = lengths[2 * a + 1] as usize;
            assert!(
                query_len <= max_target_query_length && target_len <= max_target_query_length,
                "alignment {a} exceeds max_target_query_length"
            );
            n_words_max = n_words_max.max(word_count(query_len));
            m_max = m_max.max(target_len);
        }

        // One matrix slot per store, reused alignment to alignment: the
        // serialized launches make each backtrace read the columns its own
        // compute launch wrote.
        let elements = n_words_max.max(1) * (m_max + 1);
        let mut pv = BatchMatrixStore::<Word>::new(&self.dev, 1, elements)?;
        let mut mv = BatchMatrixStore::<Word>::new(&self.dev, 1, elements)?;
        let mut score = BatchMatrixStore::<i32>::new(&self.dev, 1, elements)?;

        for a in 0..n_alignments {
            let query_len = lengths[2 * a] as usize;
            let target_len = lengths[2 * a + 1] as usize;
            let n_words = word_count(query_len);
            let cols = target_len + 1;

            if query_len > 0 && target_len > 0 {
                let query_base = 2 * a * max_target_query_length;
                let target_base = query_base + max_target_query_length;
                let query_v = sequences.slice(query_base..query_base + query_len);
                let target_v = sequences.slice(target_base..target_base + target_len);
                self.launch_compute(
                    &mut pv, &mut mv, &mut score, &query_v, &target_v, query_len, target_len,
                    stream,
                )?;
            }

            let pv_v = pv.view(0, n_words, cols);
            let mv_v = mv.view(0, n_words, cols);
            let score_v = score.view(0, n_words, cols);
            let mut path_v = paths_out.slice_mut(a * max_path_length..(a + 1) * max_path_length);
            let mut len_v = path_lengths_out.slice_mut(a..a + 1);
            let f = self.dev.get_func(MODULE, "myers_backtrace").unwrap();
            unsafe {
                f.launch_on_stream(
                    stream,
                    single_thread_cfg(),
                    (
                        &mut path_v,
                        &mut len_v,
                        max_path_length as i32,
                        &pv_v,
                        &mv_v,
                        &score_v,
                        n_words as i32,
                        query_len as i32,
                        target_len as i32,
                    ),
                )?;
            }
        }

        self.dev.wait_for(stream)?;
        self.dev.synchronize()?;
        Ok(())
    }

    /// Host-side batch convenience: packs the pairs into the device layout
    /// of [`GpuAligner::align_batch`], runs the batch on a forked stream,
    /// and unpacks the paths.
    pub fn align_all(&self, pairs: &[(&[u8], &[u8])]) -> GpuResult<Vec<AlignmentPath>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let n = pairs.len();
        let max_len = pairs
            .iter()
            .map(|(q, t)| q.len().max(t.len()))
            .max()
            .unwrap()
            .max(1);
        let max_path_length = pairs
            .iter()
            .map(|(q, t)| q.len() + t.len())
            .max()
            .unwrap()
            .max(1);

        let mut packed = vec![0u8; 2 * n * max_len];
        let mut lengths = Vec::with_capacity(2 * n);
        for (a, (q, t)) in pairs.iter().enumerate() {
            let query_base = 2 * a * max_len;
            let target_base = query_base + max_len;
            packed[query_base..query_base + q.len()].copy_from_slice(q);
            packed[target_base..target_base + t.len()].copy_from_slice(t);
            lengths.push(q.len() as i32);
            lengths.push(t.len() as i32);
        }

        let sequences = self.dev.htod_copy(packed)?;
        let sequence_lengths = self.dev.htod_copy(lengths)?;
        let mut paths_out = self.dev.alloc_zeros::<i8>(n * max_path_length)?;
        let mut path_lengths_out = self.dev.alloc_zeros::<i32>(n)?;

        let stream = self.dev.fork_default_stream()?;
        self.align_batch(
            &mut paths_out,
            &mut path_lengths_out,
            max_path_length,
            &sequences,
            &sequence_lengths,
            max_len,
            n,
            &stream,
        )?;

        let paths = self.dev.dtoh_sync_copy(&paths_out)?;
        let path_lengths = self.dev.dtoh_sync_copy(&path_lengths_out)?;
        Ok((0..n)
            .map(|a| {
                let base = a * max_path_length;
                AlignmentPath {
                    ops: paths[base..base + path_lengths[a] as usize].to_vec(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use warplev_core::backtrace::replay_path;
    use warplev_core::{align, reference};

    /// Helper: try to init the GPU, skip the test gracefully if unavailable.
    /// cudarc panics (instead of returning Err) when the CUDA driver is
    /// missing, so the panic is caught with std::panic::catch_unwind.
    fn gpu() -> Option<GpuAligner> {
        let result = std::panic::catch_unwind(|| GpuAligner::new(0));
        match result {
            Ok(Ok(aligner)) => Some(aligner),
            Ok(Err(e)) => {
                eprintln!("Skipping GPU test (CUDA error): {e}");
                None
            }
            Err(_) => {
                eprintln!("Skipping GPU test (no CUDA driver / no GPU in this container)");
                None
            }
        }
    }

    fn random_dna(rng: &mut StdRng, len: usize) -> Vec<u8> {
        const BASES: &[u8; 4] = b"ACGT";
        (0..len).map(|_| BASES[rng.random_range(0..4)]).collect()
    }

    #[test]
    fn test_gpu_edit_distance_scenarios() {
        let Some(aligner) = gpu() else { return };
        assert_eq!(aligner.compute_edit_distance(b"ACGT", b"ACGT").unwrap(), 0);
        assert_eq!(aligner.compute_edit_distance(b"ACGT", b"ACCT").unwrap(), 1);
        assert_eq!(aligner.compute_edit_distance(b"AAAA", b"").unwrap(), 4);
        assert_eq!(aligner.compute_edit_distance(b"", b"CCCC").unwrap(), 4);
        assert_eq!(aligner.compute_edit_distance(b"", b"").unwrap(), 0);
        assert_eq!(aligner.compute_edit_distance(b"ACG", b"ACCG").unwrap(), 1);
    }

    #[test]
    fn test_gpu_edit_distance_matches_reference() {
        let Some(aligner) = gpu() else { return };
        let mut rng = StdRng::seed_from_u64(42);
        for n in [1usize, 31, 32, 33, 64, 100, 1024, 1057] {
            let m = rng.random_range(1..200);
            let q = random_dna(&mut rng, n);
            let t = random_dna(&mut rng, m);
            assert_eq!(
                aligner.compute_edit_distance(&q, &t).unwrap(),
                reference::edit_distance(&q, &t),
                "n={n}"
            );
        }
    }

    #[test]
    fn test_gpu_full_score_matrix_matches_reference() {
        let Some(aligner) = gpu() else { return };
        let mut rng = StdRng::seed_from_u64(7);
        for (n, m) in [(0usize, 5usize), (5, 0), (17, 23), (33, 40), (64, 10)] {
            let q = random_dna(&mut rng, n);
            let t = random_dna(&mut rng, m);
            let gpu_matrix = aligner.compute_full_score_matrix(&q, &t).unwrap();
            let cpu_matrix = reference::score_matrix(&q, &t);
            assert_eq!(gpu_matrix, cpu_matrix, "n={n} m={m}");
        }
    }

    #[test]
    fn test_gpu_batch_paths_match_cpu() {
        let Some(aligner) = gpu() else { return };
        let mut rng = StdRng::seed_from_u64(11);
        let tail_query = random_dna(&mut rng, 33);
        let mut tail_target = tail_query.clone();
        tail_target[32] = match tail_target[32] {
            b'A' => b'C',
            _ => b'A',
        };
        let long_query = random_dna(&mut rng, 1100);
        let long_target = random_dna(&mut rng, 140);

        let pairs: Vec<(&[u8], &[u8])> = vec![
            (b"ACGT", b"ACGT"),
            (b"ACGT", b"ACCT"),
            (b"AAAA", b""),
            (b"", b"CCCC"),
            (b"", b""),
            (b"ACG", b"ACCG"),
            (&tail_query, &tail_target),
            (&long_query, &long_target),
        ];

        let gpu_paths = aligner.align_all(&pairs).unwrap();
        assert_eq!(gpu_paths.len(), pairs.len());
        for (a, (q, t)) in pairs.iter().enumerate() {
            let (distance, cpu_path) = align::align(q, t);
            assert_eq!(gpu_paths[a], cpu_path, "alignment {a} path diverges");
            assert_eq!(
                replay_path(q, t, &gpu_paths[a].ops),
                Some(distance as usize),
                "alignment {a} path does not replay"
            );
        }
    }

    #[test]
    fn test_store_bounds_are_programming_errors() {
        let Some(aligner) = gpu() else { return };
        let store = BatchMatrixStore::<i32>::new(&aligner.dev, 2, 16).unwrap();
        let out_of_range = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.view(2, 1, 1);
        }));
        assert!(out_of_range.is_err());
        let too_large = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.view(0, 4, 5);
        }));
        assert!(too_large.is_err());
        let _ = store.view(1, 4, 4);
    }
}
