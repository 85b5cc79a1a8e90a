//! Batched device matrix store.
//!
//! One contiguous device buffer hosts `batch_count` logically independent
//! matrices of up to `elements_per_batch` elements each. Callers carve
//! 2-D column-major views out of a batch slot by (batch_id, rows, cols);
//! element (row, col) of a view lives at
//! `batch_id * elements_per_batch + col * rows + row`.
//!
//! The store owns the allocation only. Logical shapes belong to the views,
//! and shape errors are programming errors: bounds violations panic.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice, CudaStream, CudaView, CudaViewMut, DeviceRepr, ValidAsZeroBits};

use warplev_core::matrix::DenseMatrix;

use crate::GpuResult;

/// A batch of same-capacity device matrices backed by a single allocation.
pub struct BatchMatrixStore<T> {
    buf: CudaSlice<T>,
    batch_count: usize,
    elements_per_batch: usize,
}

impl<T: DeviceRepr + ValidAsZeroBits + Copy + Default> BatchMatrixStore<T> {
    /// Allocate zeroed device storage for `batch_count` matrices of
    /// `elements_per_batch` elements each. Allocation failure is fatal to
    /// the batch and surfaces as an error.
    pub fn new(
        dev: &Arc<CudaDevice>,
        batch_count: usize,
        elements_per_batch: usize,
    ) -> GpuResult<Self> {
        let buf = dev.alloc_zeros::<T>(batch_count * elements_per_batch)?;
        Ok(Self {
            buf,
            batch_count,
            elements_per_batch,
        })
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    pub fn elements_per_batch(&self) -> usize {
        self.elements_per_batch
    }

    #[inline]
    fn batch_range(&self, batch_id: usize, rows: usize, cols: usize) -> std::ops::Range<usize> {
        assert!(
            batch_id < self.batch_count,
            "batch_id {batch_id} out of range (batch_count {})",
            self.batch_count
        );
        assert!(
            rows * cols <= self.elements_per_batch,
            "{rows}x{cols} view exceeds batch capacity {}",
            self.elements_per_batch
        );
        let base = batch_id * self.elements_per_batch;
        base..base + rows * cols
    }

    /// Read-only view of one batch slot as a `rows × cols` matrix.
    pub fn view(&self, batch_id: usize, rows: usize, cols: usize) -> CudaView<'_, T> {
        self.buf.slice(self.batch_range(batch_id, rows, cols))
    }

    /// Writable view of one batch slot as a `rows × cols` matrix.
    pub fn view_mut(&mut self, batch_id: usize, rows: usize, cols: usize) -> CudaViewMut<'_, T> {
        let range = self.batch_range(batch_id, rows, cols);
        self.buf.slice_mut(range)
    }

    /// Download one batch slot as a host-side dense matrix.
    ///
    /// Waits for the supplied stream first, so pending kernels writing the
    /// slot are observed, then copies synchronously.
    pub fn copy_to_host(
        &self,
        dev: &Arc<CudaDevice>,
        batch_id: usize,
        rows: usize,
        cols: usize,
        stream: &CudaStream,
    ) -> GpuResult<DenseMatrix<T>> {
        dev.wait_for(stream)?;
        let data = dev.dtoh_sync_copy(&self.view(batch_id, rows, cols))?;
        Ok(DenseMatrix::from_vec(rows, cols, data))
    }
}
