//! The operator node: opaque to the executor except for an operator-kind
//! tag, an element count, and its inputs. The tensor graph itself
//! (shape/stride/refcount machinery) is an external collaborator out of
//! this crate's scope; what's here is the minimal `OperatorNode` trait the
//! executor dispatches through, plus a concrete `Tensor` and three
//! reference operator nodes so the mechanism is exercisable end-to-end
//! without a full tensor library.

use std::any::Any;
use std::slice;
use std::sync::Arc;

use crate::context::HostAllocator;
use crate::storage::StorageBuffer;

/// A small integer identifying the compute primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum OpKind {
    FillRandom = 0,
    Add = 1,
    Matmul = 2,
}

impl OpKind {
    /// Number of operator-kinds the registry has slots for.
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// The contract the executor needs from a node: which kernel to run and
/// how many output elements it produces. Everything else (the actual
/// inputs, the output storage) is reached by the kernel itself via
/// downcasting through [`OperatorNode::as_any`] — the registry dispatches
/// on `op_kind` alone, an integer tag into a function-pointer table.
pub trait OperatorNode: Send + Sync + Any {
    fn op_kind(&self) -> OpKind;
    fn numel(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

/// Row-major `f32` tensor backed by a [`StorageBuffer`]. This is the
/// crate's stand-in for the real tensor type; it carries no
/// shape/stride/refcount machinery beyond `rows`/`cols`.
pub struct Tensor {
    pub rows: usize,
    pub cols: usize,
    storage: StorageBuffer,
}

impl Tensor {
    pub fn numel(&self) -> usize {
        self.rows * self.cols
    }

    /// Allocate a zero-initialized `rows` x `cols` tensor.
    pub fn zeros(allocator: Arc<dyn HostAllocator>, rows: usize, cols: usize) -> Self {
        let size = rows * cols * size_of::<f32>();
        let storage = StorageBuffer::alloc(allocator, size);
        storage.set(0, 0);
        Self { rows, cols, storage }
    }

    /// Allocate a `rows` x `cols` tensor and copy `data` in via the
    /// storage buffer's `copy_in` — the same host→device path a real
    /// tensor library would use to stage inputs.
    pub fn from_slice(allocator: Arc<dyn HostAllocator>, rows: usize, cols: usize, data: &[f32]) -> Self {
        assert_eq!(data.len(), rows * cols, "tensorcpu: data length does not match shape");
        let t = Self::zeros(allocator, rows, cols);
        let bytes = unsafe {
            slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };
        t.storage.copy_in(0, bytes);
        t
    }

    /// Read the whole tensor out to a host `Vec<f32>` via `copy_out`.
    pub fn to_vec(&self) -> Vec<f32> {
        let mut bytes = vec![0u8; self.storage.size()];
        self.storage.copy_out(0, &mut bytes);
        bytes
            .chunks_exact(size_of::<f32>())
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn as_ptr(&self) -> *const f32 {
        self.storage.as_ptr() as *const f32
    }

    fn as_mut_ptr(&self) -> *mut f32 {
        self.storage.as_mut_ptr() as *mut f32
    }

    pub fn row(&self, r: usize) -> &[f32] {
        assert!(r < self.rows, "tensorcpu: row index out of range");
        unsafe { slice::from_raw_parts(self.as_ptr().add(r * self.cols), self.cols) }
    }

    /// Mutable view of row `r`.
    ///
    /// # Safety
    /// Callers across worker threads must only ever request disjoint row
    /// ranges for the same tensor within one kickoff/barrier cycle — this
    /// is the kernel non-overlap contract, not enforced by the type system
    /// here.
    pub unsafe fn row_mut(&self, r: usize) -> &mut [f32] {
        assert!(r < self.rows, "tensorcpu: row index out of range");
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr().add(r * self.cols), self.cols) }
    }
}

/// Fills the output with a reproducible pseudo-random sequence.
pub struct FillRandomOp {
    pub seed: u64,
    pub out: Tensor,
}

impl OperatorNode for FillRandomOp {
    fn op_kind(&self) -> OpKind {
        OpKind::FillRandom
    }

    fn numel(&self) -> usize {
        self.out.numel()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Elementwise sum of two same-shape tensors.
pub struct AddOp {
    pub lhs: Tensor,
    pub rhs: Tensor,
    pub out: Tensor,
}

impl OperatorNode for AddOp {
    fn op_kind(&self) -> OpKind {
        OpKind::Add
    }

    fn numel(&self) -> usize {
        self.out.numel()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Dense `f32` matrix multiply: `lhs` is `m x k`, `rhs` is `k x n`, `out`
/// is `m x n`.
pub struct MatmulOp {
    pub lhs: Tensor,
    pub rhs: Tensor,
    pub out: Tensor,
}

impl OperatorNode for MatmulOp {
    fn op_kind(&self) -> OpKind {
        OpKind::Matmul
    }

    fn numel(&self) -> usize {
        self.out.numel()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SystemAllocator;

    fn alloc() -> Arc<dyn HostAllocator> {
        Arc::new(SystemAllocator)
    }

    #[test]
    fn tensor_round_trips_through_storage() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let t = Tensor::from_slice(alloc(), 2, 3, &data);
        assert_eq!(t.to_vec(), data);
        assert_eq!(t.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn zeros_is_all_zero() {
        let t = Tensor::zeros(alloc(), 4, 4);
        assert!(t.to_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn op_kind_index_matches_declared_order() {
        assert_eq!(OpKind::FillRandom.index(), 0);
        assert_eq!(OpKind::Add.index(), 1);
        assert_eq!(OpKind::Matmul.index(), 2);
    }
}
