//! The kernel registry: a fixed-size table of forward-kernel function
//! pointers keyed by operator-kind. Populated once at device init by the
//! ISA feature gate, read-only thereafter.

use crate::error;
use crate::node::OpKind;
use crate::payload::ComputePayload;

/// A kernel: reads `thread_index`/`thread_count` off the payload and
/// computes exactly its share of the output. The union of shares over
/// `0..thread_count` must cover the whole output with no overlap when
/// called with the same node at the same phase.
pub type ForwardKernel = fn(&ComputePayload);

/// Table of kernels keyed by [`OpKind`]. Slots start empty; a device is
/// not usable until [`crate::isa::select`] has populated every slot the
/// workload needs.
pub struct KernelRegistry {
    forward: [Option<ForwardKernel>; OpKind::COUNT],
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelRegistry {
    pub const fn new() -> Self {
        Self {
            forward: [None; OpKind::COUNT],
        }
    }

    pub fn install(&mut self, op: OpKind, kernel: ForwardKernel) {
        self.forward[op.index()] = Some(kernel);
    }

    pub fn get(&self, op: OpKind) -> Option<ForwardKernel> {
        self.forward[op.index()]
    }

    /// Dispatch `payload` to the kernel registered for its node's
    /// operator-kind. Panics if no kernel is registered — an unregistered
    /// op is a programmer error, never a recoverable one.
    pub fn dispatch(&self, payload: &ComputePayload) {
        let op = match &payload.node {
            Some(node) => node.op_kind(),
            None => return,
        };
        match self.get(op) {
            Some(kernel) => kernel(payload),
            None => error::unregistered_op(op.index()),
        }
    }
}
