//! The compute payload: a per-invocation descriptor carried to each
//! worker. Pure data, no operations of its own — its lifetime is the
//! duration of one kickoff/barrier cycle.

use std::sync::Arc;

use crate::node::OperatorNode;

/// `{ node-or-none, thread-index, thread-count }`.
///
/// `node` is consumed (set to `None`) by the worker once it finishes
/// executing, so re-running the same op requires a fresh kickoff.
pub struct ComputePayload {
    pub node: Option<Arc<dyn OperatorNode>>,
    pub thread_index: usize,
    pub thread_count: usize,
}

impl ComputePayload {
    pub fn empty(thread_index: usize, thread_count: usize) -> Self {
        Self {
            node: None,
            thread_index,
            thread_count,
        }
    }
}
