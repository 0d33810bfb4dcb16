//! tensorcpu: a CPU compute backend for a small tensor library.
//!
//! Three tiers:
//! - A barrier-synchronized intra-op thread pool ([`pool`]) — one OS
//!   thread per allocated worker minus one, the calling thread doubling
//!   as worker 0.
//! - Runtime ISA feature-gated kernel specialization ([`isa`]), selecting
//!   the best-matching tier from an ordered list and falling back to a
//!   portable scalar implementation ([`kernels::generic`]) when nothing
//!   matches.
//! - A dynamic width heuristic ([`heuristic`]) that keeps small ops on a
//!   single thread and only fans out once the work is large enough to
//!   amortize wake-up cost.
//!
//! [`device::CpuDevice`] assembles all three behind the façade the rest of
//! a tensor library would call: `init`, `exec_fwd`, `alloc_storage`,
//! `free_storage`.
//!
//! # Usage
//!
//! ```ignore
//! use tensorcpu::{Context, CpuDevice, DeviceDescriptor};
//!
//! let device = CpuDevice::init(Context::probe(), DeviceDescriptor::default());
//! ```

pub mod context;
pub mod device;
pub mod error;
pub mod heuristic;
pub mod isa;
pub mod kernel;
pub mod kernels;
pub mod node;
pub mod payload;
pub mod pool;
pub mod storage;

pub use context::{Context, CpuFeature, CpuFeatureSet, HostAllocator, SystemAllocator};
pub use device::{CpuDevice, DeviceDescriptor, DeviceKind};
pub use heuristic::HeuristicParams;
pub use isa::Selection;
pub use kernel::{ForwardKernel, KernelRegistry};
pub use node::{AddOp, FillRandomOp, MatmulOp, OpKind, OperatorNode, Tensor};
pub use payload::ComputePayload;
pub use pool::{SchedPriority, ThreadPool};
pub use storage::StorageBuffer;
