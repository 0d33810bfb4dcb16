//! The CPU device façade: assembles the ISA gate, storage, pool, and
//! heuristic behind the interface the rest of a tensor library would
//! call. This is the one type embedders construct directly.

use std::sync::Arc;

use crate::context::Context;
use crate::heuristic::{self, HeuristicParams};
use crate::isa;
use crate::kernel::KernelRegistry;
use crate::node::OperatorNode;
use crate::pool::{SchedPriority, ThreadPool};
use crate::storage::StorageBuffer;

/// Device-kind tag. Only `Cpu` exists in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
}

/// Construction parameters for [`CpuDevice::init`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceDescriptor {
    /// `0` (the default) means "auto": use `context.cpu_virtual_cores`.
    /// `1` means single-threaded: no pool is created.
    pub thread_count: usize,
    /// Overrides [`heuristic::DEFAULT_GROWTH_SCALE`] when set.
    pub growth_scale: Option<f64>,
    /// Overrides [`heuristic::DEFAULT_NUMEL_THRESHOLD`] when set.
    pub numel_threshold: Option<usize>,
}

/// The CPU backend device. `async_exec` is always `false`: every
/// `exec_fwd` call blocks until its barrier returns.
pub struct CpuDevice {
    name: String,
    context: Context,
    registry: Arc<KernelRegistry>,
    pool: Option<ThreadPool>,
    allocated_workers: usize,
    heuristic: HeuristicParams,
}

impl CpuDevice {
    /// Resolve thread count, populate the kernel registry via the ISA
    /// gate, and create a pool if more than one worker was resolved.
    pub fn init(context: Context, descriptor: DeviceDescriptor) -> Self {
        let thread_count = if descriptor.thread_count == 0 {
            context.cpu_virtual_cores.max(1)
        } else {
            descriptor.thread_count
        };

        let mut registry = KernelRegistry::new();
        let selection = isa::select(&context, &mut registry);
        let registry = Arc::new(registry);

        let pool = if thread_count > 1 {
            Some(ThreadPool::create(thread_count, registry.clone(), SchedPriority::High))
        } else {
            None
        };

        let name = format!(
            "CPU({}) [{} worker(s), {:?}]",
            context.cpu_name, thread_count, selection
        );
        log::info!("tensorcpu: device init: {name}");

        Self {
            name,
            context,
            registry,
            pool,
            allocated_workers: thread_count,
            heuristic: HeuristicParams {
                growth_scale: descriptor.growth_scale.unwrap_or(heuristic::DEFAULT_GROWTH_SCALE),
                numel_threshold: descriptor.numel_threshold.unwrap_or(heuristic::DEFAULT_NUMEL_THRESHOLD),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    pub fn is_async(&self) -> bool {
        false
    }

    pub fn allocated_workers(&self) -> usize {
        self.allocated_workers
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Number of workers that would actually run for `numel` output
    /// elements, per the dynamic width heuristic.
    pub fn active_workers(&self, numel: usize) -> usize {
        let allocated = self.pool.as_ref().map_or(0, ThreadPool::num_allocated_workers);
        heuristic::active_workers(numel, allocated, &self.heuristic)
    }

    /// Run `node`'s kernel, fanning out across the pool if the heuristic
    /// selects more than one worker.
    pub fn exec_fwd(&self, node: Arc<dyn OperatorNode>) {
        let k = self.active_workers(node.numel());
        match &self.pool {
            Some(pool) if k > 1 => pool.parallel_compute(node, k),
            _ => {
                let payload = crate::payload::ComputePayload {
                    node: Some(node),
                    thread_index: 0,
                    thread_count: 1,
                };
                self.registry.dispatch(&payload);
            }
        }
    }

    /// Backward execution is out of scope for this crate; calling it is a
    /// programmer error, not a silently-wrong gradient.
    pub fn exec_bwd(&self, _root: Arc<dyn OperatorNode>) -> ! {
        panic!("tensorcpu: exec_bwd is not implemented; this backend is forward-only")
    }

    /// Allocate a storage buffer through the context's allocator.
    pub fn alloc_storage(&self, size: usize) -> StorageBuffer {
        StorageBuffer::alloc(self.context.allocator.clone(), size)
    }

    /// Free a storage buffer. Equivalent to letting it drop; exposed as an
    /// explicit call to pair with `alloc_storage`.
    pub fn free_storage(&self, buffer: &mut StorageBuffer) {
        buffer.free();
    }
}

impl Drop for CpuDevice {
    fn drop(&mut self) {
        log::info!("tensorcpu: device teardown: {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CpuFeatureSet, SystemAllocator};
    use crate::node::{FillRandomOp, MatmulOp, Tensor};

    fn test_context() -> Context {
        Context {
            cpu_features: CpuFeatureSet::empty(),
            cpu_virtual_cores: 4,
            cpu_name: "test-cpu".to_string(),
            allocator: Arc::new(SystemAllocator),
        }
    }

    #[test]
    fn auto_thread_count_uses_virtual_cores() {
        let device = CpuDevice::init(test_context(), DeviceDescriptor::default());
        assert_eq!(device.allocated_workers(), 4);
    }

    #[test]
    fn thread_count_one_creates_no_pool() {
        let descriptor = DeviceDescriptor {
            thread_count: 1,
            ..Default::default()
        };
        let device = CpuDevice::init(test_context(), descriptor);
        assert_eq!(device.allocated_workers(), 1);
        assert_eq!(device.active_workers(10_000_000), 1);
    }

    #[test]
    fn exec_fwd_runs_small_op_on_caller_only() {
        let descriptor = DeviceDescriptor {
            thread_count: 8,
            ..Default::default()
        };
        let device = CpuDevice::init(test_context(), descriptor);
        let node: Arc<dyn OperatorNode> = Arc::new(FillRandomOp {
            seed: 1,
            out: Tensor::zeros(device.context().allocator.clone(), 10, 10),
        });
        assert_eq!(device.active_workers(node.numel()), 1);
        device.exec_fwd(node.clone());
        let op = node.as_any().downcast_ref::<FillRandomOp>().unwrap();
        assert!(op.out.to_vec().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn exec_fwd_matches_single_threaded_result() {
        let allocator: Arc<dyn crate::context::HostAllocator> = Arc::new(SystemAllocator);
        let size = 64;
        let lhs_data: Vec<f32> = (0..size * size).map(|i| (i % 7) as f32).collect();
        let rhs_data: Vec<f32> = (0..size * size).map(|i| (i % 5) as f32).collect();

        let single = {
            let descriptor = DeviceDescriptor {
                thread_count: 1,
                ..Default::default()
            };
            let device = CpuDevice::init(test_context(), descriptor);
            let node: Arc<dyn OperatorNode> = Arc::new(MatmulOp {
                lhs: Tensor::from_slice(allocator.clone(), size, size, &lhs_data),
                rhs: Tensor::from_slice(allocator.clone(), size, size, &rhs_data),
                out: Tensor::zeros(allocator.clone(), size, size),
            });
            device.exec_fwd(node.clone());
            node.as_any().downcast_ref::<MatmulOp>().unwrap().out.to_vec()
        };

        let multi = {
            let descriptor = DeviceDescriptor {
                thread_count: 4,
                numel_threshold: Some(0),
                ..Default::default()
            };
            let device = CpuDevice::init(test_context(), descriptor);
            let node: Arc<dyn OperatorNode> = Arc::new(MatmulOp {
                lhs: Tensor::from_slice(allocator.clone(), size, size, &lhs_data),
                rhs: Tensor::from_slice(allocator.clone(), size, size, &rhs_data),
                out: Tensor::zeros(allocator.clone(), size, size),
            });
            device.exec_fwd(node.clone());
            node.as_any().downcast_ref::<MatmulOp>().unwrap().out.to_vec()
        };

        assert_eq!(single, multi);
    }

    #[test]
    #[should_panic(expected = "not implemented")]
    fn exec_bwd_panics() {
        let device = CpuDevice::init(test_context(), DeviceDescriptor::default());
        let node: Arc<dyn OperatorNode> = Arc::new(FillRandomOp {
            seed: 1,
            out: Tensor::zeros(device.context().allocator.clone(), 1, 1),
        });
        device.exec_bwd(node);
    }

    #[test]
    fn create_destroy_create_again() {
        {
            let device = CpuDevice::init(test_context(), DeviceDescriptor::default());
            assert_eq!(device.allocated_workers(), 4);
        }
        let device2 = CpuDevice::init(test_context(), DeviceDescriptor::default());
        assert_eq!(device2.allocated_workers(), 4);
    }
}
