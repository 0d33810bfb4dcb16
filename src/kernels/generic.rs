//! The portable, scalar reference kernels. Installed as the fallback on
//! every target, and also what every x86-64 ISA tier in [`super::amd64`]
//! delegates to — the tiers exist to exercise specialization
//! *selection*, not to ship separately hand-vectorized math.

use crate::kernel::KernelRegistry;
use crate::node::{AddOp, FillRandomOp, MatmulOp, OpKind};
use crate::payload::ComputePayload;

use super::row_range;

/// `xorshift64*`: small, fast, deterministic — good enough for a
/// reference fill kernel, not for anything cryptographic.
fn xorshift64star(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    *state = x;
    x.wrapping_mul(0x2545F4914F6CDD1D)
}

fn fill_random_kernel(payload: &ComputePayload) {
    let node = payload
        .node
        .as_ref()
        .expect("tensorcpu: fill_random kernel invoked with no node")
        .as_any()
        .downcast_ref::<FillRandomOp>()
        .expect("tensorcpu: fill_random kernel invoked on non-FillRandomOp node");
    let (start, end) = row_range(payload.thread_index, payload.thread_count, node.out.rows);
    for r in start..end {
        // Row-dependent seed so each worker's stream is independent and
        // the result is reproducible regardless of how work was split.
        let mut state = node.seed ^ (r as u64).wrapping_mul(0x9E3779B97F4A7C15) ^ 1;
        // SAFETY: [start, end) ranges are disjoint across workers.
        let row = unsafe { node.out.row_mut(r) };
        for v in row.iter_mut() {
            let bits = (xorshift64star(&mut state) >> 40) as u32; // 24 significant bits
            *v = (bits as f32 / (1u32 << 24) as f32) * 2.0 - 1.0; // uniform in [-1, 1)
        }
    }
}

fn add_kernel(payload: &ComputePayload) {
    let node = payload
        .node
        .as_ref()
        .expect("tensorcpu: add kernel invoked with no node")
        .as_any()
        .downcast_ref::<AddOp>()
        .expect("tensorcpu: add kernel invoked on non-AddOp node");
    assert_eq!(node.lhs.rows, node.rhs.rows, "tensorcpu: add shape mismatch");
    assert_eq!(node.lhs.cols, node.rhs.cols, "tensorcpu: add shape mismatch");
    let (start, end) = row_range(payload.thread_index, payload.thread_count, node.out.rows);
    for r in start..end {
        let lhs = node.lhs.row(r);
        let rhs = node.rhs.row(r);
        // SAFETY: [start, end) ranges are disjoint across workers.
        let out = unsafe { node.out.row_mut(r) };
        for ((o, a), b) in out.iter_mut().zip(lhs).zip(rhs) {
            *o = a + b;
        }
    }
}

fn matmul_kernel(payload: &ComputePayload) {
    let node = payload
        .node
        .as_ref()
        .expect("tensorcpu: matmul kernel invoked with no node")
        .as_any()
        .downcast_ref::<MatmulOp>()
        .expect("tensorcpu: matmul kernel invoked on non-MatmulOp node");
    assert_eq!(node.lhs.cols, node.rhs.rows, "tensorcpu: matmul inner dimension mismatch");
    let k = node.lhs.cols;
    let (start, end) = row_range(payload.thread_index, payload.thread_count, node.out.rows);
    for r in start..end {
        let lhs_row = node.lhs.row(r);
        // SAFETY: [start, end) ranges are disjoint across workers.
        let out_row = unsafe { node.out.row_mut(r) };
        out_row.fill(0.0);
        for (kk, &lv) in lhs_row.iter().enumerate().take(k) {
            if lv == 0.0 {
                continue;
            }
            let rhs_row = node.rhs.row(kk);
            for (o, rv) in out_row.iter_mut().zip(rhs_row) {
                *o += lv * rv;
            }
        }
    }
}

/// Install the portable fallback kernels for every operator-kind.
pub fn install(registry: &mut KernelRegistry) {
    registry.install(OpKind::FillRandom, fill_random_kernel);
    registry.install(OpKind::Add, add_kernel);
    registry.install(OpKind::Matmul, matmul_kernel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SystemAllocator;
    use crate::node::{OperatorNode, Tensor};
    use std::sync::Arc;

    fn alloc() -> Arc<dyn crate::context::HostAllocator> {
        Arc::new(SystemAllocator)
    }

    fn run_single_threaded(node: Arc<dyn OperatorNode>) {
        let payload = ComputePayload {
            node: Some(node),
            thread_index: 0,
            thread_count: 1,
        };
        let mut reg = KernelRegistry::new();
        install(&mut reg);
        reg.dispatch(&payload);
    }

    #[test]
    fn add_matches_naive_sum() {
        let lhs = Tensor::from_slice(alloc(), 2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let rhs = Tensor::from_slice(alloc(), 2, 2, &[10.0, 20.0, 30.0, 40.0]);
        let out = Tensor::zeros(alloc(), 2, 2);
        let node: Arc<dyn OperatorNode> = Arc::new(AddOp { lhs, rhs, out });
        run_single_threaded(node.clone());
        let add = node.as_any().downcast_ref::<AddOp>().unwrap();
        assert_eq!(add.out.to_vec(), vec![11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn matmul_identity_is_noop() {
        let lhs = Tensor::from_slice(alloc(), 2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let rhs = Tensor::from_slice(alloc(), 2, 2, &[5.0, 6.0, 7.0, 8.0]);
        let out = Tensor::zeros(alloc(), 2, 2);
        let node: Arc<dyn OperatorNode> = Arc::new(MatmulOp { lhs, rhs, out });
        run_single_threaded(node.clone());
        let mm = node.as_any().downcast_ref::<MatmulOp>().unwrap();
        assert_eq!(mm.out.to_vec(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn matmul_small_known_product() {
        // [1 2; 3 4] * [5 6; 7 8] = [19 22; 43 50]
        let lhs = Tensor::from_slice(alloc(), 2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let rhs = Tensor::from_slice(alloc(), 2, 2, &[5.0, 6.0, 7.0, 8.0]);
        let out = Tensor::zeros(alloc(), 2, 2);
        let node: Arc<dyn OperatorNode> = Arc::new(MatmulOp { lhs, rhs, out });
        run_single_threaded(node.clone());
        let mm = node.as_any().downcast_ref::<MatmulOp>().unwrap();
        assert_eq!(mm.out.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn fill_random_is_reproducible_for_same_seed() {
        let out1 = Tensor::zeros(alloc(), 4, 4);
        let node1: Arc<dyn OperatorNode> = Arc::new(FillRandomOp { seed: 42, out: out1 });
        run_single_threaded(node1.clone());

        let out2 = Tensor::zeros(alloc(), 4, 4);
        let node2: Arc<dyn OperatorNode> = Arc::new(FillRandomOp { seed: 42, out: out2 });
        run_single_threaded(node2.clone());

        let a = node1.as_any().downcast_ref::<FillRandomOp>().unwrap();
        let b = node2.as_any().downcast_ref::<FillRandomOp>().unwrap();
        assert_eq!(a.out.to_vec(), b.out.to_vec());
    }

    #[test]
    fn fill_random_stays_in_range() {
        let out = Tensor::zeros(alloc(), 8, 8);
        let node: Arc<dyn OperatorNode> = Arc::new(FillRandomOp { seed: 7, out });
        run_single_threaded(node.clone());
        let f = node.as_any().downcast_ref::<FillRandomOp>().unwrap();
        assert!(f.out.to_vec().iter().all(|&v| (-1.0..1.0).contains(&v)));
    }
}
