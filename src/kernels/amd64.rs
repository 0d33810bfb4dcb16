//! x86-64 specialization tiers. Each tier's installer wires the *same*
//! scalar kernels from [`super::generic`] into the registry — this crate
//! doesn't ship hand-vectorized per-ISA math, only the runtime selection
//! mechanism a real math library would plug real SIMD kernels into at
//! exactly these seams.

use crate::kernel::KernelRegistry;

pub fn install_sse42(registry: &mut KernelRegistry) {
    super::generic::install(registry);
}

pub fn install_avx(registry: &mut KernelRegistry) {
    super::generic::install(registry);
}

pub fn install_avx2(registry: &mut KernelRegistry) {
    super::generic::install(registry);
}

pub fn install_avx512f(registry: &mut KernelRegistry) {
    super::generic::install(registry);
}
