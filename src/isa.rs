//! The ISA feature gate: orders candidate specializations best-to-worst,
//! picks the first whose required features are all present on the host,
//! and otherwise falls back to the generic installer. Feature detection
//! itself belongs to [`crate::context`], not this module.

use crate::context::{Context, CpuFeature};
use crate::kernel::KernelRegistry;
use crate::kernels::generic;

/// One candidate specialization: a name (for logging), the feature set it
/// requires, and the installer that wires its kernels into a registry.
pub struct Specialization {
    pub name: &'static str,
    pub required: &'static [CpuFeature],
    pub install: fn(&mut KernelRegistry),
}

#[cfg(target_arch = "x86_64")]
static SPECIALIZATIONS: &[Specialization] = {
    use crate::kernels::amd64;
    use CpuFeature::*;
    &[
        Specialization {
            name: "amd64_avx512f",
            required: &[Avx512f],
            install: amd64::install_avx512f,
        },
        Specialization {
            name: "amd64_avx2",
            required: &[Avx2],
            install: amd64::install_avx2,
        },
        Specialization {
            name: "amd64_avx",
            required: &[Avx],
            install: amd64::install_avx,
        },
        Specialization {
            name: "amd64_sse42",
            required: &[Sse42],
            install: amd64::install_sse42,
        },
    ]
};

#[cfg(not(target_arch = "x86_64"))]
static SPECIALIZATIONS: &[Specialization] = &[];

/// Outcome of [`select`]: which tier ended up installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Specialized(&'static str),
    Fallback,
}

/// Find the best specialization the host supports and install it;
/// otherwise install the generic fallback. Exactly one installer runs.
pub fn select(context: &Context, registry: &mut KernelRegistry) -> Selection {
    for spec in SPECIALIZATIONS {
        if spec.required.is_empty() {
            continue;
        }
        if context.cpu_features.is_superset_of(spec.required) {
            (spec.install)(registry);
            log::info!("tensorcpu: using CPU specialization: {}", spec.name);
            return Selection::Specialized(spec.name);
        }
    }
    generic::install(registry);
    log::info!("tensorcpu: no matching CPU specialization, using generic fallback");
    Selection::Fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CpuFeatureSet, SystemAllocator};
    use crate::node::OpKind;
    use std::sync::Arc;

    fn ctx_with(features: CpuFeatureSet) -> Context {
        Context {
            cpu_features: features,
            cpu_virtual_cores: 1,
            cpu_name: "test-cpu".to_string(),
            allocator: Arc::new(SystemAllocator),
        }
    }

    #[test]
    fn no_features_falls_back_to_generic() {
        let ctx = ctx_with(CpuFeatureSet::empty());
        let mut reg = KernelRegistry::new();
        let selection = select(&ctx, &mut reg);
        assert_eq!(selection, Selection::Fallback);
        assert!(reg.get(OpKind::Matmul).is_some());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn best_available_tier_is_selected() {
        let ctx = ctx_with(CpuFeatureSet::empty().insert(CpuFeature::Sse42).insert(CpuFeature::Avx2));
        let mut reg = KernelRegistry::new();
        let selection = select(&ctx, &mut reg);
        // AVX2 outranks SSE4.2 in the declared best->worst order.
        assert_eq!(selection, Selection::Specialized("amd64_avx2"));
    }

    #[test]
    fn selection_always_populates_matmul() {
        for features in [
            CpuFeatureSet::empty(),
            CpuFeatureSet::empty().insert(CpuFeature::Sse42),
        ] {
            let ctx = ctx_with(features);
            let mut reg = KernelRegistry::new();
            select(&ctx, &mut reg);
            assert!(reg.get(OpKind::Matmul).is_some());
            assert!(reg.get(OpKind::Add).is_some());
            assert!(reg.get(OpKind::FillRandom).is_some());
        }
    }
}
