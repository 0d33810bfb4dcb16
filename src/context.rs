//! The library-wide context: CPU feature detection, core count, and the
//! allocator hook. Owned by the embedding tensor library; this crate only
//! ever reads it.

use std::alloc::{GlobalAlloc, Layout, System};
use std::fmt;
use std::sync::Arc;

/// One ISA feature tag recognized by the [`crate::isa`] gate.
///
/// Only the tags actually consulted by a shipped specialization tier are
/// listed; a production context would likely track a much larger set for
/// kernels outside this crate's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CpuFeature {
    Sse42,
    Avx,
    Avx2,
    Avx512f,
}

/// A small fixed set of [`CpuFeature`] tags, stored as a bitmask.
///
/// Four tags fit comfortably in a `u8`; this avoids pulling in a bitflags
/// crate for something this narrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuFeatureSet(u8);

impl CpuFeatureSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn insert(self, feat: CpuFeature) -> Self {
        Self(self.0 | (1 << feat as u8))
    }

    pub fn contains(&self, feat: CpuFeature) -> bool {
        self.0 & (1 << feat as u8) != 0
    }

    /// True if every feature in `required` is present in `self`.
    pub fn is_superset_of(&self, required: &[CpuFeature]) -> bool {
        required.iter().all(|f| self.contains(*f))
    }

    /// Detect the real host CPU's features at runtime.
    ///
    /// On non-x86-64 targets this always returns the empty set, which
    /// forces [`crate::isa::select`] onto the generic fallback installer.
    pub fn detect_host() -> Self {
        let mut set = Self::empty();
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "x86_64")] {
                if std::is_x86_feature_detected!("sse4.2") {
                    set = set.insert(CpuFeature::Sse42);
                }
                if std::is_x86_feature_detected!("avx") {
                    set = set.insert(CpuFeature::Avx);
                }
                if std::is_x86_feature_detected!("avx2") {
                    set = set.insert(CpuFeature::Avx2);
                }
                if std::is_x86_feature_detected!("avx512f") {
                    set = set.insert(CpuFeature::Avx512f);
                }
            }
        }
        set
    }
}

/// Capability hook for aligned host allocation, so storage buffers can be
/// redirected (e.g. to a tracking or fault-injecting allocator in tests)
/// without touching [`crate::storage`].
pub trait HostAllocator: Send + Sync {
    /// # Safety
    /// Same contract as [`std::alloc::GlobalAlloc::alloc`]: `layout` must
    /// have non-zero size, and the returned pointer (if non-null) must
    /// eventually be passed to `free` with the identical layout.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8;

    /// # Safety
    /// `ptr` must have been returned by a prior call to `alloc` on the
    /// same allocator with the identical `layout`.
    unsafe fn free(&self, ptr: *mut u8, layout: Layout);
}

/// The default allocator: the process's global allocator, used directly
/// with an explicit [`Layout`] rather than a hand-rolled page mapper —
/// storage buffers are tensor-sized, not page-granularity.
pub struct SystemAllocator;

impl HostAllocator for SystemAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { System.alloc(layout) }
    }

    unsafe fn free(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

/// Library-wide context consumed by the CPU backend.
#[derive(Clone)]
pub struct Context {
    pub cpu_features: CpuFeatureSet,
    pub cpu_virtual_cores: usize,
    pub cpu_name: String,
    pub allocator: Arc<dyn HostAllocator>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cpu_features", &self.cpu_features)
            .field("cpu_virtual_cores", &self.cpu_virtual_cores)
            .field("cpu_name", &self.cpu_name)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Probe the real host: detected ISA features, available parallelism,
    /// and the system allocator. This is what the rest of the library
    /// would construct in production; tests usually build a `Context`
    /// directly instead, to pin down ISA-gate behavior deterministically.
    pub fn probe() -> Self {
        let cpu_virtual_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            cpu_features: CpuFeatureSet::detect_host(),
            cpu_virtual_cores,
            cpu_name: probe_cpu_name(),
            allocator: Arc::new(SystemAllocator),
        }
    }
}

#[cfg(target_os = "linux")]
fn probe_cpu_name() -> String {
    std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|contents| {
            contents.lines().find_map(|line| {
                line.strip_prefix("model name")
                    .and_then(|rest| rest.split_once(':'))
                    .map(|(_, name)| name.trim().to_string())
            })
        })
        .unwrap_or_else(|| "unknown CPU".to_string())
}

#[cfg(not(target_os = "linux"))]
fn probe_cpu_name() -> String {
    "unknown CPU".to_string()
}
