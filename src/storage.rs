//! Host-memory storage buffer: an aligned allocation plus a small set of
//! copy/fill operations used by tensors. The CPU backend's "host →
//! device" and "device → host" directions are both ordinary memory
//! copies; the abstraction exists so other backends can differ without
//! changing call sites.

use std::alloc::Layout;
use std::sync::Arc;

use crate::context::HostAllocator;
use crate::error;

/// Fixed alignment used for every storage buffer.
pub const ALIGNMENT: usize = 16;

/// An aligned host allocation owned by a CPU device.
///
/// Dropping a `StorageBuffer` without calling [`StorageBuffer::free`] first
/// leaks the allocation rather than double-freeing it on an unknown
/// allocator; callers are expected to free explicitly.
pub struct StorageBuffer {
    base: *mut u8,
    size: usize,
    alignment: usize,
    allocator: Arc<dyn HostAllocator>,
}

// SAFETY: the buffer is a plain byte region; synchronization of concurrent
// access is the kernel contract's job, not this type's.
unsafe impl Send for StorageBuffer {}
unsafe impl Sync for StorageBuffer {}

impl StorageBuffer {
    /// Allocate `size` bytes aligned to [`ALIGNMENT`]. Infallible by
    /// contract: either the allocator succeeds or it aborts through its
    /// own OOM handling.
    pub fn alloc(allocator: Arc<dyn HostAllocator>, size: usize) -> Self {
        assert!(size > 0, "tensorcpu: storage alloc of size 0");
        let layout = Layout::from_size_align(size, ALIGNMENT)
            .expect("tensorcpu: invalid storage layout");
        let base = unsafe { allocator.alloc(layout) };
        assert!(!base.is_null(), "tensorcpu: host allocation failed");
        Self {
            base,
            size,
            alignment: ALIGNMENT,
            allocator,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.base
    }

    /// Fill `[offset, size)` with `byte`.
    ///
    /// Note the contract: the fill always runs to the end of the buffer.
    /// It does *not* take a caller-supplied length, so `set(buf, k, b)`
    /// zeroes exactly the tail `[k, size)`, never an arbitrary sub-range.
    pub fn set(&self, offset: usize, byte: u8) {
        error::assert_bounds(offset <= self.size, "set", offset, 0, self.size);
        let len = self.size - offset;
        unsafe {
            std::ptr::write_bytes(self.base.add(offset), byte, len);
        }
    }

    /// Copy `n` bytes from `src` into `[offset, offset+n)`.
    pub fn copy_in(&self, offset: usize, src: &[u8]) {
        let n = src.len();
        error::assert_bounds(offset + n <= self.size, "copy_in", offset, n, self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.base.add(offset), n);
        }
    }

    /// Copy `n` bytes from `[offset, offset+n)` into `dst`.
    pub fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        let n = dst.len();
        error::assert_bounds(offset + n <= self.size, "copy_out", offset, n, self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.add(offset), dst.as_mut_ptr(), n);
        }
    }

    /// Release the allocation. The buffer is left empty (base null, size
    /// 0) so a stray use-after-free trips the bounds assertion instead of
    /// silently touching freed memory.
    pub fn free(&mut self) {
        if self.base.is_null() {
            return;
        }
        let layout = Layout::from_size_align(self.size, self.alignment)
            .expect("tensorcpu: invalid storage layout");
        unsafe {
            self.allocator.free(self.base, layout);
        }
        self.base = std::ptr::null_mut();
        self.size = 0;
    }
}

impl Drop for StorageBuffer {
    fn drop(&mut self) {
        self.free();
    }
}
