//! Reference math kernels: `fill_random`, `add`, `matmul`. Every tier's
//! installer ([`generic`], [`amd64`]) wires the *same* numerical routines
//! into the registry — this crate does not ship hand-tuned per-ISA
//! kernels, only the dispatch mechanism that would select between them in
//! production.

pub mod generic;

#[cfg(target_arch = "x86_64")]
pub mod amd64;

/// Split `total_rows` into `thread_count` contiguous, non-overlapping
/// ranges and return the one owned by `thread_index`. Workers with
/// `thread_index >= total_rows` get an empty range, which is valid: they
/// contribute nothing and that's cheap.
pub(crate) fn row_range(thread_index: usize, thread_count: usize, total_rows: usize) -> (usize, usize) {
    let thread_count = thread_count.max(1);
    let rows_per_worker = total_rows.div_ceil(thread_count);
    let start = (thread_index * rows_per_worker).min(total_rows);
    let end = (start + rows_per_worker).min(total_rows);
    (start, end)
}
