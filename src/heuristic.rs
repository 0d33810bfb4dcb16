//! The dynamic width heuristic: maps an output element count to an
//! active worker count. Logarithmic growth past a threshold, so wake-up
//! overhead doesn't dominate small kernels and very large ones don't
//! over-subscribe machines with many cores.

/// Default element-count threshold below which only one worker is used.
pub const DEFAULT_NUMEL_THRESHOLD: usize = 250_000;

/// Default logarithmic growth-scale factor.
pub const DEFAULT_GROWTH_SCALE: f64 = 0.3;

/// Tunable parameters for the heuristic, stored on the device rather than
/// hard-coded, since the right growth rate and cutover point are
/// workload- and machine-dependent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicParams {
    pub growth_scale: f64,
    pub numel_threshold: usize,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            growth_scale: DEFAULT_GROWTH_SCALE,
            numel_threshold: DEFAULT_NUMEL_THRESHOLD,
        }
    }
}

/// Compute the active worker count for `numel` output elements, given
/// `allocated_workers` (the pool's fixed size, 0 meaning no pool).
pub fn active_workers(numel: usize, allocated_workers: usize, params: &HeuristicParams) -> usize {
    if allocated_workers == 0 || numel < params.numel_threshold {
        return 1;
    }
    let over = (numel - params.numel_threshold) as f64;
    if over <= 0.0 {
        return 1; // only reachable when threshold == 0 and numel == 0
    }
    let raw = (params.growth_scale * over.log2()).ceil();
    if !raw.is_finite() {
        return 1;
    }
    let workers = raw as i64;
    workers.clamp(1, allocated_workers as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HeuristicParams {
        HeuristicParams::default()
    }

    #[test]
    fn below_threshold_is_single_worker() {
        let p = params();
        assert_eq!(active_workers(0, 8, &p), 1);
        assert_eq!(active_workers(p.numel_threshold - 1, 8, &p), 1);
    }

    #[test]
    fn at_threshold_is_single_worker() {
        // numel - threshold == 0, log2(0) would be undefined; must guard.
        let p = params();
        assert_eq!(active_workers(p.numel_threshold, 8, &p), 1);
    }

    #[test]
    fn no_pool_is_always_single_worker() {
        let p = params();
        assert_eq!(active_workers(10_000_000, 0, &p), 1);
    }

    #[test]
    fn grows_slowly_past_threshold() {
        let p = params();
        let at_1m = active_workers(1_000_000, 64, &p);
        let at_10m = active_workers(10_000_000, 64, &p);
        assert!(at_1m >= 1 && at_1m <= 64);
        assert!(at_10m >= at_1m);
    }

    #[test]
    fn clamps_to_allocated_workers() {
        let p = params();
        let workers = active_workers(usize::MAX / 2, 4, &p);
        assert_eq!(workers, 4);
    }

    #[test]
    fn monotonic_non_decreasing_past_threshold() {
        let p = params();
        let mut prev = active_workers(p.numel_threshold, 64, &p);
        let mut numel = p.numel_threshold;
        for _ in 0..20 {
            numel += 500_000;
            let cur = active_workers(numel, 64, &p);
            assert!(cur >= prev, "not monotonic at numel={numel}: {cur} < {prev}");
            prev = cur;
        }
    }

    #[test]
    fn always_within_bounds() {
        let p = params();
        for numel in [0usize, 1, 249_999, 250_000, 250_001, 1_000_000, 50_000_000, usize::MAX] {
            for n in [1usize, 2, 8, 64] {
                let w = active_workers(numel, n, &p);
                assert!((1..=n).contains(&w), "numel={numel} n={n} w={w}");
            }
        }
    }
}
