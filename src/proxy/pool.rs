//! Worker pool sizing for concurrent probe dispatch

/// Base multiplier for the logarithmic sizing curve
pub const BASE_WORKERS: usize = 8;

/// Upper bound for connectivity check workers
pub const MAX_CONNECTIVITY_WORKERS: usize = 64;

/// Upper bound for geo lookup workers; lookup providers rate-limit
/// aggressively, so this cap is lower than the connectivity one
pub const MAX_GEO_WORKERS: usize = 32;

/// Compute the worker count for a batch of `count` independent jobs.
///
/// Grows with `base * log2(count + 1)`, clamped to `[1, min(max_cap, count)]`.
/// Logarithmic growth keeps small batches responsive without
/// oversubscribing on large ones.
pub fn optimal_workers(count: usize, base: usize, max_cap: usize) -> usize {
    if count == 0 {
        return 1;
    }
    let calculated = base as f64 * ((count + 1) as f64).log2();
    let rounded = calculated.round() as usize;
    let upper = max_cap.min(count).max(1);
    rounded.clamp(1, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_jobs_gets_one_worker() {
        assert_eq!(optimal_workers(0, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS), 1);
    }

    #[test]
    fn test_never_exceeds_job_count() {
        assert_eq!(optimal_workers(1, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS), 1);
        assert_eq!(optimal_workers(5, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS), 5);
        assert_eq!(optimal_workers(10, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS), 10);
    }

    #[test]
    fn test_logarithmic_growth_mid_range() {
        // 8 * log2(101) ~= 53.3
        assert_eq!(optimal_workers(100, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS), 53);
    }

    #[test]
    fn test_caps_apply() {
        assert_eq!(
            optimal_workers(1000, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS),
            MAX_CONNECTIVITY_WORKERS
        );
        assert_eq!(optimal_workers(1000, BASE_WORKERS, MAX_GEO_WORKERS), MAX_GEO_WORKERS);
    }

    #[test]
    fn test_non_decreasing_in_count() {
        let mut previous = 0;
        for n in 0..2000 {
            let workers = optimal_workers(n, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS);
            assert!(workers >= 1);
            assert!(workers <= MAX_CONNECTIVITY_WORKERS.min(n.max(1)));
            assert!(workers >= previous);
            previous = workers;
        }
    }
}
