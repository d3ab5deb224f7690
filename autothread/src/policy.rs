//! Sizing equations shared by the pool and the registry.
//!
//! `hc` is the hardware concurrency (logical processors available), `cw` the
//! current number of workers in the pool.

/// Number of logical processors available to this process.
pub fn hardware_concurrency() -> usize {
    num_cpus::get()
}

/// `k · hc · (1 − e^(−hc/cw))`.
///
/// Grows sub-linearly with `hc` as `cw` grows. An empty pool (`cw = 0`)
/// yields the asymptote `k · hc`.
pub fn sublinear_exponential(k: f64, hc: usize, cw: usize) -> f64 {
    let hc = hc as f64;
    let cw = cw as f64;
    k * hc * (1.0 - (-hc / cw).exp())
}

/// Default optimal number of in-flight tasks per worker (`k = 0.8`).
pub fn optimal_tasks_per_worker(hc: usize, cw: usize) -> usize {
    sublinear_exponential(0.8, hc, cw).floor() as usize
}

/// Default upper bound on the number of workers.
pub fn max_pool_size(hc: usize) -> usize {
    hc
}

/// Default lower bound the pool never shrinks below.
pub fn min_pool_size(hc: usize) -> usize {
    (hc as f64 * 0.3).floor() as usize
}

/// Default capacity of a standalone registry: `floor(hc^1.10) + (5·hc − 1)`.
///
/// Super-linear in `hc` so bursts larger than the pool can be admitted.
pub fn registry_capacity(hc: usize) -> usize {
    let hc_f = hc as f64;
    hc_f.powf(1.10).floor() as usize + (hc * 5).saturating_sub(1)
}

/// Default capacity of the registry a pool creates for itself.
pub fn pool_registry_capacity(hc: usize) -> usize {
    (sublinear_exponential(1.0, hc, hc) * hc as f64).floor() as usize
}
