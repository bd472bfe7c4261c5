//! # Parallelism Utilities (CPU Threading)
//!
//! Small helpers over `rayon` for running independent, fallible jobs.

use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};

/// Applies `f` to every item in parallel and collects the results in
/// input order. Stops at the first error.
pub fn try_par_map<T, U, E, F>(items: &[T], f: F) -> Result<Vec<U>, E>
where
    T: Sync,
    U: Send,
    E: Send,
    F: Fn(&T) -> Result<U, E> + Sync + Send,
{
    items.par_iter().map(f).collect()
}

/// Runs `op` on a dedicated pool of `jobs` threads, or on the global pool
/// when `jobs` is `None`.
pub fn with_threads<R, OP>(jobs: Option<usize>, op: OP) -> Result<R, ThreadPoolBuildError>
where
    R: Send,
    OP: FnOnce() -> R + Send,
{
    match jobs {
        None => Ok(op()),
        Some(n) => {
            debug!("Using a pool of {} threads", n);
            let pool = ThreadPoolBuilder::new().num_threads(n).build()?;
            Ok(pool.install(op))
        }
    }
}
