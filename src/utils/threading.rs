//! # Threading Configuration
//!
//! ## Role
//! Build the rayon pool that runs chromosome workers. The pool is local to a
//! build rather than the global pool, so a library caller can run several
//! builds with different worker counts.

use crate::error::{Result, SnpBinsError};

/// Worker count when none is configured
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Create a configured thread pool.
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .thread_name(|i| format!("snpbins-worker-{}", i))
        .build()
        .map_err(|e| SnpBinsError::config(format!("Failed to create thread pool: {}", e)))
}
