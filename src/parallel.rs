//! Parallel processing configuration
//!
//! Sizes Rayon's global thread pool once per process. Every lane reduction and
//! the per-dataset loop run on that pool.

use crate::errors::{ClimVarError, Result};
use rayon::ThreadPoolBuilder;

/// Configuration for parallel processing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    #[must_use]
    pub const fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// A configuration that uses every available CPU core
    #[must_use]
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Set up the global Rayon thread pool.
    ///
    /// Without an explicit thread count Rayon's default sizing is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::ThreadPool`] for a zero thread count or when the
    /// global pool was already initialised.
    pub fn setup_global_pool(&self) -> Result<()> {
        let Some(num_threads) = self.num_threads else {
            log::debug!("Using default thread pool ({} threads)", rayon::current_num_threads());
            return Ok(());
        };
        if num_threads == 0 {
            return Err(ClimVarError::ThreadPool(
                "thread count must be at least 1".to_string(),
            ));
        }

        ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                ClimVarError::ThreadPool(format!(
                    "failed to initialize thread pool with {num_threads} threads: {e}"
                ))
            })?;
        log::info!("Configured parallel processing with {num_threads} threads");
        Ok(())
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone, Copy)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
}

impl ParallelInfo {
    /// Snapshot of the current pool and machine
    #[must_use]
    pub fn current() -> Self {
        Self {
            current_threads: rayon::current_num_threads(),
            available_cores: num_cpus::get(),
        }
    }

    pub fn log(&self) {
        log::debug!(
            "Parallel processing: {} threads on {} available cores",
            self.current_threads,
            self.available_cores
        );
    }
}
