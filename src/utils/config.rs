//! Application configuration constants.
//! Tuning and defaults in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    config_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                config_filename: format!(".{pkg}.toml"),
                env_prefix: pkg.to_uppercase(),
            }
        })
    }

    /// Config file looked up in the working directory (e.g. `.parbatch.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Environment variable name for a setting, e.g. `env_var("WORKERS")` → `PARBATCH_WORKERS`.
    pub fn env_var(&self, key: &str) -> String {
        format!("{}_{}", self.env_prefix, key)
    }
}

// ---- Batching ----

/// Batch size when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

// ---- Worker pool ----

/// Worker pool sizing.
pub struct PoolConsts;

impl PoolConsts {
    /// Submission queue slots per worker thread when no capacity is given.
    pub const QUEUE_SLOTS_PER_THREAD: usize = 2;
    /// Report channel slots per worker thread. Workers block on a full report channel until the combiner drains it.
    pub const REPORT_SLOTS_PER_THREAD: usize = 4;
}

/// Sentinel for "no short-circuit decision yet" in the dispatch cutoff.
pub const NO_CUTOFF: usize = usize::MAX;
