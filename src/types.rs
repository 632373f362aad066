//! Public and internal types for the parbatch API and pipeline.

use serde::Serialize;

use crate::pipeline::dispatch::WorkerPool;
use crate::utils::config::DEFAULT_BATCH_SIZE;

/// How partial results of container-producing operations are merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Append each batch's partial container as soon as it arrives. Cross-batch order is arrival order.
    #[default]
    CombineOne,
    /// Hold every partial until all batches have reported, then fold them in batch-index order.
    CombineAll,
}

impl MergePolicy {
    pub fn from_combine_one(combine_one: bool) -> Self {
        if combine_one {
            MergePolicy::CombineOne
        } else {
            MergePolicy::CombineAll
        }
    }
}

/// Lib options for [`par_iter`](crate::par_iter). Immutable for the duration of one terminal call.
#[derive(Clone, Debug)]
pub struct Config {
    /// Elements per batch. Must be positive; checked before any dispatch.
    pub batch_size: usize,
    /// Worker pool handle (thread count and submission queue capacity).
    pub pool: WorkerPool,
    /// Merge policy for container results: true → [`MergePolicy::CombineOne`].
    pub combine_one: bool,
    /// De-duplicate source elements across all batches (only honored by [`par_iter`](crate::par_iter)).
    pub distinct: bool,
    /// Show a batch-completion progress bar.
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pool: WorkerPool::default(),
            combine_one: true,
            distinct: false,
            progress: false,
        }
    }
}

impl Config {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_combine_one(mut self, combine_one: bool) -> Self {
        self.combine_one = combine_one;
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy::from_combine_one(self.combine_one)
    }
}

/// What happened to the batches of one terminal operation.
///
/// `submitted + skipped == total_batches`, and every submitted batch is counted once in
/// `completed`, `discarded` or `failed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub total_batches: usize,
    pub submitted: usize,
    /// Not submitted because a short-circuit decision was already recorded.
    pub skipped: usize,
    /// Reported successfully and merged into the result.
    pub completed: usize,
    /// Reported after a decision and dropped.
    pub discarded: usize,
    pub failed: usize,
}

/// Full options (CLI). Use [`Config`] for lib.
#[derive(Clone, Debug, Default)]
pub struct Opts {
    pub batch_size: Option<usize>,
    pub num_threads: Option<usize>,
    pub queue_cap: Option<usize>,
    /// Fold container partials in batch order instead of appending on arrival.
    pub combine_all: bool,
    pub distinct: bool,
    /// Debug logging and progress bar.
    pub verbose: bool,
    /// Print results as JSON.
    pub json: bool,
}

impl From<&Opts> for Config {
    fn from(o: &Opts) -> Self {
        let pool = WorkerPool::with_threads(o.num_threads.unwrap_or_else(WorkerPool::default_threads));
        let pool = match o.queue_cap {
            Some(cap) => pool.with_queue_cap(cap),
            None => pool,
        };
        Config {
            batch_size: o.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            pool,
            combine_one: !o.combine_all,
            distinct: o.distinct,
            progress: o.verbose,
        }
    }
}
