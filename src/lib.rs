//! Parbatch: batch-parallel lazy evaluation over in-memory collections.
//!
//! A source slice is split into fixed-size batches; each batch runs a lazy chain of
//! filter/map/flat-map/distinct steps on a bounded worker pool, and the per-batch partial results
//! are merged on the calling thread into one final value.
//!
//! ```ignore
//! let data: Vec<i64> = (1..=1_000).collect();
//! let config = parbatch::Config::default().with_batch_size(64);
//! let evens = parbatch::par_iter(&data, config)
//!     .select(|x| x % 2 == 0)
//!     .collect(|x| x * x)
//!     .count()?;
//! ```

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use engine::facade::ParallelIterable;
pub use error::{ElementProcessingError, EngineError};
pub use pipeline::WorkerPool;

use log::debug;
use std::hash::Hash;

/// Result alias used by the public parbatch API.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Entry point: a lazy parallel view of `source` under `config`.
///
/// When `config.distinct` is set the view starts with a global de-duplication step, so every
/// later step and terminal sees each distinct value once. Nothing runs until a terminal
/// operation is called.
pub fn par_iter<S>(source: &[S], config: Config) -> ParallelIterable<'_, S, S>
where
    S: Eq + Hash + Clone + Send + Sync + 'static,
{
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        config
    );
    let distinct = config.distinct;
    let view = ParallelIterable::new(source, config);
    if distinct { view.distinct() } else { view }
}
