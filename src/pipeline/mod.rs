//! Pipeline components: splitter, dedup registry, operation chain, dispatch context and workers.

pub mod chain;
pub mod context;
pub mod dedup;
pub mod dispatch;
pub mod split;

pub use chain::{Flow, OpChain, Stage, StepResult};
pub use context::{BatchReport, Cutoff, DispatchChannels, FeedOutcome, create_dispatch_channels};
pub use dedup::DedupRegistry;
pub use dispatch::{WorkerPool, dispatch, run_batch, run_feed_loop, spawn_batch_workers};
pub use split::{Batch, BatchSplitter, Splittable, validate_batch_size};
