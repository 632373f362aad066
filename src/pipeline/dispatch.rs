//! Worker pool dispatcher: a feeder thread submits batches in index order into a bounded queue,
//! pool workers run the instantiated chain over each batch, and reports stream back to the
//! calling thread.

use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, Scope, ScopedJoinHandle};

use crate::Result;
use crate::engine::combiner::BatchProcedure;
use crate::error::{ElementProcessingError, EngineError};
use crate::utils::config::PoolConsts;

use super::chain::{Flow, Stage};
use super::context::{BatchReport, Cutoff, DispatchChannels, FeedOutcome, create_dispatch_channels};
use super::split::{Batch, BatchSplitter};

/// Handle to a bounded worker pool: how many workers run batches and how many submitted batches
/// may wait in the queue before the feeder blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerPool {
    num_threads: usize,
    queue_cap: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::with_threads(Self::default_threads())
    }
}

impl WorkerPool {
    /// Available parallelism as seen by rayon's global pool.
    pub fn default_threads() -> usize {
        rayon::current_num_threads()
    }

    /// Pool of `num_threads` workers with the default queue capacity for that size.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            queue_cap: num_threads.saturating_mul(PoolConsts::QUEUE_SLOTS_PER_THREAD),
        }
    }

    pub fn with_queue_cap(mut self, queue_cap: usize) -> Self {
        self.queue_cap = queue_cap;
        self
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn queue_cap(&self) -> usize {
        self.queue_cap
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(EngineError::invalid("worker pool needs at least one thread"));
        }
        if self.queue_cap == 0 {
            return Err(EngineError::invalid("worker pool queue capacity must be positive"));
        }
        Ok(())
    }
}

/// Run `stage` then `procedure` over every element of `batch`. Stops at the first failing element
/// (error or panic) and reports it with its source offset; the partial is dropped in that case.
pub fn run_batch<S, T, B>(batch: Batch<'_, S>, stage: &Stage<S, T>, procedure: &B) -> BatchReport<B::Partial>
where
    B: BatchProcedure<T>,
{
    let mut offset = batch.offset;
    let run = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<B::Partial> {
        let mut partial = procedure.new_partial();
        for (i, item) in batch.items.iter().enumerate() {
            offset = batch.offset + i;
            let flow = stage(item, &mut |t: T| procedure.accept(&mut partial, t))?;
            if flow == Flow::Stop {
                break;
            }
        }
        Ok(partial)
    }));
    let outcome = match run {
        Ok(Ok(partial)) => Ok(partial),
        Ok(Err(cause)) => Err(ElementProcessingError::new(batch.index, offset, cause)),
        Err(payload) => Err(ElementProcessingError::from_panic(batch.index, offset, payload)),
    };
    BatchReport {
        index: batch.index,
        offset: batch.offset,
        len: batch.len(),
        outcome,
    }
}

/// Single batch worker: receive batches until the queue closes, report each one.
fn batch_worker_loop<S, T, B>(
    batch_rx: Receiver<Batch<'_, S>>,
    report_tx: Sender<BatchReport<B::Partial>>,
    stage: &Stage<S, T>,
    procedure: &B,
) where
    B: BatchProcedure<T>,
{
    while let Ok(batch) = batch_rx.recv() {
        let report = run_batch(batch, stage, procedure);
        if report_tx.send(report).is_err() {
            break;
        }
    }
}

/// Spawn `num_threads` scoped batch workers. Caller must drop its own `report_tx` afterwards so
/// the report channel closes once every worker exits.
pub fn spawn_batch_workers<'scope, 'env, 'a, S, T, B>(
    scope: &'scope Scope<'scope, 'env>,
    batch_rx: Receiver<Batch<'a, S>>,
    report_tx: &Sender<BatchReport<B::Partial>>,
    stage: &'env Stage<S, T>,
    procedure: &'env B,
    num_threads: usize,
) -> Vec<ScopedJoinHandle<'scope, ()>>
where
    'a: 'env,
    S: Sync + 'a,
    T: 'scope,
    B: BatchProcedure<T>,
    B::Partial: 'scope,
{
    (0..num_threads)
        .map(|_| {
            let batch_rx = batch_rx.clone();
            let report_tx = report_tx.clone();
            scope.spawn(move || batch_worker_loop(batch_rx, report_tx, stage, procedure))
        })
        .collect()
}

/// Submit batches in index order until the splitter is exhausted or a decision makes the rest
/// pointless. Blocks while the queue is full. Drops `batch_tx` when done so workers drain and exit.
pub fn run_feed_loop<'a, S>(
    splitter: BatchSplitter<'a, S>,
    batch_tx: Sender<Batch<'a, S>>,
    cutoff: &Cutoff,
) -> FeedOutcome {
    let total = splitter.batch_count();
    let mut submitted = 0_usize;
    for batch in splitter {
        if cutoff.excludes(batch.index) {
            break;
        }
        if batch_tx.send(batch).is_err() {
            break;
        }
        submitted += 1;
    }
    drop(batch_tx);
    FeedOutcome {
        submitted,
        skipped: total - submitted,
    }
}

/// Dispatch every batch of `splitter` to the pool and hand each report to `on_report` on the
/// calling thread, in completion order. `on_report` may lower `cutoff` to stop further submission.
/// Returns after every submitted batch has reported and all pool threads have exited.
pub fn dispatch<S, T, B, F>(
    splitter: BatchSplitter<'_, S>,
    pool: &WorkerPool,
    stage: &Stage<S, T>,
    procedure: &B,
    cutoff: &Cutoff,
    mut on_report: F,
) -> FeedOutcome
where
    S: Sync,
    B: BatchProcedure<T>,
    F: FnMut(BatchReport<B::Partial>),
{
    let DispatchChannels {
        batch_tx,
        batch_rx,
        report_tx,
        report_rx,
    } = create_dispatch_channels::<S, B::Partial>(pool);
    debug!(
        "dispatching {} batches of up to {} on {} workers (queue {})",
        splitter.batch_count(),
        splitter.batch_size(),
        pool.num_threads(),
        pool.queue_cap()
    );

    thread::scope(|scope| {
        let feeder = scope.spawn(move || run_feed_loop(splitter, batch_tx, cutoff));

        let workers = spawn_batch_workers(scope, batch_rx, &report_tx, stage, procedure, pool.num_threads());

        // Dropping the last sender closes the channel once workers exit.
        drop(report_tx);

        // Owned by the scope closure so a panicking `on_report` drops it while unwinding. Workers
        // then fail their next send and exit, which closes the queue under the feeder.
        let report_rx = report_rx;
        while let Ok(report) = report_rx.recv() {
            on_report(report);
        }

        let fed = match feeder.join() {
            Ok(fed) => fed,
            Err(payload) => panic::resume_unwind(payload),
        };
        for h in workers {
            let _ = h.join();
        }
        debug!(
            "feeder done: {} submitted, {} skipped",
            fed.submitted, fed.skipped
        );
        fed
    })
}
