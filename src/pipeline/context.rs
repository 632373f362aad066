//! Dispatch context: the channels and shared cutoff passed between the feeder, the workers and
//! the combining thread.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ElementProcessingError;
use crate::utils::config::{NO_CUTOFF, PoolConsts};

use super::dispatch::WorkerPool;
use super::split::Batch;

/// What one worker reports for one batch.
pub struct BatchReport<P> {
    pub index: usize,
    /// Source position of the batch's first element.
    pub offset: usize,
    /// Number of source elements in the batch.
    pub len: usize,
    pub outcome: std::result::Result<P, ElementProcessingError>,
}

/// Counts returned by the feeder once it stops submitting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    pub submitted: usize,
    pub skipped: usize,
}

/// Highest batch index still worth submitting. Starts at [`NO_CUTOFF`]; the combining thread
/// lowers it when a short-circuit decision is recorded.
#[derive(Debug)]
pub struct Cutoff(AtomicUsize);

impl Default for Cutoff {
    fn default() -> Self {
        Self(AtomicUsize::new(NO_CUTOFF))
    }
}

impl Cutoff {
    /// Lower the cutoff to `batch` (never raises it).
    pub fn decide(&self, batch: usize) {
        self.0.fetch_min(batch, Ordering::AcqRel);
    }

    pub fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            NO_CUTOFF => None,
            b => Some(b),
        }
    }

    /// True when a decision at a lower index makes `batch` pointless.
    pub fn excludes(&self, batch: usize) -> bool {
        batch > self.0.load(Ordering::Acquire)
    }
}

/// Channels for one dispatch. The feeder gets `batch_tx`; workers get `batch_rx` and `report_tx`;
/// the combining thread keeps `report_rx`.
pub struct DispatchChannels<'a, S, P> {
    pub batch_tx: Sender<Batch<'a, S>>,
    pub batch_rx: Receiver<Batch<'a, S>>,
    pub report_tx: Sender<BatchReport<P>>,
    pub report_rx: Receiver<BatchReport<P>>,
}

/// Bounded submission queue (`queue_cap`) gives the feeder backpressure; the report channel is
/// sized per worker so workers rarely wait on the combiner.
pub fn create_dispatch_channels<'a, S, P>(pool: &WorkerPool) -> DispatchChannels<'a, S, P> {
    let (batch_tx, batch_rx) = bounded::<Batch<'a, S>>(pool.queue_cap());
    let (report_tx, report_rx) =
        bounded::<BatchReport<P>>(pool.num_threads() * PoolConsts::REPORT_SLOTS_PER_THREAD);
    DispatchChannels {
        batch_tx,
        batch_rx,
        report_tx,
        report_rx,
    }
}
