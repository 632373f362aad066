//! Operation driver: runs one terminal call through
//! `Idle → Splitting → Dispatching → Combining → {Completed | Failed}`.

use log::{debug, warn};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::error::{ElementProcessingError, EngineError};
use crate::pipeline::{BatchReport, Cutoff, OpChain, Splittable, dispatch};
use crate::types::DispatchStats;
use crate::{Config, Result};

use super::combiner::{BatchProcedure, Combinable, ShortCircuitable};
use super::progress::BatchProgress;

/// Lifecycle of one terminal call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Splitting,
    Dispatching,
    Combining,
    Completed,
    Failed,
}

impl OperationState {
    /// Legal forward moves. Any non-terminal state may fail.
    pub fn can_advance_to(self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Idle, Splitting)
                | (Splitting, Dispatching)
                | (Dispatching, Combining)
                | (Dispatching, Completed)
                | (Combining, Completed)
                | (Idle | Splitting | Dispatching | Combining, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Idle => "idle",
            OperationState::Splitting => "splitting",
            OperationState::Dispatching => "dispatching",
            OperationState::Combining => "combining",
            OperationState::Completed => "completed",
            OperationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State tracker for one call; logs every transition at debug level.
#[derive(Debug)]
pub struct Operation {
    name: &'static str,
    state: OperationState,
    started: Instant,
}

impl Operation {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: OperationState::Idle,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn advance(&mut self, next: OperationState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{}: illegal transition {} -> {}",
            self.name,
            self.state,
            next
        );
        debug!(
            "{}: {} -> {} ({:?})",
            self.name,
            self.state,
            next,
            self.started.elapsed()
        );
        self.state = next;
    }

    /// Move to `Failed` and hand back `err` for returning.
    pub fn fail(&mut self, err: EngineError) -> EngineError {
        self.advance(OperationState::Failed);
        err
    }
}

/// Per-call bookkeeping fed by batch reports on the combining thread.
struct ReportSink<'p, C> {
    combiner: C,
    stats: DispatchStats,
    first_error: Option<ElementProcessingError>,
    /// Set when the combiner itself panicked; its state is unusable from then on.
    combine_panic: Option<ElementProcessingError>,
    progress: &'p mut BatchProgress,
}

impl<C> ReportSink<'_, C> {
    /// Keep only the failure with the lowest batch index.
    fn record_failure(&mut self, err: ElementProcessingError) {
        self.stats.failed += 1;
        debug!("batch {} failed: {}", err.batch, err);
        if self
            .first_error
            .as_ref()
            .is_none_or(|first| err.batch < first.batch)
        {
            self.first_error = Some(err);
        }
    }

    fn on_report<P>(&mut self, report: BatchReport<P>, cutoff: &Cutoff)
    where
        C: Combinable<P> + ShortCircuitable,
    {
        self.progress.batch_done();
        if self.combine_panic.is_some() {
            self.stats.discarded += 1;
            return;
        }
        let partial = match report.outcome {
            Ok(partial) => partial,
            Err(err) => return self.record_failure(err),
        };
        // After a decision only lower-index batches can still change the answer.
        if let Some(decided) = self.combiner.decision()
            && report.index > decided
        {
            self.stats.discarded += 1;
            return;
        }
        let combiner = &mut self.combiner;
        let index = report.index;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| combiner.combine(index, partial))) {
            let err = ElementProcessingError::from_panic(index, report.offset, payload);
            debug!("combining batch {} panicked: {}", index, err);
            self.stats.failed += 1;
            self.combine_panic = Some(err);
            // Nothing submitted from now on can be combined.
            cutoff.decide(0);
            return;
        }
        self.stats.completed += 1;
        if let Some(decided) = self.combiner.decision() {
            if cutoff.get().is_none_or(|c| decided < c) {
                debug!("short-circuit decision at batch {}", decided);
            }
            cutoff.decide(decided);
        }
    }
}

/// Run one terminal operation: validate, split, dispatch, combine.
///
/// A short-circuit decision preempts failures in later batches only. Otherwise the lowest-index
/// failure is returned as [`EngineError::OperationFailed`] and the combined value is dropped. A
/// panic inside the combiner always fails the call; its offset is the start of the batch being
/// combined.
pub fn run_operation<S, T, B, C>(
    name: &'static str,
    source: &[S],
    config: &Config,
    chain: &OpChain<S, T>,
    procedure: &B,
    combiner: C,
) -> Result<(C::Output, DispatchStats)>
where
    S: Sync + 'static,
    T: 'static,
    B: BatchProcedure<T>,
    C: Combinable<B::Partial> + ShortCircuitable,
{
    let mut op = Operation::new(name);

    op.advance(OperationState::Splitting);
    if let Err(e) = config.pool.validate() {
        return Err(op.fail(e));
    }
    let splitter = match source.split_batches(config.batch_size) {
        Ok(s) => s,
        Err(e) => return Err(op.fail(e)),
    };
    let total_batches = splitter.batch_count();
    debug!(
        "{}: {} elements, {} batches, chain [{}], {:?}",
        name,
        source.len(),
        total_batches,
        chain.describe(),
        combiner.policy()
    );

    let stage = chain.instantiate();
    let cutoff = Cutoff::default();
    let mut progress = BatchProgress::new(config.progress, total_batches, name);
    let mut sink = ReportSink {
        combiner,
        stats: DispatchStats {
            total_batches,
            ..Default::default()
        },
        first_error: None,
        combine_panic: None,
        progress: &mut progress,
    };

    op.advance(OperationState::Dispatching);
    let mut combining = false;
    let fed = dispatch(splitter, &config.pool, &stage, procedure, &cutoff, |report| {
        if !combining {
            op.advance(OperationState::Combining);
            combining = true;
        }
        sink.on_report(report, &cutoff);
    });

    let ReportSink {
        combiner,
        mut stats,
        first_error,
        combine_panic,
        ..
    } = sink;
    stats.submitted = fed.submitted;
    stats.skipped = fed.skipped;
    progress.skip(fed.skipped);
    progress.finish();

    if let Some(err) = combine_panic {
        return Err(op.fail(EngineError::OperationFailed(err)));
    }
    if let Some(err) = first_error {
        match combiner.decision() {
            Some(decided) if err.batch > decided => warn!(
                "{}: {} failed batch(es) after the decision at batch {} ignored (first: {})",
                name, stats.failed, decided, err
            ),
            _ => return Err(op.fail(EngineError::OperationFailed(err))),
        }
    }

    op.advance(OperationState::Completed);
    debug!("{}: {:?}", name, stats);
    Ok((combiner.finish(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use OperationState::*;

    #[test]
    fn forward_transitions_only() {
        assert!(Idle.can_advance_to(Splitting));
        assert!(Splitting.can_advance_to(Dispatching));
        assert!(Dispatching.can_advance_to(Completed));
        assert!(Combining.can_advance_to(Failed));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Combining.can_advance_to(Dispatching));
        assert!(!Idle.can_advance_to(Combining));
    }

    #[test]
    fn terminal_states() {
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Combining.is_terminal());
    }

    #[test]
    fn operation_tracks_state() {
        let mut op = Operation::new("test");
        assert_eq!(op.state(), Idle);
        op.advance(Splitting);
        let err = op.fail(EngineError::invalid("x"));
        assert_eq!(op.state(), Failed);
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }
}
