//! Progress bar utilities for displaying batch completion.

use kdam::{Animation, Bar, BarExt};

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a progress bar counting batches.
pub fn create_progress_bar(config: ProgressBarConfig) -> Bar {
    kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        unit = " batches"
    )
}

/// Batch-completion progress for one operation. Only the combining thread touches it, so no lock.
pub struct BatchProgress {
    bar: Option<Bar>,
}

impl BatchProgress {
    /// A bar over `total_batches` when `enabled`, otherwise a no-op.
    pub fn new(enabled: bool, total_batches: usize, desc: &'static str) -> Self {
        let bar = enabled.then(|| {
            create_progress_bar(ProgressBarConfig::new(
                total_batches,
                desc,
                Animation::Classic,
            ))
        });
        Self { bar }
    }

    pub fn batch_done(&mut self) {
        if let Some(bar) = self.bar.as_mut() {
            let _ = bar.update(1);
        }
    }

    /// Account for batches that will never report (skipped after a decision).
    pub fn skip(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(bar) = self.bar.as_mut() {
            let _ = bar.update(n);
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.as_mut() {
            let _ = bar.refresh();
            eprintln!();
        }
    }
}
