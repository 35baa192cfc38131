//! Progress bars (indicatif) driven by engine transfer events.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bulkfetch_core::TransferObserver;
use bulkfetch_core::TransferStatus;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{msg:30!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}";
const UNSIZED_TEMPLATE: &str = "{spinner} {msg:30!} {bytes} {bytes_per_sec}";
const OVERALL_TEMPLATE: &str = "[{pos}/{len}] files settled {wide_msg}";

/// One bar per active transfer plus a batch-level counter.
pub(crate) struct ProgressManager {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressManager {
    /// Draws to stderr.
    pub(crate) fn new(total_targets: usize) -> Self {
        Self::with_draw_target(total_targets, ProgressDrawTarget::stderr())
    }

    fn with_draw_target(total_targets: usize, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(total_targets as u64));
        overall.set_style(
            ProgressStyle::with_template(OVERALL_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            multi,
            overall,
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Clears every bar from the terminal.
    pub(crate) fn finish(&self) {
        let bars = std::mem::take(&mut *self.lock_bars());
        for bar in bars.into_values() {
            bar.finish_and_clear();
        }
        self.overall.finish_and_clear();
    }

    fn lock_bars(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn file_bar(&self, filename: &str, total: Option<u64>) -> ProgressBar {
        let mut bars = self.lock_bars();
        let bar = bars
            .entry(filename.to_string())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::no_length());
                bar.set_message(filename.to_string());
                bar
            })
            .clone();
        let template = if total.is_some() {
            BAR_TEMPLATE
        } else {
            UNSIZED_TEMPLATE
        };
        bar.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        match total {
            Some(total) => bar.set_length(total),
            None => bar.unset_length(),
        }
        bar
    }

    #[cfg(test)]
    fn active_bars(&self) -> usize {
        self.lock_bars().len()
    }
}

impl TransferObserver for ProgressManager {
    fn on_start(&self, filename: &str, offset: u64, total: Option<u64>) {
        let bar = self.file_bar(filename, total);
        bar.set_position(offset);
        bar.reset_eta();
    }

    fn on_bytes(&self, filename: &str, bytes: u64) {
        if let Some(bar) = self.lock_bars().get(filename) {
            bar.inc(bytes);
        }
    }

    fn on_finish(&self, filename: &str, status: &TransferStatus) {
        if let Some(bar) = self.lock_bars().remove(filename) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if let TransferStatus::Failed(kind) = status {
            self.overall.set_message(format!("last failure: {filename} ({kind})"));
        }
        self.overall.inc(1);
    }

    fn on_abort(&self, filename: &str) {
        if let Some(bar) = self.lock_bars().remove(filename) {
            bar.abandon_with_message(format!("{filename} (paused)"));
            self.multi.remove(&bar);
        }
    }
}
