//! Terminal progress bars for uploads.

use std::sync::Mutex;

use biotransfer_storage::{ProgressCallback, ProgressUnit, TransferProgress, UploadPhase};
use indicatif::{ProgressBar, ProgressStyle};

const BYTES_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const PARTS_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} parts";

/// Shows one bar per file and upload step.
#[derive(Default)]
pub struct BarReporter {
    current: Mutex<Option<ActiveBar>>,
}

struct ActiveBar {
    file_id: String,
    phase: UploadPhase,
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish whatever bar is still on screen.
    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(active) = current.take() {
                active.bar.finish();
            }
        }
    }
}

fn style(unit: ProgressUnit) -> ProgressStyle {
    let template: &str = match unit {
        ProgressUnit::Bytes => BYTES_TEMPLATE,
        ProgressUnit::Parts => PARTS_TEMPLATE,
    };
    ProgressStyle::with_template(template)
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressCallback<TransferProgress> for BarReporter {
    fn on_progress(&self, progress: &TransferProgress) -> bool {
        let Ok(mut current) = self.current.lock() else {
            return true;
        };

        let stale: bool = current
            .as_ref()
            .map_or(true, |a| a.file_id != progress.file_id || a.phase != progress.phase);
        if stale {
            if let Some(previous) = current.take() {
                previous.bar.finish();
            }
            let bar: ProgressBar = ProgressBar::new(progress.total);
            bar.set_style(style(progress.unit));
            bar.set_message(progress.file_id.clone());
            *current = Some(ActiveBar {
                file_id: progress.file_id.clone(),
                phase: progress.phase,
                bar,
            });
        }

        if let Some(active) = current.as_ref() {
            active.bar.set_length(progress.total);
            active.bar.set_position(progress.completed);
        }
        true
    }
}
