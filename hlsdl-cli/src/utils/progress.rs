use std::time::Duration;

use hlsdl_engine::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Segment counter rendered as an indicatif bar.
pub struct SegmentProgress {
    bar: ProgressBar,
}

impl SegmentProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(segment_style());
        bar.set_message("Downloading segments");
        Self { bar }
    }
}

impl ProgressReporter for SegmentProgress {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.enable_steady_tick(Duration::from_millis(500));
    }

    fn increment(&self) {
        self.bar.inc(1);
    }

    fn finish(&self, completed: bool) {
        if completed {
            self.bar.finish_with_message("Segments downloaded");
        } else {
            self.bar.abandon_with_message("Download aborted");
        }
    }
}
