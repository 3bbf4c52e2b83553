/// Observer for download progress. Calls are fire-and-forget: the engine
/// never waits on the reporter.
pub trait ProgressReporter: Send + Sync {
    /// Total number of segments, skipped ones included.
    fn start(&self, total: u64);
    /// One segment completed or was skipped as already present.
    fn increment(&self);
    /// `completed` is false when the download stopped on an error.
    fn finish(&self, completed: bool);
}

/// Reporter that discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _total: u64) {}
    fn increment(&self) {}
    fn finish(&self, _completed: bool) {}
}
