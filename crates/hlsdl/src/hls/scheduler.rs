// HLS Segment Scheduler: bounded worker pool that fetches segments into staging files.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::DownloadError;
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::progress::ProgressReporter;
use crate::hls::segment::{DownloadResult, Segment};

pub struct SegmentScheduler {
    segment_fetcher: Arc<dyn SegmentDownloader>,
    progress: Arc<dyn ProgressReporter>,
    workers: usize,
}

impl SegmentScheduler {
    pub fn new(
        segment_fetcher: Arc<dyn SegmentDownloader>,
        progress: Arc<dyn ProgressReporter>,
        workers: usize,
    ) -> Self {
        Self {
            segment_fetcher,
            progress,
            workers: workers.max(1),
        }
    }

    /// Fetches every segment not marked `exists`, at most `workers` at a time.
    ///
    /// The first failure cancels the pool: no segment is started after it,
    /// in-flight fetches run to completion, and later failures are dropped.
    /// Returns only once every worker has exited.
    pub async fn run(&self, segments: &[Segment]) -> Result<(), DownloadError> {
        self.progress.start(segments.len() as u64);

        let mut pending: Vec<Segment> = segments.iter().filter(|s| !s.exists).cloned().collect();
        pending.sort_by_key(|segment| segment.sequence_id);
        for _ in 0..segments.len() - pending.len() {
            self.progress.increment();
        }
        info!(
            total = segments.len(),
            pending = pending.len(),
            workers = self.workers,
            "Starting segment downloads"
        );

        let cancel = CancellationToken::new();
        // rendezvous: a segment leaves the queue only when a worker is free
        let (job_tx, job_rx) = flume::bounded::<Segment>(0);
        let (result_tx, mut result_rx) = mpsc::channel::<DownloadResult>(self.workers);

        let dispatcher = tokio::spawn(dispatch(pending, job_tx, cancel.clone()));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            workers.spawn(fetch_worker(
                worker_id,
                Arc::clone(&self.segment_fetcher),
                job_rx.clone(),
                result_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(job_rx);
        drop(result_tx);

        let mut first_error: Option<DownloadError> = None;
        loop {
            tokio::select! {
                Some(message) = result_rx.recv() => {
                    self.handle_result(message, &cancel, &mut first_error);
                }
                joined = workers.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Fetch worker terminated abnormally");
                        cancel.cancel();
                        first_error.get_or_insert(DownloadError::Worker(e.to_string()));
                    }
                    None => break,
                },
            }
        }
        // every worker has exited; drain what they left in the buffer
        while let Ok(message) = result_rx.try_recv() {
            self.handle_result(message, &cancel, &mut first_error);
        }

        if let Err(e) = dispatcher.await {
            first_error.get_or_insert(DownloadError::Worker(e.to_string()));
        }

        self.progress.finish(first_error.is_none());
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn handle_result(
        &self,
        message: DownloadResult,
        cancel: &CancellationToken,
        first_error: &mut Option<DownloadError>,
    ) {
        let DownloadResult {
            sequence_id,
            result,
        } = message;
        match result {
            Ok(()) if first_error.is_none() => self.progress.increment(),
            Ok(()) => {}
            Err(source) if first_error.is_none() => {
                error!(seq = sequence_id, error = %source, "Segment failed, cancelling remaining downloads");
                cancel.cancel();
                *first_error = Some(DownloadError::Segment {
                    sequence_id,
                    source,
                });
            }
            Err(source) => {
                debug!(seq = sequence_id, error = %source, "Discarding error after cancellation");
            }
        }
    }
}

/// Feeds pending segments into the queue in ascending order until done or
/// cancelled.
async fn dispatch(segments: Vec<Segment>, jobs: flume::Sender<Segment>, cancel: CancellationToken) {
    for segment in segments {
        let sequence_id = segment.sequence_id;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(next = sequence_id, "Dispatch stopped by cancellation");
                return;
            }
            sent = jobs.send_async(segment) => {
                if sent.is_err() {
                    debug!(next = sequence_id, "All workers gone, dispatch stopped");
                    return;
                }
            }
        }
    }
}

async fn fetch_worker(
    worker_id: usize,
    segment_fetcher: Arc<dyn SegmentDownloader>,
    jobs: flume::Receiver<Segment>,
    results: mpsc::Sender<DownloadResult>,
    cancel: CancellationToken,
) {
    loop {
        let segment = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = jobs.recv_async() => match job {
                Ok(segment) => segment,
                Err(_) => break,
            },
        };
        // handed over in the same instant the pool was cancelled
        if cancel.is_cancelled() {
            break;
        }

        let result = segment_fetcher.download_segment(&segment).await;
        let failed = result.is_err();
        let message = DownloadResult {
            sequence_id: segment.sequence_id,
            result,
        };
        if results.send(message).await.is_err() || failed {
            break;
        }
    }
    debug!(worker_id, "Fetch worker exiting");
}
