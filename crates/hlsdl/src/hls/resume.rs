// Resume Scanner: decides which staging files left by an earlier run can be reused.

use std::collections::HashMap;
use std::path::Path;

use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::VerifyPolicy;
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::segment::{Segment, parse_staging_file_name};

/// Outcome of a resume scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Reused without a network round-trip
    pub trusted: usize,
    /// Reused after a matching size check
    pub verified: usize,
    /// Present on disk but failed verification; will be downloaded again
    pub rejected: usize,
}

impl ScanReport {
    pub fn reused(&self) -> usize {
        self.trusted + self.verified
    }
}

pub struct ResumeScanner<'a> {
    downloader: &'a dyn SegmentDownloader,
    policy: VerifyPolicy,
    workers: usize,
}

impl<'a> ResumeScanner<'a> {
    pub fn new(downloader: &'a dyn SegmentDownloader, policy: VerifyPolicy, workers: usize) -> Self {
        Self {
            downloader,
            policy,
            workers: workers.max(1),
        }
    }

    /// Marks `exists` on segments whose staging file in `dir` can be reused.
    ///
    /// With [`VerifyPolicy::Fast`] only the newest `workers + 1` files are
    /// checked: those are the ones that may have been in flight, and thus
    /// truncated, when the earlier run stopped.
    pub async fn scan(
        &self,
        dir: &Path,
        segments: &mut [Segment],
    ) -> Result<ScanReport, HlsDownloaderError> {
        let on_disk = list_staging_files(dir).await?;
        if on_disk.is_empty() {
            debug!(dir = %dir.display(), "No staging files found");
            return Ok(ScanReport::default());
        }

        let by_sequence: HashMap<u64, usize> = segments
            .iter()
            .enumerate()
            .map(|(idx, segment)| (segment.sequence_id, idx))
            .collect();
        // file order: ascending sequence id
        let matched: Vec<usize> = on_disk
            .iter()
            .filter_map(|sequence_id| by_sequence.get(sequence_id).copied())
            .collect();

        let window = match self.policy {
            VerifyPolicy::Thorough => matched.len(),
            VerifyPolicy::Fast => matched.len().min(self.workers + 1),
        };
        let (trusted, to_verify) = matched.split_at(matched.len() - window);

        let view: &[Segment] = segments;
        let checks: Vec<(usize, bool)> = stream::iter(to_verify.iter().map(move |&idx| async move {
            (idx, self.verify(&view[idx]).await)
        }))
        .buffer_unordered(self.workers)
        .collect()
        .await;

        let mut report = ScanReport {
            trusted: trusted.len(),
            ..Default::default()
        };
        for &idx in trusted {
            segments[idx].exists = true;
        }
        for (idx, ok) in checks {
            if ok {
                segments[idx].exists = true;
                report.verified += 1;
            } else {
                report.rejected += 1;
            }
        }

        info!(
            trusted = report.trusted,
            verified = report.verified,
            rejected = report.rejected,
            "Resume scan complete"
        );
        Ok(report)
    }

    /// A staging file is valid only when its size equals the nonzero size the
    /// server reports. Any failure to tell degrades to "download again".
    async fn verify(&self, segment: &Segment) -> bool {
        let local = match tokio::fs::metadata(&segment.path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(seq = segment.sequence_id, error = %e, "Cannot stat staging file");
                return false;
            }
        };

        match self.downloader.remote_size(segment).await {
            Ok(Some(remote)) if remote == local && remote != 0 => {
                debug!(seq = segment.sequence_id, size = local, "Segment found, same size, skipped");
                true
            }
            Ok(remote) => {
                warn!(
                    seq = segment.sequence_id,
                    local,
                    remote = ?remote,
                    "Segment found but size differs, downloading again"
                );
                false
            }
            Err(e) => {
                warn!(seq = segment.sequence_id, error = %e, "Cannot verify segment, downloading again");
                false
            }
        }
    }
}

/// Sequence ids of staging files in `dir`, ascending. A missing directory
/// has no staging files.
async fn list_staging_files(dir: &Path) -> Result<Vec<u64>, HlsDownloaderError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(HlsDownloaderError::io(dir, e)),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| HlsDownloaderError::io(dir, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(sequence_id) = entry.file_name().to_str().and_then(parse_staging_file_name) {
            found.push(sequence_id);
        }
    }
    found.sort_unstable();
    Ok(found)
}
