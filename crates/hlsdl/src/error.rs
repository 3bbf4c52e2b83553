use std::path::PathBuf;

use crate::hls::HlsDownloaderError;

/// Error returned by a top-level download, tagged with the phase that failed.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to load playlist: {0}")]
    Playlist(#[source] HlsDownloaderError),

    #[error("Failed to prepare working directory {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan staging directory: {0}")]
    Scan(#[source] HlsDownloaderError),

    #[error("Failed to download segment {sequence_id}: {source}")]
    Segment {
        sequence_id: u64,
        #[source]
        source: HlsDownloaderError,
    },

    #[error("Fetch worker failed: {0}")]
    Worker(String),

    #[error("Failed to join segment {sequence_id}: {source}")]
    Join {
        sequence_id: u64,
        #[source]
        source: HlsDownloaderError,
    },

    #[error("Failed to finalize output file {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Sequence id of the segment that caused the failure, when the failing
    /// phase is per-segment.
    pub fn sequence_id(&self) -> Option<u64> {
        match self {
            DownloadError::Segment { sequence_id, .. } | DownloadError::Join { sequence_id, .. } => {
                Some(*sequence_id)
            }
            _ => None,
        }
    }
}
