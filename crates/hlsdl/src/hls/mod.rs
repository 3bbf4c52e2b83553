// HLS VOD downloader: playlist loading, parallel fetch, resume, decryption and joining

pub mod builder;
pub mod config;
pub mod decryption;
pub mod error;
pub mod fetcher;
pub mod hls_downloader;
pub mod joiner;
pub mod playlist;
pub mod progress;
pub mod resume;
pub mod scheduler;
pub mod segment;

// Re-exports for easier access
pub use builder::HlsDownloaderBuilder;
pub use config::{HlsConfig, HlsVariantSelectionPolicy, VerifyPolicy};
pub use error::HlsDownloaderError;
pub use fetcher::{SegmentDownloader, SegmentFetcher};
pub use hls_downloader::HlsDownloader;
pub use playlist::{PlaylistEngine, PlaylistProvider};
pub use progress::{NoopProgress, ProgressReporter};
pub use resume::ScanReport;
pub use segment::{Segment, SegmentKey};
