//! # hlsdl-engine
//!
//! Downloads a segmented HLS (HTTP Live Streaming) asset and reassembles it
//! into a single playable file.
//!
//! ## Features
//!
//! - Bounded worker pool fetching segments in parallel, fail-fast on the first
//!   unrecoverable error
//! - Resume of interrupted runs by inspecting staging files left on disk
//! - AES-128-CBC segment decryption with key caching
//! - Deterministic, ordered reassembly into one output file
//!
//! ## Example
//!
//! ```no_run
//! use hlsdl_engine::HlsDownloader;
//!
//! # async fn run() -> Result<(), hlsdl_engine::DownloadError> {
//! let downloader = HlsDownloader::builder()
//!     .working_dir("download")
//!     .workers(8)
//!     .resume(true)
//!     .build()?;
//!
//! let path = downloader
//!     .download("https://example.com/video/index.m3u8")
//!     .await?;
//! println!("{}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod hls;

pub use builder::DownloaderConfigBuilder;
pub use client::{ProxyAuth, ProxyConfig, ProxyType, create_client};
pub use config::DownloaderConfig;
pub use error::DownloadError;

// Re-export the HLS engine surface
pub use hls::{
    HlsConfig, HlsDownloader, HlsDownloaderBuilder, HlsDownloaderError,
    HlsVariantSelectionPolicy, NoopProgress, PlaylistProvider, ProgressReporter, Segment,
    SegmentKey, VerifyPolicy,
};
