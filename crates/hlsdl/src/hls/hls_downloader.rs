use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tracing::{debug, info};

use crate::hls::builder::HlsDownloaderBuilder;
use crate::hls::decryption::{DecryptionService, KeyFetcher};
use crate::hls::fetcher::{SegmentDownloader, SegmentFetcher};
use crate::hls::joiner::SegmentJoiner;
use crate::hls::playlist::{PlaylistEngine, PlaylistProvider};
use crate::hls::progress::{NoopProgress, ProgressReporter};
use crate::hls::resume::ResumeScanner;
use crate::hls::scheduler::SegmentScheduler;
use crate::hls::segment::Segment;
use crate::{DownloadError, create_client};

use super::HlsConfig;

/// Downloads a VOD playlist into a single file inside the working directory.
pub struct HlsDownloader {
    client: Client,
    config: Arc<HlsConfig>,
    playlist_provider: Arc<dyn PlaylistProvider>,
    segment_fetcher: Arc<dyn SegmentDownloader>,
    decryption: DecryptionService,
    progress: Arc<dyn ProgressReporter>,
}

impl HlsDownloader {
    pub fn builder() -> HlsDownloaderBuilder {
        HlsDownloaderBuilder::new()
    }

    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        Self::with_config(config)
    }

    /// Create a new HlsDownloader with the default playlist engine and no
    /// progress reporting
    pub fn with_config(config: HlsConfig) -> Result<Self, DownloadError> {
        Self::from_parts(config, Arc::new(NoopProgress), None)
    }

    pub(crate) fn from_parts(
        config: HlsConfig,
        progress: Arc<dyn ProgressReporter>,
        playlist_provider: Option<Arc<dyn PlaylistProvider>>,
    ) -> Result<Self, DownloadError> {
        config.validate().map_err(DownloadError::Config)?;
        let client = create_client(&config.base)?;
        let config = Arc::new(config);

        let playlist_provider: Arc<dyn PlaylistProvider> = match playlist_provider {
            Some(provider) => provider,
            None => Arc::new(PlaylistEngine::new(client.clone(), Arc::clone(&config))),
        };
        let segment_fetcher: Arc<dyn SegmentDownloader> =
            Arc::new(SegmentFetcher::new(client.clone(), Arc::clone(&config)));
        let decryption = DecryptionService::new(
            KeyFetcher::new(client.clone(), Arc::clone(&config)),
            &config,
        );

        Ok(Self {
            client,
            config,
            playlist_provider,
            segment_fetcher,
            decryption,
            progress,
        })
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Loads the playlist at `url` and downloads every segment, returning the
    /// path of the joined output file.
    pub async fn download(&self, url: &str) -> Result<PathBuf, DownloadError> {
        info!(url = %url, "Starting HLS download");
        let segments = self
            .playlist_provider
            .load_segments(url)
            .await
            .map_err(DownloadError::Playlist)?;
        self.download_segments(segments).await
    }

    /// Runs the download phases over an already parsed segment list:
    /// prepare, optional resume scan, parallel fetch, join.
    pub async fn download_segments(
        &self,
        mut segments: Vec<Segment>,
    ) -> Result<PathBuf, DownloadError> {
        let start_time = Instant::now();
        let working_dir = &self.config.working_dir;
        let output = working_dir.join(self.config.resolve_output_filename());

        tokio::fs::create_dir_all(working_dir)
            .await
            .map_err(|source| DownloadError::Prepare {
                path: working_dir.clone(),
                source,
            })?;
        for segment in &mut segments {
            segment.stage_in(working_dir);
            segment.exists = false;
        }

        let resume = &self.config.resume_config;
        if resume.enabled {
            debug!(policy = ?resume.verify, "Scanning staging files for resume");
            ResumeScanner::new(
                self.segment_fetcher.as_ref(),
                resume.verify,
                self.config.workers,
            )
            .scan(working_dir, &mut segments)
            .await
            .map_err(DownloadError::Scan)?;
        }

        SegmentScheduler::new(
            Arc::clone(&self.segment_fetcher),
            Arc::clone(&self.progress),
            self.config.workers,
        )
        .run(&segments)
        .await?;

        let path = SegmentJoiner::new(&self.decryption)
            .join(&mut segments, &output)
            .await?;
        info!(
            path = %path.display(),
            segments = segments.len(),
            elapsed = ?start_time.elapsed(),
            "HLS download complete"
        );
        Ok(path)
    }
}
