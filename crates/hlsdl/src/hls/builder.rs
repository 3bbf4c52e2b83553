use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::HeaderMap;

use crate::hls::config::{HlsConfig, HlsVariantSelectionPolicy, VerifyPolicy};
use crate::hls::hls_downloader::HlsDownloader;
use crate::hls::playlist::PlaylistProvider;
use crate::hls::progress::{NoopProgress, ProgressReporter};
use crate::{DownloadError, DownloaderConfig};

/// Fluent construction of an [`HlsDownloader`].
pub struct HlsDownloaderBuilder {
    config: HlsConfig,
    progress: Arc<dyn ProgressReporter>,
    playlist_provider: Option<Arc<dyn PlaylistProvider>>,
}

impl HlsDownloaderBuilder {
    pub fn new() -> Self {
        Self {
            config: HlsConfig::default(),
            progress: Arc::new(NoopProgress),
            playlist_provider: None,
        }
    }

    /// Replace the whole engine configuration
    pub fn config(mut self, config: HlsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_config(mut self, base_config: DownloaderConfig) -> Self {
        self.config.base = base_config;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = dir.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn output_filename(mut self, name: impl Into<String>) -> Self {
        self.config.output_filename = Some(name.into());
        self
    }

    /// Reuse staging files from an earlier run
    pub fn resume(mut self, enabled: bool) -> Self {
        self.config.resume_config.enabled = enabled;
        self
    }

    pub fn verify(mut self, policy: VerifyPolicy) -> Self {
        self.config.resume_config.verify = policy;
        self
    }

    /// Retries after a transient segment error
    pub fn segment_retry_count(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_segment_retries = retries;
        self
    }

    /// Headers merged into the client's defaults, sent with every request
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.base.merge_headers(&headers);
        self
    }

    pub fn variant_selection_policy(mut self, policy: HlsVariantSelectionPolicy) -> Self {
        self.config.playlist_config.variant_selection_policy = policy;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn playlist_provider(mut self, provider: Arc<dyn PlaylistProvider>) -> Self {
        self.playlist_provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<HlsDownloader, DownloadError> {
        HlsDownloader::from_parts(self.config, self.progress, self.playlist_provider)
    }
}

impl Default for HlsDownloaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
