use std::path::PathBuf;
use std::time::Duration;

use crate::DownloaderConfig;
use crate::hls::segment::parse_staging_file_name;

// --- Top-Level Configuration ---
#[derive(Debug, Clone)]
pub struct HlsConfig {
    /// Base HTTP configuration
    pub base: DownloaderConfig,
    /// Directory holding staging files and the final output
    pub working_dir: PathBuf,
    /// Number of parallel fetch tasks
    pub workers: usize,
    /// Final file name inside `working_dir`; generated when `None`
    pub output_filename: Option<String>,
    pub playlist_config: HlsPlaylistConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub resume_config: HlsResumeConfig,
    pub decryption_config: HlsDecryptionConfig,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            base: DownloaderConfig::default(),
            working_dir: PathBuf::from("download"),
            workers: 4,
            output_filename: None,
            playlist_config: HlsPlaylistConfig::default(),
            fetcher_config: HlsFetcherConfig::default(),
            resume_config: HlsResumeConfig::default(),
            decryption_config: HlsDecryptionConfig::default(),
        }
    }
}

impl HlsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if let Some(name) = &self.output_filename {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(format!("invalid output filename '{name}'"));
            }
            if parse_staging_file_name(name).is_some() {
                return Err(format!("output filename '{name}' collides with staging files"));
            }
        }
        Ok(())
    }

    /// Output file name, falling back to a timestamped default.
    pub fn resolve_output_filename(&self) -> String {
        self.output_filename.clone().unwrap_or_else(|| {
            format!("video_{}.ts", chrono::Local::now().format("%Y%m%d_%H%M%S"))
        })
    }
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPlaylistConfig {
    pub fetch_timeout: Duration,
    pub variant_selection_policy: HlsVariantSelectionPolicy,
}

impl Default for HlsPlaylistConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            variant_selection_policy: Default::default(),
        }
    }
}

/// Static choice of one variant from a master playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HlsVariantSelectionPolicy {
    #[default]
    HighestBitrate,
    LowestBitrate,
    ClosestToBitrate(u64),
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    /// Per-request timeout for segment GETs (zero disables it)
    pub segment_download_timeout: Duration,
    /// Additional attempts after a transient failure
    pub max_segment_retries: u32,
    /// Fixed pause between segment attempts
    pub segment_retry_delay: Duration,
    pub key_download_timeout: Duration,
    pub max_key_retries: u32,
    /// Base for exponential key retry backoff
    pub key_retry_delay_base: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            segment_download_timeout: Duration::ZERO,
            max_segment_retries: 2,
            segment_retry_delay: Duration::from_secs(1),
            key_download_timeout: Duration::from_secs(10),
            max_key_retries: 3,
            key_retry_delay_base: Duration::from_millis(200),
        }
    }
}

// --- Resume Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsResumeConfig {
    /// Reuse staging files left by an earlier run
    pub enabled: bool,
    pub verify: VerifyPolicy,
}

/// How staging files from an earlier run are verified before reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum VerifyPolicy {
    /// Trust older files, verify only the newest `workers + 1`
    #[default]
    Fast,
    /// Verify every existing file against the server-reported size
    Thorough,
}

// --- Decryption Configuration ---
#[derive(Debug, Clone)]
pub struct HlsDecryptionConfig {
    pub key_cache_ttl: Duration,
    pub key_cache_capacity: u64,
}

impl Default for HlsDecryptionConfig {
    fn default() -> Self {
        Self {
            key_cache_ttl: Duration::from_secs(60 * 60),
            key_cache_capacity: 64,
        }
    }
}
