// Segment model: one media chunk referenced by the playlist plus its local staging state.

use std::path::{Path, PathBuf};

use crate::hls::HlsDownloaderError;

/// Extension shared by every staging file
pub const STAGING_EXTENSION: &str = "ts";

/// Reference to the AES-128 key protecting a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    /// Absolute key URI
    pub uri: String,
    /// Explicit IV from the playlist, as written (`0x...` hex)
    pub iv: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    /// Position in the playlist; defines the final byte order
    pub sequence_id: u64,
    /// Absolute segment URI
    pub uri: String,
    /// `None` means the segment is stored in plaintext
    pub key: Option<SegmentKey>,
    /// Staging file for the raw downloaded bytes
    pub path: PathBuf,
    /// Set by the resume scanner when the staging file can be reused
    pub exists: bool,
}

impl Segment {
    pub fn new(sequence_id: u64, uri: impl Into<String>, key: Option<SegmentKey>) -> Self {
        Self {
            sequence_id,
            uri: uri.into(),
            key,
            path: PathBuf::new(),
            exists: false,
        }
    }

    /// Assigns the deterministic staging path inside `dir`.
    pub fn stage_in(&mut self, dir: &Path) {
        self.path = staging_path(dir, self.sequence_id);
    }
}

/// `seg{sequence_id:06}.ts` inside `dir`. Resume matching depends on this
/// exact format.
pub fn staging_path(dir: &Path, sequence_id: u64) -> PathBuf {
    dir.join(staging_file_name(sequence_id))
}

pub fn staging_file_name(sequence_id: u64) -> String {
    format!("seg{sequence_id:06}.{STAGING_EXTENSION}")
}

/// Parses a staging file name back into its sequence id.
pub fn parse_staging_file_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix("seg")?
        .strip_suffix(STAGING_EXTENSION)?
        .strip_suffix('.')?;
    if digits.len() < 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sequence_id: u64 = digits.parse().ok()?;
    // reject non-canonical names like seg0000001.ts
    (staging_file_name(sequence_id) == name).then_some(sequence_id)
}

/// Completion signal from a fetch task. Carries no payload; bytes are
/// already in the staging file.
#[derive(Debug)]
pub struct DownloadResult {
    pub sequence_id: u64,
    pub result: Result<(), HlsDownloaderError>,
}
