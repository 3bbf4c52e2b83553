// Segment Joiner: orders, decrypts and concatenates staging files into the final output.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::DownloadError;
use crate::hls::HlsDownloaderError;
use crate::hls::decryption::DecryptionService;
use crate::hls::segment::Segment;

pub struct SegmentJoiner<'a> {
    decryption: &'a DecryptionService,
}

impl<'a> SegmentJoiner<'a> {
    pub fn new(decryption: &'a DecryptionService) -> Self {
        Self { decryption }
    }

    /// Writes every segment, sorted by sequence id, into `output`.
    ///
    /// Bytes go to `output` + `.part` first; each staging file is removed
    /// only once its plaintext is synced to disk. The part file is renamed to
    /// `output` after the last segment. On failure it is kept, so the bytes
    /// of already consumed segments survive.
    pub async fn join(
        &self,
        segments: &mut [Segment],
        output: &Path,
    ) -> Result<PathBuf, DownloadError> {
        info!(segments = segments.len(), output = %output.display(), "Joining segments");
        segments.sort_by_key(|segment| segment.sequence_id);

        let part = part_path(output);
        if let Err(err) = self.write_all(segments, &part).await {
            warn!(path = %part.display(), error = %err, "Join failed, keeping partial output");
            return Err(err);
        }

        tokio::fs::rename(&part, output)
            .await
            .map_err(|source| DownloadError::Output {
                path: output.to_path_buf(),
                source,
            })?;
        Ok(output.to_path_buf())
    }

    async fn write_all(&self, segments: &[Segment], part: &Path) -> Result<(), DownloadError> {
        let output_error = |source| DownloadError::Output {
            path: part.to_path_buf(),
            source,
        };
        let mut file = File::create(part).await.map_err(output_error)?;

        for segment in segments {
            self.append_segment(&mut file, segment)
                .await
                .map_err(|source| DownloadError::Join {
                    sequence_id: segment.sequence_id,
                    source,
                })?;
        }

        file.sync_all().await.map_err(output_error)?;
        Ok(())
    }

    async fn append_segment(
        &self,
        file: &mut File,
        segment: &Segment,
    ) -> Result<(), HlsDownloaderError> {
        let raw = tokio::fs::read(&segment.path)
            .await
            .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;
        let plaintext = self.decryption.decrypt(raw, segment).await?;

        file.write_all(&plaintext)
            .await
            .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;
        file.flush()
            .await
            .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;
        file.sync_data()
            .await
            .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;

        tokio::fs::remove_file(&segment.path)
            .await
            .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;
        debug!(seq = segment.sequence_id, bytes = plaintext.len(), "Joined segment");
        Ok(())
    }
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    output.with_file_name(name)
}
