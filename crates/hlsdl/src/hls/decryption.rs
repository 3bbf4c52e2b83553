// HLS Decryption Service: fetches AES-128 keys and decrypts segment payloads.

use std::sync::Arc;
use std::time::Duration;

use aes::Aes128;
use bytes::Bytes;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use moka::future::Cache;
use reqwest::Client;
use tracing::{debug, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::segment::{Segment, SegmentKey};

const AES_BLOCK_SIZE: usize = 16;

// --- KeyFetcher Struct ---
// Responsible for fetching raw key data from a URI.
pub struct KeyFetcher {
    http_client: Client,
    config: Arc<HlsConfig>,
}

impl KeyFetcher {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Transient transport errors and 5xx responses are retried with
    /// exponential backoff; 4xx responses fail immediately.
    pub async fn fetch_key(&self, key_uri: &str) -> Result<Bytes, HlsDownloaderError> {
        let fetcher_config = &self.config.fetcher_config;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let last_error = match self
                .http_client
                .get(key_uri)
                .timeout(fetcher_config.key_download_timeout)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return response
                        .bytes()
                        .await
                        .map_err(|e| HlsDownloaderError::network(key_uri, e));
                }
                Ok(response) if response.status().is_client_error() => {
                    return Err(HlsDownloaderError::KeyFetchError {
                        url: key_uri.to_string(),
                        reason: format!("client error {}", response.status()),
                    });
                }
                Ok(response) => format!("status {}", response.status()),
                Err(e) => {
                    let err = HlsDownloaderError::network(key_uri, e);
                    if !err.is_transient() {
                        return Err(HlsDownloaderError::KeyFetchError {
                            url: key_uri.to_string(),
                            reason: err.to_string(),
                        });
                    }
                    err.to_string()
                }
            };

            if attempts > fetcher_config.max_key_retries {
                return Err(HlsDownloaderError::KeyFetchError {
                    url: key_uri.to_string(),
                    reason: format!(
                        "max retries ({}) exceeded, last error: {last_error}",
                        fetcher_config.max_key_retries
                    ),
                });
            }
            warn!(url = key_uri, attempt = attempts, error = %last_error, "Retrying key fetch");
            tokio::time::sleep(key_retry_delay(fetcher_config.key_retry_delay_base, attempts))
                .await;
        }
    }
}

/// Doubles per attempt, saturating instead of overflowing for large retry counts.
fn key_retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
}

// --- DecryptionService Struct ---
pub struct DecryptionService {
    key_fetcher: KeyFetcher,
    /// Keys by absolute URI. Concurrent lookups of one URI share a single fetch.
    keys: Cache<String, Bytes>,
}

type Aes128CbcDec = cbc::Decryptor<Aes128>;

impl DecryptionService {
    pub fn new(key_fetcher: KeyFetcher, config: &HlsConfig) -> Self {
        let keys = Cache::builder()
            .max_capacity(config.decryption_config.key_cache_capacity)
            .time_to_live(config.decryption_config.key_cache_ttl)
            .build();
        Self { key_fetcher, keys }
    }

    async fn get_key_data(&self, key: &SegmentKey) -> Result<Bytes, HlsDownloaderError> {
        self.keys
            .try_get_with(key.uri.clone(), async {
                let data = self.key_fetcher.fetch_key(&key.uri).await?;
                if data.len() != AES_BLOCK_SIZE {
                    return Err(HlsDownloaderError::KeyFetchError {
                        url: key.uri.clone(),
                        reason: format!(
                            "key has incorrect length: {} bytes (expected {AES_BLOCK_SIZE})",
                            data.len()
                        ),
                    });
                }
                debug!(url = %key.uri, "Fetched decryption key");
                Ok(data)
            })
            .await
            .map_err(|e: Arc<HlsDownloaderError>| (*e).clone())
    }

    /// Returns the segment's plaintext. Segments without a key pass through
    /// unchanged.
    pub async fn decrypt(
        &self,
        data: Vec<u8>,
        segment: &Segment,
    ) -> Result<Vec<u8>, HlsDownloaderError> {
        let Some(key) = &segment.key else {
            return Ok(data);
        };
        let key_data = self.get_key_data(key).await?;
        let iv = match &key.iv {
            Some(iv_hex) => parse_iv(iv_hex)?,
            None => iv_from_sequence(segment.sequence_id),
        };
        decrypt_aes128_cbc(&key_data, &iv, data)
    }
}

/// Default IV when the playlist has none: the media sequence number as a
/// 16-byte big-endian integer.
pub fn iv_from_sequence(sequence_id: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[8..].copy_from_slice(&sequence_id.to_be_bytes());
    iv
}

pub fn parse_iv(iv_hex_str: &str) -> Result<[u8; 16], HlsDownloaderError> {
    let iv_str = iv_hex_str
        .strip_prefix("0x")
        .or_else(|| iv_hex_str.strip_prefix("0X"))
        .unwrap_or(iv_hex_str);
    let mut iv_bytes = [0u8; 16];
    hex::decode_to_slice(iv_str, &mut iv_bytes).map_err(|e| {
        HlsDownloaderError::DecryptionError(format!("Failed to parse IV '{iv_hex_str}': {e}"))
    })?;
    Ok(iv_bytes)
}

/// AES-128-CBC with PKCS#7 padding, decrypted in place.
pub fn decrypt_aes128_cbc(
    key: &[u8],
    iv: &[u8; 16],
    mut data: Vec<u8>,
) -> Result<Vec<u8>, HlsDownloaderError> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(HlsDownloaderError::DecryptionError(format!(
            "ciphertext length {} is not a multiple of {AES_BLOCK_SIZE}",
            data.len()
        )));
    }

    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
        HlsDownloaderError::DecryptionError(format!("Failed to initialize AES decryptor: {e}"))
    })?;
    let plaintext_len = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut data)
        .map_err(|e| HlsDownloaderError::DecryptionError(format!("Decryption failed: {e}")))?
        .len();
    data.truncate(plaintext_len);
    Ok(data)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use aes::Aes128;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

    pub fn encrypt_aes128_cbc(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; plaintext.len() + 16];
        buf[..plaintext.len()].copy_from_slice(plaintext);
        let len = cbc::Encryptor::<Aes128>::new(key.into(), iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
            .unwrap()
            .len();
        buf.truncate(len);
        buf
    }
}
