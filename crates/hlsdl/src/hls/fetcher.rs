// HLS Segment Fetcher: streams individual media segments into their staging files.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode, header::CONTENT_LENGTH};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::segment::Segment;

/// Network side of the worker pool and the resume scanner.
#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    /// Downloads the segment body into `segment.path`.
    async fn download_segment(&self, segment: &Segment) -> Result<(), HlsDownloaderError>;

    /// Server-reported size of the segment, `None` if the server sends no
    /// Content-Length.
    async fn remote_size(&self, segment: &Segment) -> Result<Option<u64>, HlsDownloaderError>;
}

pub struct SegmentFetcher {
    http_client: Client,
    config: Arc<HlsConfig>,
}

impl SegmentFetcher {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn with_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        let timeout = self.config.fetcher_config.segment_download_timeout;
        if timeout.is_zero() {
            request
        } else {
            request.timeout(timeout)
        }
    }

    /// Single GET attempt. The body is streamed chunk by chunk so memory use
    /// stays flat regardless of segment size or worker count.
    async fn fetch_once(&self, segment: &Segment) -> Result<u64, HlsDownloaderError> {
        let response = self
            .with_timeout(self.http_client.get(&segment.uri))
            .send()
            .await
            .map_err(|e| HlsDownloaderError::network(&segment.uri, e))?;

        if response.status() != StatusCode::OK {
            return Err(HlsDownloaderError::HttpStatus {
                url: segment.uri.clone(),
                status: response.status(),
            });
        }

        let mut file = tokio::fs::File::create(&segment.path)
            .await
            .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| HlsDownloaderError::network(&segment.uri, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| HlsDownloaderError::io(&segment.path, e))?;

        Ok(written)
    }
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    /// Retries only transient transport failures, with a fixed delay between
    /// attempts. Everything else is returned on first occurrence.
    async fn download_segment(&self, segment: &Segment) -> Result<(), HlsDownloaderError> {
        let max_retries = self.config.fetcher_config.max_segment_retries;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.fetch_once(segment).await {
                Ok(bytes) => {
                    debug!(seq = segment.sequence_id, bytes, "Downloaded segment");
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempts <= max_retries => {
                    warn!(
                        seq = segment.sequence_id,
                        attempt = attempts,
                        error = %e,
                        "Transient error downloading segment, retrying"
                    );
                    tokio::time::sleep(self.config.fetcher_config.segment_retry_delay).await;
                }
                Err(e) => {
                    discard_partial(segment).await;
                    return Err(e);
                }
            }
        }
    }

    async fn remote_size(&self, segment: &Segment) -> Result<Option<u64>, HlsDownloaderError> {
        let response = self
            .with_timeout(self.http_client.head(&segment.uri))
            .send()
            .await
            .map_err(|e| HlsDownloaderError::network(&segment.uri, e))?;

        if !response.status().is_success() {
            return Err(HlsDownloaderError::HttpStatus {
                url: segment.uri.clone(),
                status: response.status(),
            });
        }

        // Response::content_length() reflects the (empty) HEAD body, so read
        // the header itself.
        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok()))
    }
}

/// A failed segment must not leave a truncated staging file behind, the
/// fast resume scan would trust it.
async fn discard_partial(segment: &Segment) {
    match tokio::fs::remove_file(&segment.path).await {
        Ok(()) => debug!(seq = segment.sequence_id, "Removed partial staging file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %segment.path.display(),
            error = %e,
            "Failed to remove partial staging file"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::config::HlsFetcherConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(retries: u32, timeout: Duration) -> SegmentFetcher {
        let config = HlsConfig {
            fetcher_config: HlsFetcherConfig {
                segment_download_timeout: timeout,
                max_segment_retries: retries,
                segment_retry_delay: Duration::from_millis(10),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-token", "secret".parse().unwrap());
        let client = Client::builder().default_headers(headers).build().unwrap();
        SegmentFetcher::new(client, Arc::new(config))
    }

    fn segment(server: &MockServer, dir: &TempDir, seq: u64) -> Segment {
        segment_at(&server.uri(), dir, seq)
    }

    fn segment_at(base: &str, dir: &TempDir, seq: u64) -> Segment {
        let mut segment = Segment::new(seq, format!("{base}/seg{seq}.ts"), None);
        segment.stage_in(dir.path());
        segment
    }

    enum Misbehave {
        /// Reset the connection after reading the request
        Reset,
        /// Promise more body than is sent, then close
        Truncate,
    }

    async fn read_request(stream: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
    }

    /// Raw HTTP server that misbehaves on the first `failures` connections
    /// and answers `ok` afterwards. Returns its base URL and a connection
    /// counter.
    async fn flaky_server(failures: usize, mode: Misbehave) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                read_request(&mut stream).await;
                if n > failures {
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                        )
                        .await;
                    let _ = stream.shutdown().await;
                    continue;
                }
                match mode {
                    Misbehave::Reset => {
                        #[allow(deprecated)]
                        let _ = stream.set_linger(Some(Duration::ZERO));
                    }
                    Misbehave::Truncate => {
                        let _ = stream
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                            .await;
                        let _ = stream.flush().await;
                    }
                }
                drop(stream);
            }
        });

        (base, connections)
    }

    #[tokio::test]
    async fn test_download_streams_body_to_staging_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/seg3.ts"))
            .and(header("x-token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let segment = segment(&server, &dir, 3);
        fetcher(2, Duration::ZERO)
            .download_segment(&segment)
            .await
            .unwrap();

        let data = std::fs::read(dir.path().join("seg000003.ts")).unwrap();
        assert_eq!(data, vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn test_non_200_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/seg1.ts"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = fetcher(2, Duration::ZERO)
            .download_segment(&segment(&server, &dir, 1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HlsDownloaderError::HttpStatus {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                ..
            }
        ));
        assert!(!dir.path().join("seg000001.ts").exists());
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_then_succeeds() {
        let server = MockServer::start().await;
        // First two attempts time out on the client side.
        Mock::given(method("GET"))
            .and(path("/seg5.ts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/seg5.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        fetcher(2, Duration::from_millis(100))
            .download_segment(&segment(&server, &dir, 5))
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("seg000005.ts")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/seg6.ts"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = fetcher(2, Duration::from_millis(100))
            .download_segment(&segment(&server, &dir, 6))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_reset_is_retried_then_succeeds() {
        let (base, connections) = flaky_server(2, Misbehave::Reset).await;
        let dir = TempDir::new().unwrap();

        fetcher(2, Duration::ZERO)
            .download_segment(&segment_at(&base, &dir, 4))
            .await
            .unwrap();

        assert_eq!(connections.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read(dir.path().join("seg000004.ts")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_persistent_connection_reset_fails_after_three_attempts() {
        let (base, connections) = flaky_server(usize::MAX, Misbehave::Reset).await;
        let dir = TempDir::new().unwrap();

        let err = fetcher(2, Duration::ZERO)
            .download_segment(&segment_at(&base, &dir, 4))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(connections.load(Ordering::SeqCst), 3);
        assert!(!dir.path().join("seg000004.ts").exists());
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_staging_file() {
        let (base, connections) = flaky_server(usize::MAX, Misbehave::Truncate).await;
        let dir = TempDir::new().unwrap();

        let err = fetcher(2, Duration::ZERO)
            .download_segment(&segment_at(&base, &dir, 8))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(connections.load(Ordering::SeqCst), 3);
        assert!(!dir.path().join("seg000008.ts").exists());
    }

    #[tokio::test]
    async fn test_remote_size_reads_content_length_header() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/seg2.ts"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-length", "1234"))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/seg9.ts"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(2, Duration::ZERO);
        assert_eq!(
            fetcher.remote_size(&segment(&server, &dir, 2)).await.unwrap(),
            Some(1234)
        );
        assert!(fetcher.remote_size(&segment(&server, &dir, 9)).await.is_err());
    }
}
