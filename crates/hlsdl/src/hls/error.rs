use std::error::Error as StdError;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsDownloaderError {
    #[error("Playlist error: {0}")]
    PlaylistError(String),
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: StatusCode },
    #[error("Network error for {url}: {source}")]
    NetworkError {
        url: String,
        /// Decided once, when the transport error is converted.
        transient: bool,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("I/O error on {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("Key fetch error for {url}: {reason}")]
    KeyFetchError { url: String, reason: String },
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl HlsDownloaderError {
    /// Wraps a transport error, classifying it as transient or permanent.
    pub fn network(url: impl Into<String>, err: reqwest::Error) -> Self {
        HlsDownloaderError::NetworkError {
            url: url.into(),
            transient: is_transient_transport_error(&err),
            source: Arc::new(err),
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        HlsDownloaderError::IoError {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// Whether retrying the same request may succeed. Only transport-level
    /// interruptions qualify; HTTP status, DNS, TLS and local I/O failures
    /// are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HlsDownloaderError::NetworkError {
                transient: true,
                ..
            }
        )
    }
}

/// Connection resets and timeouts are the only transport failures worth
/// retrying in place.
fn is_transient_transport_error(err: &reqwest::Error) -> bool {
    // body errors are mid-transfer disconnects
    if err.is_timeout() || err.is_body() {
        return true;
    }
    if err.is_builder() || err.is_redirect() || err.is_status() {
        return false;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            return is_transient_io_kind(io_err.kind());
        }
        source = cause.source();
    }
    false
}

fn is_transient_io_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::TimedOut
    )
}
