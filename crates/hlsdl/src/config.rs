use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::client::ProxyConfig;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// HTTP-level options shared by every request the engine issues
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Overall timeout for a single HTTP request (zero disables it)
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Idle timeout for pooled connections
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Headers applied to every GET and HEAD request
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            // segment bodies are streamed, so no overall cap by default
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: DownloaderConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl DownloaderConfig {
    pub fn builder() -> crate::builder::DownloaderConfigBuilder {
        crate::builder::DownloaderConfigBuilder::new()
    }

    /// Merges caller headers over the defaults; caller values win for the same name.
    pub fn merge_headers(&mut self, headers: &HeaderMap) {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_headers_overrides_defaults() {
        let mut config = DownloaderConfig::default();
        let mut custom = HeaderMap::new();
        custom.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("video/mp2t"),
        );
        custom.insert("authorization", HeaderValue::from_static("Bearer abc"));

        config.merge_headers(&custom);

        assert_eq!(config.headers.get("accept").unwrap(), "video/mp2t");
        assert_eq!(config.headers.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(config.headers.get("connection").unwrap(), "keep-alive");
    }
}
