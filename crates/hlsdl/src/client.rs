//! Shared HTTP client construction.
//!
//! One `reqwest::Client` is built per downloader and cloned into every fetch
//! task; the client holds no per-request mutable state.

use reqwest::{Client, Proxy};
use tracing::{debug, info};

use crate::{DownloadError, DownloaderConfig};

/// Proxy protocol
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
    /// Route every scheme through the proxy
    All,
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    /// Converts into a reqwest proxy, attaching basic auth when configured.
    pub fn to_proxy(&self) -> Result<Proxy, String> {
        let proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(&self.url),
            ProxyType::Https => Proxy::https(&self.url),
            ProxyType::Socks5 if self.url.starts_with("socks5://") => Proxy::all(&self.url),
            ProxyType::Socks5 => Proxy::all(format!("socks5://{}", self.url)),
            ProxyType::All => Proxy::all(&self.url),
        }
        .map_err(|e| format!("Invalid {:?} proxy URL {}: {e}", self.proxy_type, self.url))?;

        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}

/// Create a reqwest Client with the provided configuration.
///
/// Configured headers become the client's default headers so they are sent
/// with every segment, key, playlist and HEAD request.
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(16)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.pool_idle_timeout(config.read_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        let proxy = proxy_config.to_proxy().map_err(DownloadError::Config)?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled");
    }

    client_builder.build().map_err(DownloadError::Client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_scheme_is_added() {
        let config = ProxyConfig {
            url: "127.0.0.1:1080".to_string(),
            proxy_type: ProxyType::Socks5,
            auth: None,
        };
        assert!(config.to_proxy().is_ok());
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = DownloaderConfig {
            proxy: Some(ProxyConfig {
                url: "::not a url::".to_string(),
                proxy_type: ProxyType::Http,
                auth: None,
            }),
            ..Default::default()
        };
        assert!(matches!(
            create_client(&config),
            Err(DownloadError::Config(_))
        ));
    }

    #[test]
    fn test_default_client_builds() {
        assert!(create_client(&DownloaderConfig::default()).is_ok());
    }
}
