// HLS Playlist Engine: fetches the manifest and turns it into an ordered segment list.

use std::sync::Arc;

use async_trait::async_trait;
use m3u8_rs::{
    Key as M3u8Key, KeyMethod, MasterPlaylist, MediaPlaylist, VariantStream, parse_playlist_res,
};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::hls::HlsDownloaderError;
use crate::hls::config::{HlsConfig, HlsVariantSelectionPolicy};
use crate::hls::segment::{Segment, SegmentKey};

/// Source of the segment list for one download.
#[async_trait]
pub trait PlaylistProvider: Send + Sync {
    /// Loads `url` and returns its segments in playlist order. Staging paths
    /// are left unassigned.
    async fn load_segments(&self, url: &str) -> Result<Vec<Segment>, HlsDownloaderError>;
}

pub struct PlaylistEngine {
    http_client: Client,
    config: Arc<HlsConfig>,
}

#[async_trait]
impl PlaylistProvider for PlaylistEngine {
    async fn load_segments(&self, url: &str) -> Result<Vec<Segment>, HlsDownloaderError> {
        let playlist_url = Url::parse(url).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Invalid playlist URL {url}: {e}"))
        })?;

        let (media, media_url) = match self.fetch_playlist(&playlist_url).await? {
            m3u8_rs::Playlist::MediaPlaylist(pl) => (pl, playlist_url),
            m3u8_rs::Playlist::MasterPlaylist(master) => {
                let variant = select_variant(
                    &master,
                    &self.config.playlist_config.variant_selection_policy,
                )?;
                let variant_url = playlist_url.join(&variant.uri).map_err(|e| {
                    HlsDownloaderError::PlaylistError(format!(
                        "Could not join master URL with variant URI {}: {e}",
                        variant.uri
                    ))
                })?;
                info!(
                    bandwidth = variant.bandwidth,
                    url = %variant_url,
                    "Selected variant from master playlist"
                );
                match self.fetch_playlist(&variant_url).await? {
                    m3u8_rs::Playlist::MediaPlaylist(pl) => (pl, variant_url),
                    m3u8_rs::Playlist::MasterPlaylist(_) => {
                        return Err(HlsDownloaderError::PlaylistError(format!(
                            "Expected a media playlist at {variant_url}, got a master playlist"
                        )));
                    }
                }
            }
        };

        let segments = segments_from_media(&media, &media_url)?;
        info!(
            segments = segments.len(),
            media_sequence = media.media_sequence,
            "Loaded media playlist"
        );
        Ok(segments)
    }
}

impl PlaylistEngine {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    async fn fetch_playlist(&self, url: &Url) -> Result<m3u8_rs::Playlist, HlsDownloaderError> {
        debug!(url = %url, "Fetching playlist");
        let response = self
            .http_client
            .get(url.clone())
            .timeout(self.config.playlist_config.fetch_timeout)
            .send()
            .await
            .map_err(|e| HlsDownloaderError::network(url.as_str(), e))?;

        if !response.status().is_success() {
            return Err(HlsDownloaderError::HttpStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let playlist_bytes = response
            .bytes()
            .await
            .map_err(|e| HlsDownloaderError::network(url.as_str(), e))?;

        parse_playlist_res(&playlist_bytes).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Failed to parse playlist {url}: {e}"))
        })
    }
}

/// Picks one variant. I-frame-only streams are never candidates.
fn select_variant<'a>(
    master: &'a MasterPlaylist,
    policy: &HlsVariantSelectionPolicy,
) -> Result<&'a VariantStream, HlsDownloaderError> {
    let candidates = master.variants.iter().filter(|v| !v.is_i_frame);
    let selected = match policy {
        HlsVariantSelectionPolicy::HighestBitrate => candidates.max_by_key(|v| v.bandwidth),
        HlsVariantSelectionPolicy::LowestBitrate => candidates.min_by_key(|v| v.bandwidth),
        HlsVariantSelectionPolicy::ClosestToBitrate(target_bw) => {
            candidates.min_by_key(|v| v.bandwidth.abs_diff(*target_bw))
        }
    };
    selected.ok_or_else(|| {
        HlsDownloaderError::PlaylistError("Master playlist has no variants".to_string())
    })
}

/// Flattens a media playlist into segments numbered from its media sequence.
///
/// m3u8-rs attaches an `EXT-X-KEY` only to the segment right after the tag,
/// so the active key is carried forward until the next tag replaces it.
pub fn segments_from_media(
    media: &MediaPlaylist,
    base_url: &Url,
) -> Result<Vec<Segment>, HlsDownloaderError> {
    let resolve = |uri: &str| {
        base_url.join(uri).map(String::from).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!(
                "Failed to resolve URI '{uri}' with base '{base_url}': {e}"
            ))
        })
    };

    let mut active_key: Option<SegmentKey> = None;
    let mut segments = Vec::with_capacity(media.segments.len());
    for (index, media_segment) in media.segments.iter().enumerate() {
        if let Some(key) = &media_segment.key {
            active_key = segment_key(key, &resolve)?;
        }
        segments.push(Segment::new(
            media.media_sequence + index as u64,
            resolve(&media_segment.uri)?,
            active_key.clone(),
        ));
    }
    Ok(segments)
}

fn segment_key(
    key: &M3u8Key,
    resolve: &impl Fn(&str) -> Result<String, HlsDownloaderError>,
) -> Result<Option<SegmentKey>, HlsDownloaderError> {
    match &key.method {
        KeyMethod::None => Ok(None),
        KeyMethod::AES128 => {
            let uri = key.uri.as_deref().ok_or_else(|| {
                HlsDownloaderError::PlaylistError("AES-128 key without URI".to_string())
            })?;
            Ok(Some(SegmentKey {
                uri: resolve(uri)?,
                iv: key.iv.clone(),
            }))
        }
        other => Err(HlsDownloaderError::PlaylistError(format!(
            "Unsupported encryption method: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2400000
high/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1200000
mid/index.m3u8
";

    fn media(uris: &[&str]) -> String {
        let mut out = String::from(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:0\n",
        );
        for uri in uris {
            out.push_str(&format!("#EXTINF:4.0,\n{uri}\n"));
        }
        out.push_str("#EXT-X-ENDLIST\n");
        out
    }

    fn parse_media(text: &str) -> MediaPlaylist {
        match parse_playlist_res(text.as_bytes()).unwrap() {
            m3u8_rs::Playlist::MediaPlaylist(pl) => pl,
            m3u8_rs::Playlist::MasterPlaylist(_) => panic!("expected media playlist"),
        }
    }

    fn engine(policy: HlsVariantSelectionPolicy) -> PlaylistEngine {
        let mut config = HlsConfig::default();
        config.playlist_config.variant_selection_policy = policy;
        PlaylistEngine::new(Client::new(), Arc::new(config))
    }

    #[test]
    fn test_sequence_ids_and_uri_resolution() {
        let text = "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:100
#EXTINF:4.0,
a.ts
#EXTINF:4.0,
/abs/b.ts
#EXTINF:4.0,
https://other.example/c.ts
#EXT-X-ENDLIST
";
        let base = Url::parse("https://cdn.example/live/index.m3u8").unwrap();
        let segments = segments_from_media(&parse_media(text), &base).unwrap();

        let ids: Vec<u64> = segments.iter().map(|s| s.sequence_id).collect();
        assert_eq!(ids, vec![100, 101, 102]);
        assert_eq!(segments[0].uri, "https://cdn.example/live/a.ts");
        assert_eq!(segments[1].uri, "https://cdn.example/abs/b.ts");
        assert_eq!(segments[2].uri, "https://other.example/c.ts");
        assert!(segments.iter().all(|s| s.key.is_none() && !s.exists));
    }

    #[test]
    fn test_key_applies_until_replaced() {
        let text = "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXTINF:4.0,
0.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"key1.bin\"
#EXTINF:4.0,
1.ts
#EXTINF:4.0,
2.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example/k2\",IV=0x000102030405060708090a0b0c0d0e0f
#EXTINF:4.0,
3.ts
#EXT-X-KEY:METHOD=NONE
#EXTINF:4.0,
4.ts
#EXT-X-ENDLIST
";
        let base = Url::parse("https://cdn.example/v/index.m3u8").unwrap();
        let segments = segments_from_media(&parse_media(text), &base).unwrap();

        let key1 = SegmentKey {
            uri: "https://cdn.example/v/key1.bin".to_string(),
            iv: None,
        };
        assert_eq!(segments[0].key, None);
        assert_eq!(segments[1].key.as_ref(), Some(&key1));
        assert_eq!(segments[2].key.as_ref(), Some(&key1));
        let key2 = segments[3].key.as_ref().unwrap();
        assert_eq!(key2.uri, "https://keys.example/k2");
        assert_eq!(
            key2.iv.as_deref(),
            Some("0x000102030405060708090a0b0c0d0e0f")
        );
        assert_eq!(segments[4].key, None);
    }

    #[test]
    fn test_sample_aes_is_rejected() {
        let text = "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"k\"
#EXTINF:4.0,
0.ts
#EXT-X-ENDLIST
";
        let base = Url::parse("https://cdn.example/index.m3u8").unwrap();
        let err = segments_from_media(&parse_media(text), &base).unwrap_err();
        assert!(matches!(err, HlsDownloaderError::PlaylistError(_)));
    }

    #[tokio::test]
    async fn test_media_playlist_is_loaded_directly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(media(&["s0.ts", "s1.ts"])))
            .expect(1)
            .mount(&server)
            .await;

        let segments = engine(HlsVariantSelectionPolicy::default())
            .load_segments(&format!("{}/vod/index.m3u8", server.uri()))
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].uri, format!("{}/vod/s1.ts", server.uri()));
    }

    #[tokio::test]
    async fn test_master_playlist_selects_variant_by_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MASTER))
            .mount(&server)
            .await;
        for name in ["low", "mid", "high"] {
            Mock::given(method("GET"))
                .and(path(format!("/{name}/index.m3u8")))
                .respond_with(ResponseTemplate::new(200).set_body_string(media(&[&format!(
                    "{name}.ts"
                )])))
                .mount(&server)
                .await;
        }
        let url = format!("{}/master.m3u8", server.uri());

        let cases = [
            (HlsVariantSelectionPolicy::HighestBitrate, "high"),
            (HlsVariantSelectionPolicy::LowestBitrate, "low"),
            (HlsVariantSelectionPolicy::ClosestToBitrate(1_000_001), "mid"),
        ];
        for (policy, expected) in cases {
            let segments = engine(policy).load_segments(&url).await.unwrap();
            assert_eq!(
                segments[0].uri,
                format!("{}/{expected}/{expected}.ts", server.uri())
            );
        }
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = engine(HlsVariantSelectionPolicy::default())
            .load_segments(&format!("{}/missing.m3u8", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::HttpStatus { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let err = engine(HlsVariantSelectionPolicy::default())
            .load_segments("not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::PlaylistError(_)));
    }
}
