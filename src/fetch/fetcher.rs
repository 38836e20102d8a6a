//! The fetch orchestrator.
//!
//! One call to [`ImageFetcher::fetch`] resolves the input, fetches the
//! resolved URL with conditional validators, classifies the payload,
//! decodes it, and degrades to previously cached bytes when the transport
//! fails. Bodies are read up to a size limit and decoded within the decode
//! chain's limits.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use mediafetch_common::paths::classify_path;
use mediafetch_common::MediaKind;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use super::classify::{classify, classify_content_type};
use super::error::{FetchError, FetchFailure};
use super::headers::{conditional_headers, validators_from_headers};
use crate::cache::{self, CacheEntry, FetchCache};
use crate::config::{Config, FetchConfig};
use crate::decode::{DecodeChain, DecodeLimits, DecodedImage};
use crate::resolve::{parse_uri, Resolution, ResolverRegistry};

/// A successful fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub image: DecodedImage,
    /// The bytes came from the fetch cache (304 or stale fallback).
    pub from_cache: bool,
    /// The URL the bytes were ultimately read from.
    pub resolved: Url,
}

pub struct ImageFetcher {
    registry: Arc<ResolverRegistry>,
    cache: Arc<dyn FetchCache>,
    client: reqwest::Client,
    decoder: Arc<DecodeChain>,
    max_body_bytes: u64,
}

/// Body limit used unless configured otherwise.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

impl ImageFetcher {
    pub fn new(
        registry: Arc<ResolverRegistry>,
        cache: Arc<dyn FetchCache>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            registry,
            cache,
            client,
            decoder: Arc::new(DecodeChain::new()),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Wire up the built-in resolvers, the configured cache backend and an
    /// HTTP client from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = build_client(&config.fetch)?;
        let registry = Arc::new(ResolverRegistry::with_builtins(
            &config.resolver,
            client.clone(),
        ));
        let cache = cache::from_config(&config.cache)?;
        let limits = DecodeLimits::new(
            config.fetch.max_image_dimension,
            config.fetch.max_decoded_pixels,
        );

        Ok(Self::new(registry, cache, client)
            .with_decoder(Arc::new(DecodeChain::new().with_limits(limits)))
            .with_max_body_bytes(config.fetch.max_body_bytes))
    }

    pub fn with_decoder(mut self, decoder: Arc<DecodeChain>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<dyn FetchCache> {
        &self.cache
    }

    /// Fetch and decode `input`. Failures carry the original input.
    pub async fn fetch(&self, input: &str) -> Result<FetchOutcome, FetchFailure> {
        match self.run(input).await {
            Ok(outcome) => {
                debug!(
                    uri = input,
                    resolved = %outcome.resolved,
                    frames = outcome.image.frame_count(),
                    from_cache = outcome.from_cache,
                    "Fetched image"
                );
                Ok(outcome)
            }
            Err(error) => {
                debug!(uri = input, kind = error.kind(), error = %error, "Fetch failed");
                Err(FetchFailure::new(input, error))
            }
        }
    }

    async fn run(&self, input: &str) -> Result<FetchOutcome, FetchError> {
        let uri = parse_uri(input)?;
        let mut resolution = self.registry.resolve(&uri).await?;
        let mut attempted = Vec::new();

        loop {
            if resolution.assumed_video {
                return Err(FetchError::video_or_audio(
                    &resolution.uri,
                    "resolved to a video or audio resource",
                ));
            }

            attempted.push(resolution.uri.clone());
            let error = match self.attempt(&resolution).await {
                Ok(outcome) => return Ok(outcome),
                Err(FetchError::Forbidden { uri }) => match resolution.fallback.request().await {
                    Some(next) => {
                        info!(
                            rejected = %uri,
                            fallback = %next.uri,
                            platform = resolution.fallback.platform().unwrap_or("none"),
                            "Origin refused resolved url, retrying with fallback"
                        );
                        resolution = next;
                        continue;
                    }
                    None => FetchError::Forbidden { uri },
                },
                Err(other) => other,
            };

            return self.serve_stale(&attempted, error).await;
        }
    }

    async fn attempt(&self, resolution: &Resolution) -> Result<FetchOutcome, FetchError> {
        if resolution.uri.scheme() == "file" {
            self.load_local(&resolution.uri).await
        } else {
            self.fetch_remote(&resolution.uri).await
        }
    }

    /// Local files bypass the fetch cache and are classified by extension.
    async fn load_local(&self, uri: &Url) -> Result<FetchOutcome, FetchError> {
        let path = uri
            .to_file_path()
            .map_err(|_| FetchError::InvalidInput(format!("'{uri}' is not a local path")))?;

        ensure_image(classify_path(&path.to_string_lossy()), uri, "file extension")?;

        let bytes = tokio::fs::read(&path).await.map_err(|source| FetchError::Io {
            uri: uri.to_string(),
            source,
        })?;
        let image = self.decode(uri, Bytes::from(bytes)).await?;

        Ok(FetchOutcome {
            image,
            from_cache: false,
            resolved: uri.clone(),
        })
    }

    async fn fetch_remote(&self, uri: &Url) -> Result<FetchOutcome, FetchError> {
        let cached = self.cached_entry(uri).await;

        let mut request = self.client.get(uri.clone()).header(ACCEPT, "image/*");
        if let Some(entry) = &cached {
            request = request.headers(conditional_headers(&entry.validators));
        }

        let response = request.send().await.map_err(|source| FetchError::Network {
            uri: uri.to_string(),
            source,
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_MODIFIED => {}
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST => return Err(FetchError::BadRequest { uri: uri.to_string() }),
            StatusCode::FORBIDDEN => return Err(FetchError::Forbidden { uri: uri.to_string() }),
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound { uri: uri.to_string() }),
            other => {
                return Err(FetchError::UnexpectedStatus {
                    uri: uri.to_string(),
                    status: other,
                })
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let validators = validators_from_headers(response.headers(), Utc::now());

        if status == StatusCode::NOT_MODIFIED {
            let Some(entry) = cached else {
                return Err(FetchError::UnexpectedStatus {
                    uri: uri.to_string(),
                    status,
                });
            };
            drop(response);

            // A 304 without a content type trusts the cached entry.
            if let Some(ct) = content_type.as_deref() {
                ensure_image(classify_content_type(ct), uri, ct)?;
            }

            if let Err(e) = self.cache.refresh(uri, validators).await {
                warn!(uri = %uri, error = %e, "Failed to refresh cache validators");
            }
            let payload = self
                .cache
                .payload(uri)
                .await
                .ok()
                .flatten()
                .ok_or_else(|| {
                    FetchError::fatal(format!(
                        "cached payload for {} ({} bytes) is gone",
                        entry.uri, entry.len
                    ))
                })?;

            debug!(uri = %uri, "Not modified, decoding cached payload");
            let image = self.decode(uri, payload).await?;
            return Ok(FetchOutcome {
                image,
                from_cache: true,
                resolved: uri.clone(),
            });
        }

        let kind = classify(content_type.as_deref(), uri.path());
        ensure_image(kind, uri, content_type.as_deref().unwrap_or("file extension"))?;

        let body = self.read_body(uri, response).await?;

        if let Err(e) = self.cache.store(uri, validators, body.clone()).await {
            warn!(uri = %uri, error = %e, "Failed to store fetched payload");
        }

        let image = self.decode(uri, body).await?;
        Ok(FetchOutcome {
            image,
            from_cache: false,
            resolved: uri.clone(),
        })
    }

    /// Read the body in chunks, giving up as soon as it outgrows the limit.
    async fn read_body(
        &self,
        uri: &Url,
        mut response: reqwest::Response,
    ) -> Result<Bytes, FetchError> {
        let limit = self.max_body_bytes;
        let too_large = || FetchError::TooLarge {
            uri: uri.to_string(),
            limit,
        };

        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|source| FetchError::Network {
            uri: uri.to_string(),
            source,
        })? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Decode previously cached bytes after a transport failure. Uses the
    /// most recently refreshed entry among the attempted URLs, expired or
    /// not. Without one, the original error is returned.
    async fn serve_stale(
        &self,
        attempted: &[Url],
        error: FetchError,
    ) -> Result<FetchOutcome, FetchError> {
        if !error.allows_stale_fallback() {
            return Err(error);
        }

        let mut newest: Option<CacheEntry> = None;
        for uri in attempted {
            if let Some(entry) = self.cached_entry(uri).await {
                if newest
                    .as_ref()
                    .map_or(true, |n| entry.refreshed_at > n.refreshed_at)
                {
                    newest = Some(entry);
                }
            }
        }

        let Some(entry) = newest else {
            return Err(error);
        };
        let Some(payload) = self.cache.payload(&entry.uri).await.ok().flatten() else {
            return Err(error);
        };

        warn!(
            uri = %entry.uri,
            expired = entry.is_expired(),
            error = %error,
            "Fetch failed, serving cached copy"
        );

        match self.decode(&entry.uri, payload).await {
            Ok(image) => Ok(FetchOutcome {
                image,
                from_cache: true,
                resolved: entry.uri,
            }),
            Err(decode_error) => {
                warn!(uri = %entry.uri, error = %decode_error, "Cached copy is not decodable");
                Err(error)
            }
        }
    }

    /// Cache lookups never fail a fetch; backend errors count as a miss.
    async fn cached_entry(&self, uri: &Url) -> Option<CacheEntry> {
        match self.cache.entry(uri).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(uri = %uri, error = %e, "Fetch cache lookup failed");
                None
            }
        }
    }

    async fn decode(&self, uri: &Url, bytes: Bytes) -> Result<DecodedImage, FetchError> {
        let chain = Arc::clone(&self.decoder);
        tokio::task::spawn_blocking(move || chain.decode(&bytes))
            .await
            .map_err(|e| FetchError::fatal(format!("decode task for {uri} failed: {e}")))?
            .map_err(|source| FetchError::Decode {
                uri: uri.to_string(),
                source,
            })
    }
}

/// HTTP client used for fetches and resolver lookups.
pub fn build_client(config: &FetchConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
}

fn ensure_image(kind: MediaKind, uri: &Url, evidence: &str) -> Result<(), FetchError> {
    match kind {
        MediaKind::Image => Ok(()),
        MediaKind::Video | MediaKind::Audio => Err(FetchError::video_or_audio(uri, evidence)),
        MediaKind::Unknown => Err(FetchError::not_an_image(uri, evidence)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::decode::fixtures;

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(
            Arc::new(ResolverRegistry::new()),
            Arc::new(MemoryCache::new()),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn ensure_image_maps_kinds() {
        let uri = Url::parse("https://example.com/x").unwrap();
        assert!(ensure_image(MediaKind::Image, &uri, "image/png").is_ok());
        assert!(ensure_image(MediaKind::Audio, &uri, "audio/ogg")
            .unwrap_err()
            .is_video_or_audio());
        assert!(matches!(
            ensure_image(MediaKind::Unknown, &uri, "text/html"),
            Err(FetchError::NotAnImage { .. })
        ));
    }

    #[tokio::test]
    async fn local_png_is_decoded_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        std::fs::write(&path, fixtures::png(2, 2)).unwrap();

        let fetcher = fetcher();
        let outcome = fetcher.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(outcome.image.frame_count(), 1);
        assert!(!outcome.from_cache);
        assert!(fetcher.cache().entry(&outcome.resolved).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_file_with_unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let failure = fetcher().fetch(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(failure.error, FetchError::NotAnImage { .. }));
        assert!(!failure.is_video_or_audio());
    }

    #[tokio::test]
    async fn video_extension_short_circuits() {
        let failure = fetcher()
            .fetch("https://example.invalid/clips/movie.mkv")
            .await
            .unwrap_err();
        assert!(failure.is_video_or_audio());
        assert_eq!(failure.uri, "https://example.invalid/clips/movie.mkv");
    }

    #[tokio::test]
    async fn invalid_input_is_reported() {
        let failure = fetcher().fetch("   ").await.unwrap_err();
        assert!(matches!(failure.error, FetchError::InvalidInput(_)));

        let failure = fetcher().fetch("not a uri").await.unwrap_err();
        assert!(matches!(failure.error, FetchError::InvalidInput(_)));
        assert!(!failure.is_video_or_audio());
    }

    #[tokio::test]
    async fn unfetchable_scheme_goes_to_playback() {
        let failure = fetcher().fetch("rtsp://camera.local/live").await.unwrap_err();
        assert!(failure.is_video_or_audio());
        assert_eq!(failure.uri, "rtsp://camera.local/live");
    }

    #[test]
    fn client_builds_from_defaults() {
        assert!(build_client(&FetchConfig::default()).is_ok());
    }
}
