//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which starts a wiremock server and wires an
//! [`ImageFetcher`] to an empty [`ResolverRegistry`] and an in-memory
//! [`MemoryCache`]. Tests register their own resolvers and mocks.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use url::Url;
use wiremock::MockServer;

use mediafetch::cache::MemoryCache;
use mediafetch::decode::{DecodeChain, DecodeError, DecodeLimits, Frame, FrameDecoder, StaticImageDecoder};
use mediafetch::fetch::ImageFetcher;
use mediafetch::resolve::{Resolution, ResolveError, Resolver, ResolverRegistry};
use mediafetch_common::Quality;

pub struct TestHarness {
    pub server: MockServer,
    pub registry: Arc<ResolverRegistry>,
    pub cache: Arc<MemoryCache>,
    pub fetcher: Arc<ImageFetcher>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_decoder(DecodeChain::new()).await
    }

    /// Harness whose fetcher decodes through `chain`.
    pub async fn with_decoder(chain: DecodeChain) -> Self {
        let server = MockServer::start().await;
        let registry = Arc::new(ResolverRegistry::new());
        let cache = Arc::new(MemoryCache::new());
        let fetcher = ImageFetcher::new(registry.clone(), cache.clone(), reqwest::Client::new())
            .with_decoder(Arc::new(chain));

        Self {
            server,
            registry,
            cache,
            fetcher: Arc::new(fetcher),
        }
    }

    /// Absolute URL on the mock server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub fn parsed(&self, path: &str) -> Url {
        Url::parse(&self.url(path)).unwrap()
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// An animated GIF with one solid frame per `(rgb, delay_centis)` pair.
pub fn gif_bytes(frames: &[([u8; 3], u16)]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, 4, 4, &[]).unwrap();
        encoder.set_repeat(gif::Repeat::Infinite).unwrap();
        for (rgb, delay) in frames {
            let mut frame = gif::Frame::from_palette_pixels(4, 4, vec![0u8; 16], rgb.to_vec(), None);
            frame.delay = *delay;
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

/// A tiny GIF whose logical screen claims `width` x `height`, holding
/// `frames` single-pixel frames.
pub fn gif_on_screen(width: u16, height: u16, frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &[]).unwrap();
        for _ in 0..frames {
            let frame = gif::Frame::from_palette_pixels(1, 1, vec![0u8], vec![255, 0, 0], None);
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

/// Claims URLs under `/guarded/` and rewrites them to `primary`, offering
/// `fallback` once the origin rejects it.
pub struct GuardedResolver {
    pub primary: Url,
    pub fallback: Option<Url>,
    pub resolve_calls: AtomicUsize,
    pub fallback_calls: AtomicUsize,
}

impl GuardedResolver {
    pub fn new(primary: Url, fallback: Option<Url>) -> Arc<Self> {
        Arc::new(Self {
            primary,
            fallback,
            resolve_calls: AtomicUsize::new(0),
            fallback_calls: AtomicUsize::new(0),
        })
    }

    pub fn fallback_calls(&self) -> usize {
        self.fallback_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for GuardedResolver {
    fn platform(&self) -> &'static str {
        "Guarded"
    }

    fn is_valid(&self, uri: &Url) -> bool {
        uri.path().starts_with("/guarded/")
    }

    async fn resolve(&self, _uri: &Url, _quality: Option<Quality>) -> Result<Resolution, ResolveError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Resolution::new(self.primary.clone(), false).with_fallback_available(self.fallback.is_some()))
    }

    async fn fallback(&self, _original: &Url) -> Option<Resolution> {
        // Only the first call yields the alternative.
        let n = self.fallback_calls.fetch_add(1, Ordering::SeqCst);
        match (&self.fallback, n) {
            (Some(url), 0) => Some(Resolution::new(url.clone(), false)),
            _ => None,
        }
    }
}

/// Claims `panic.test` and panics while resolving.
pub struct PanickingResolver;

#[async_trait]
impl Resolver for PanickingResolver {
    fn platform(&self) -> &'static str {
        "Panicking"
    }

    fn is_valid(&self, uri: &Url) -> bool {
        uri.host_str() == Some("panic.test")
    }

    async fn resolve(&self, _uri: &Url, _quality: Option<Quality>) -> Result<Resolution, ResolveError> {
        panic!("resolver exploded");
    }
}

/// A GIF-capable general-purpose decoder that always fails mid-stream.
pub struct BrokenGifDecoder;

impl FrameDecoder for BrokenGifDecoder {
    fn name(&self) -> &'static str {
        "broken-gif"
    }

    fn supports(&self, format: ImageFormat) -> bool {
        format == ImageFormat::Gif
    }

    fn decode(
        &self,
        _bytes: &[u8],
        _format: ImageFormat,
        _limits: &DecodeLimits,
    ) -> Result<Vec<Frame>, DecodeError> {
        Err(DecodeError::Empty)
    }
}

/// Chain whose only GIF candidate is broken.
pub fn chain_with_broken_gif() -> DecodeChain {
    DecodeChain::with_candidates(vec![
        Arc::new(BrokenGifDecoder) as Arc<dyn FrameDecoder>,
        Arc::new(StaticImageDecoder),
    ])
}
