//! Trait definition and types for URI resolvers.
//!
//! A [`Resolver`] recognises URIs belonging to one external platform (a file
//! locker, a cloud drive share link, the internal `water://` scheme) and
//! rewrites them into a URL that can be fetched directly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mediafetch_common::Quality;
use url::Url;

/// Boxed cause carried by [`ResolveError::Failed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while turning an input URI into a fetchable URL.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The input could not be parsed.
    #[error("invalid uri '{uri}': {reason}")]
    InvalidInput { uri: String, reason: String },

    /// A matched resolver failed to produce a result.
    #[error("failed to resolve {uri}: {source}")]
    Failed {
        uri: String,
        #[source]
        source: BoxError,
    },
}

impl ResolveError {
    pub fn invalid_input(uri: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    pub fn failed(uri: impl fmt::Display, source: impl Into<BoxError>) -> Self {
        Self::Failed {
            uri: uri.to_string(),
            source: source.into(),
        }
    }
}

/// The outcome of resolving one input URI.
///
/// Immutable once produced. A retry after the origin rejects `uri` yields a
/// brand new `Resolution` through [`FallbackHandle::request`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Directly fetchable URL.
    pub uri: Url,
    /// The resolver believes this is video or audio, not an image.
    pub assumed_video: bool,
    /// The resolver can offer an alternative URL if `uri` is rejected.
    pub fallback_available: bool,
    /// Opaque handle used to ask the producing resolver for an alternative.
    pub fallback: FallbackHandle,
}

impl Resolution {
    pub fn new(uri: Url, assumed_video: bool) -> Self {
        Self {
            uri,
            assumed_video,
            fallback_available: false,
            fallback: FallbackHandle::none(),
        }
    }

    pub fn with_fallback_available(mut self, available: bool) -> Self {
        self.fallback_available = available;
        self
    }

    /// Bind the fallback handle to the resolver that produced this result.
    pub(crate) fn attach(mut self, resolver: Arc<dyn Resolver>, original: Url) -> Self {
        self.fallback = FallbackHandle {
            source: Some((resolver, original)),
        };
        self
    }
}

/// Handle for requesting an alternative [`Resolution`] from the resolver that
/// produced the current one. Results produced without a resolver (the
/// extension heuristic) carry an empty handle that never yields a fallback.
#[derive(Clone, Default)]
pub struct FallbackHandle {
    source: Option<(Arc<dyn Resolver>, Url)>,
}

impl FallbackHandle {
    pub fn none() -> Self {
        Self { source: None }
    }

    /// Platform of the resolver behind this handle, if any.
    pub fn platform(&self) -> Option<&'static str> {
        self.source.as_ref().map(|(resolver, _)| resolver.platform())
    }

    /// Ask the resolver for an alternative result for the original URI.
    ///
    /// Returns `None` once the resolver is exhausted; the returned result is
    /// bound to the same resolver so the chain can continue.
    pub async fn request(&self) -> Option<Resolution> {
        let (resolver, original) = self.source.as_ref()?;
        let next = resolver.fallback(original).await?;
        Some(next.attach(Arc::clone(resolver), original.clone()))
    }
}

impl fmt::Debug for FallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some((resolver, original)) => f
                .debug_struct("FallbackHandle")
                .field("platform", &resolver.platform())
                .field("original", &original.as_str())
                .finish(),
            None => f.write_str("FallbackHandle(none)"),
        }
    }
}

/// Strategy that recognises and rewrites URIs for one platform.
///
/// Resolvers are shared behind an `Arc` by the registry and may be invoked
/// concurrently for different (or the same) URIs.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Human readable platform name (e.g. `"Mediafire"`).
    fn platform(&self) -> &'static str;

    /// Cheap predicate over scheme, host and path. Must not perform I/O.
    fn is_valid(&self, uri: &Url) -> bool;

    /// Rewrite `uri` into a fetchable URL. May perform network requests.
    async fn resolve(&self, uri: &Url, quality: Option<Quality>) -> Result<Resolution, ResolveError>;

    /// Produce an alternative result after the previous URL was rejected by
    /// the origin. Once this returns `None` it must keep returning `None`.
    async fn fallback(&self, _original: &Url) -> Option<Resolution> {
        None
    }
}
