//! Resolver registry: ordered first-match resolution with a TTL result cache.
//!
//! The [`ResolverRegistry`] owns an ordered list of [`Resolver`]s. For each
//! input URI the first resolver whose [`Resolver::is_valid`] accepts it is
//! used exclusively. Matched results are cached for a short fixed TTL; URIs
//! that no resolver claims go through the extension heuristic uncached.

use std::sync::Arc;
use std::time::Duration;

use mediafetch_common::Quality;
use parking_lot::RwLock;
use tracing::{debug, info};
use url::Url;

use super::resolver::{Resolution, ResolveError, Resolver};
use super::resolvers;
use super::ttl_cache::TtlCache;
use super::uri::heuristic_resolution;
use crate::config::ResolverConfig;

/// How long a matched resolution stays cached.
pub const DEFAULT_RESOLUTION_TTL: Duration = Duration::from_secs(10);

/// Ordered collection of resolvers plus their result cache.
///
/// Lifecycle is explicit: construct, register built-ins (or custom
/// resolvers), share the instance behind an `Arc` with every consumer, and
/// [`clear`](Self::clear) it on shutdown.
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use mediafetch::resolve::ResolverRegistry;
///
/// let registry = ResolverRegistry::new();
/// registry.register(Arc::new(my_resolver));
///
/// let resolution = registry.resolve(&url).await?;
/// ```
pub struct ResolverRegistry {
    resolvers: RwLock<Vec<Arc<dyn Resolver>>>,
    cache: TtlCache<Url, Resolution>,
}

impl ResolverRegistry {
    /// Create an empty registry using the wall clock and the default TTL.
    pub fn new() -> Self {
        Self::with_cache(TtlCache::new(DEFAULT_RESOLUTION_TTL))
    }

    /// Create an empty registry around a caller-supplied cache, e.g. one
    /// driven by a manual clock.
    pub fn with_cache(cache: TtlCache<Url, Resolution>) -> Self {
        Self {
            resolvers: RwLock::new(Vec::new()),
            cache,
        }
    }

    /// Create a registry with the built-in resolvers registered in order:
    /// `Local`, `Mediafire`, `OneDrive`.
    pub fn with_builtins(config: &ResolverConfig, client: reqwest::Client) -> Self {
        let registry = Self::with_cache(TtlCache::new(Duration::from_secs(config.ttl_secs)));
        for resolver in resolvers::builtins(config, client) {
            registry.register(resolver);
        }
        registry
    }

    /// Append a resolver. Registering the same instance twice is a no-op.
    ///
    /// Returns `true` when the resolver was added.
    pub fn register(&self, resolver: Arc<dyn Resolver>) -> bool {
        let mut resolvers = self.resolvers.write();
        if resolvers.iter().any(|r| same_resolver(r, &resolver)) {
            return false;
        }
        info!(platform = resolver.platform(), "Registered resolver");
        resolvers.push(resolver);
        true
    }

    /// Remove a previously registered resolver instance.
    ///
    /// Returns `true` when the resolver was present.
    pub fn unregister(&self, resolver: &Arc<dyn Resolver>) -> bool {
        let mut resolvers = self.resolvers.write();
        let before = resolvers.len();
        resolvers.retain(|r| !same_resolver(r, resolver));
        let removed = resolvers.len() != before;
        if removed {
            info!(platform = resolver.platform(), "Unregistered resolver");
        }
        removed
    }

    /// Platform names of all registered resolvers, in registration order.
    pub fn platforms(&self) -> Vec<&'static str> {
        self.resolvers.read().iter().map(|r| r.platform()).collect()
    }

    pub fn len(&self) -> usize {
        self.resolvers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.read().is_empty()
    }

    /// Drop every resolver and cached result.
    pub fn clear(&self) {
        self.resolvers.write().clear();
        self.cache.clear();
    }

    /// Resolve `uri` without a quality preference.
    pub async fn resolve(&self, uri: &Url) -> Result<Resolution, ResolveError> {
        self.resolve_with_quality(uri, None).await
    }

    /// Resolve `uri`, passing `quality` to the matched resolver.
    ///
    /// Only the first matching resolver is consulted. Its failure is returned
    /// unchanged; no other resolver is tried.
    pub async fn resolve_with_quality(
        &self,
        uri: &Url,
        quality: Option<Quality>,
    ) -> Result<Resolution, ResolveError> {
        let Some(resolver) = self.matching(uri) else {
            return Ok(heuristic_resolution(uri));
        };

        self.cache
            .get_or_try_insert_with(uri.clone(), || async {
                debug!(uri = %uri, platform = resolver.platform(), "Resolving uri");
                let resolution = resolver.resolve(uri, quality).await?;
                Ok::<_, ResolveError>(resolution.attach(Arc::clone(&resolver), uri.clone()))
            })
            .await
    }

    /// First resolver claiming `uri`. The read lock is held only for the
    /// traversal.
    fn matching(&self, uri: &Url) -> Option<Arc<dyn Resolver>> {
        self.resolvers
            .read()
            .iter()
            .find(|r| r.is_valid(uri))
            .cloned()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn same_resolver(a: &Arc<dyn Resolver>, b: &Arc<dyn Resolver>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ttl_cache::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A minimal stub resolver used for testing.
    struct StubResolver {
        name: &'static str,
        host: &'static str,
        target: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubResolver {
        fn new(name: &'static str, host: &'static str, target: &'static str) -> Self {
            Self {
                name,
                host,
                target,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str, host: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, host, "https://unused.test/")
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Resolver for StubResolver {
        fn platform(&self) -> &'static str {
            self.name
        }

        fn is_valid(&self, uri: &Url) -> bool {
            uri.host_str() == Some(self.host)
        }

        async fn resolve(
            &self,
            uri: &Url,
            _quality: Option<Quality>,
        ) -> Result<Resolution, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolveError::failed(uri, "page layout changed"));
            }
            Ok(Resolution::new(Url::parse(self.target).unwrap(), false))
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn empty_registry() {
        let registry = ResolverRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.platforms().is_empty());
    }

    #[test]
    fn register_is_idempotent() {
        let registry = ResolverRegistry::new();
        let resolver: Arc<dyn Resolver> =
            Arc::new(StubResolver::new("a", "a.test", "https://cdn.test/a.png"));

        assert!(registry.register(Arc::clone(&resolver)));
        assert!(!registry.register(Arc::clone(&resolver)));
        assert_eq!(registry.platforms(), vec!["a"]);

        assert!(registry.unregister(&resolver));
        assert!(!registry.unregister(&resolver));
        assert!(registry.is_empty());
    }

    #[test]
    fn platforms_keep_registration_order() {
        let registry = ResolverRegistry::new();
        registry.register(Arc::new(StubResolver::new("first", "1.test", "https://x.test/")));
        registry.register(Arc::new(StubResolver::new("second", "2.test", "https://x.test/")));
        assert_eq!(registry.platforms(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn first_match_is_exclusive() {
        let registry = ResolverRegistry::new();
        let a = Arc::new(StubResolver::new("a", "shared.test", "https://cdn.test/from-a.png"));
        let b = Arc::new(StubResolver::new("b", "shared.test", "https://cdn.test/from-b.png"));
        registry.register(a.clone());
        registry.register(b.clone());

        let resolution = registry.resolve(&url("https://shared.test/x")).await.unwrap();
        assert_eq!(resolution.uri.as_str(), "https://cdn.test/from-a.png");
        assert_eq!(resolution.fallback.platform(), Some("a"));
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn failure_does_not_cascade() {
        let registry = ResolverRegistry::new();
        let broken = Arc::new(StubResolver::failing("broken", "shared.test"));
        let backup = Arc::new(StubResolver::new("backup", "shared.test", "https://cdn.test/b.png"));
        registry.register(broken.clone());
        registry.register(backup.clone());

        let err = registry.resolve(&url("https://shared.test/x")).await.unwrap_err();
        assert!(matches!(err, ResolveError::Failed { .. }));
        assert_eq!(broken.calls(), 1);
        assert_eq!(backup.calls(), 0);

        // Failures are not cached.
        let _ = registry.resolve(&url("https://shared.test/x")).await;
        assert_eq!(broken.calls(), 2);
    }

    #[tokio::test]
    async fn cached_until_ttl_expires() {
        let clock = Arc::new(ManualClock::new(50_000));
        let registry =
            ResolverRegistry::with_cache(TtlCache::with_clock(DEFAULT_RESOLUTION_TTL, clock.clone()));
        let stub = Arc::new(StubResolver::new("a", "a.test", "https://cdn.test/a.png"));
        registry.register(stub.clone());

        let input = url("https://a.test/file/1");
        registry.resolve(&input).await.unwrap();
        clock.advance(Duration::from_secs(5));
        registry.resolve(&input).await.unwrap();
        assert_eq!(stub.calls(), 1);

        clock.advance(DEFAULT_RESOLUTION_TTL + Duration::from_millis(1));
        registry.resolve(&input).await.unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn expired_resolutions_do_not_accumulate() {
        let clock = Arc::new(ManualClock::new(0));
        let registry =
            ResolverRegistry::with_cache(TtlCache::with_clock(DEFAULT_RESOLUTION_TTL, clock.clone()));
        registry.register(Arc::new(StubResolver::new("a", "a.test", "https://cdn.test/a.png")));

        for i in 0..50 {
            registry.resolve(&url(&format!("https://a.test/file/{i}"))).await.unwrap();
            clock.advance(DEFAULT_RESOLUTION_TTL + Duration::from_millis(1));
        }
        assert_eq!(registry.cache.len(), 1);
    }

    #[tokio::test]
    async fn unmatched_uri_uses_uncached_heuristic() {
        let registry = ResolverRegistry::new();
        registry.register(Arc::new(StubResolver::new("a", "a.test", "https://cdn.test/a.png")));

        let resolution = registry.resolve(&url("https://other.test/clip.mp4")).await.unwrap();
        assert!(resolution.assumed_video);
        assert!(resolution.fallback.platform().is_none());
        assert!(registry.cache.is_empty());
    }

    #[tokio::test]
    async fn clear_drops_resolvers_and_cache() {
        let registry = ResolverRegistry::new();
        registry.register(Arc::new(StubResolver::new("a", "a.test", "https://cdn.test/a.png")));
        registry.resolve(&url("https://a.test/x")).await.unwrap();
        assert_eq!(registry.cache.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.cache.is_empty());
    }

    #[test]
    fn builtins_are_registered_in_order() {
        let registry =
            ResolverRegistry::with_builtins(&ResolverConfig::default(), reqwest::Client::new());
        assert_eq!(registry.platforms(), vec!["Local", "Mediafire", "OneDrive"]);
    }
}
