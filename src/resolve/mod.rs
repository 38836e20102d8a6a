//! URI resolution: turning arbitrary media URIs into fetchable URLs.
//!
//! # Module layout
//!
//! - [`resolver`] -- The [`Resolver`] trait, [`Resolution`] and errors.
//! - [`registry`] -- Ordered first-match registry with a TTL result cache.
//! - [`ttl_cache`] -- The TTL cache and its injectable [`Clock`].
//! - [`uri`] -- Input parsing and the extension heuristic for unclaimed URIs.
//! - [`resolvers`] -- Built-in resolvers (`water://`, MediaFire, OneDrive).

pub mod registry;
pub mod resolver;
pub mod resolvers;
pub mod ttl_cache;
pub mod uri;

pub use registry::{ResolverRegistry, DEFAULT_RESOLUTION_TTL};
pub use resolver::{BoxError, FallbackHandle, Resolution, ResolveError, Resolver};
pub use ttl_cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use uri::{heuristic_resolution, parse_uri};
