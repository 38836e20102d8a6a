//! Fetching: the orchestrator, its error taxonomy and the worker pool.
//!
//! - [`fetcher`] -- [`ImageFetcher`], the resolve/fetch/classify/decode
//!   state machine.
//! - [`pool`] -- [`FetchPool`], bounded parallel execution with
//!   caller-runs backpressure and exactly-once delivery.
//! - [`classify`] -- Content type and extension classification.
//! - [`headers`] -- HTTP dates, conditional headers and validators.
//! - [`error`] -- [`FetchError`] and [`FetchFailure`].

pub mod classify;
pub mod error;
pub mod fetcher;
pub mod headers;
pub mod pool;

pub use error::{FetchError, FetchFailure};
pub use fetcher::{build_client, FetchOutcome, ImageFetcher};
pub use pool::{Delivery, DeliveryResult, FetchPool};
