//! Mediafetch - media URI resolution, conditional fetching and image decoding
//!
//! - [`resolve`] turns arbitrary input URIs into directly fetchable URLs.
//! - [`cache`] stores fetched payloads with their HTTP validators.
//! - [`fetch`] runs the fetch state machine and the worker pool.
//! - [`decode`] decodes images through a fallback chain of decoders.
//! - [`config`] loads the TOML configuration.

pub mod cache;
pub mod config;
pub mod decode;
pub mod fetch;
pub mod resolve;
