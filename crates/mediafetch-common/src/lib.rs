//! Mediafetch-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across mediafetch:
//!
//! - **Core Types**: The media kind taxonomy and quality hints
//! - **Path Utilities**: Functions to classify files by extension
//! - **Error Handling**: The storage error type and result alias
//!
//! # Examples
//!
//! ```
//! use mediafetch_common::{Error, MediaKind, Result};
//! use mediafetch_common::paths::classify_path;
//!
//! assert_eq!(classify_path("/clips/intro.mkv"), MediaKind::Video);
//! assert!(classify_path("cover.png").is_image());
//!
//! fn example() -> Result<()> {
//!     Err(Error::serialization("corrupt cache entry"))
//! }
//! ```

pub mod error;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
