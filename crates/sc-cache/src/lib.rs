//! # sc-cache
//!
//! Cache engine contract shared by storage backends.
//!
//! This crate defines the [`CacheEngine`] capability trait, the error type
//! every engine reports, and the value codec used to store values as strings.
//! The Redis implementation lives in `sc-cache-redis`.
//!
//! ## Example
//!
//! ```ignore
//! use sc_cache::{CacheEngine, CacheResult};
//! use std::time::Duration;
//!
//! async fn remember_user(cache: &impl CacheEngine, id: u64, name: &str) -> CacheResult<bool> {
//!     cache.set(&format!("user:{id}"), &name, Some(Duration::from_secs(3600))).await
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod engine;
pub mod error;
pub mod key;

pub use engine::CacheEngine;
pub use error::{CacheError, CacheResult};
