//! Local caching module for fetched collections.
//!
//! This module provides the `CacheManager` for storing and retrieving API
//! results through the key-value store. Entries are JSON encoded together
//! with their creation time and are considered gone when either:
//! - the local calendar day has changed since they were written (the entry
//!   is deleted on read), or
//! - more than 3 hours have passed (the entry is ignored until overwritten).
//!
//! Keys are built with `CacheKey` so every entry lives under the `@cache/`
//! namespace, grouped by `CacheKind`.

pub mod key;
pub mod manager;

pub use key::{CacheKey, CacheKind, CACHE_NAMESPACE};
pub use manager::{CacheEntry, CacheManager, Expiry, CACHE_MAX_AGE_HOURS};
