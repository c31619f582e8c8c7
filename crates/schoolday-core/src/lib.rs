//! Core library for schoolday.
//!
//! This crate contains the data pipeline behind the school meal, timetable
//! and academic schedule views:
//!
//! - `store`: string-keyed persistent storage (`MemoryStore`, `FileStore`)
//! - `cache`: time-boxed JSON cache entries under typed keys
//! - `settings`: the single owned copy of user preferences
//! - `api`: the remote school data API client
//! - `timetable`: merging fetched timetables with local user edits
//! - `meals`: incremental month-by-month meal pagination
//! - `service`: the combined view used by the UI layer

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod meals;
pub mod models;
pub mod service;
pub mod settings;
pub mod store;
pub mod timetable;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, ApiError, SchoolApi};
pub use cache::{CacheKey, CacheKind, CacheManager};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use meals::{LoadOutcome, MealFeed, MealPager, PagerOptions};
pub use service::{DayOverview, SchoolService};
pub use settings::{Settings, SettingsProvider};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use timetable::TimetableReconciler;
