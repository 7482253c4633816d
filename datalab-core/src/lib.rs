//! DataLab Core: acquisition, caching and alignment of time-series data.
//!
//! This crate contains the data-acquisition layer:
//! - Domain types (date ranges, intervals, queries, tables)
//! - Deterministic cache keys and a file-backed fingerprint cache
//! - Chunked, rate-limited remote fetching with per-source failure policy
//! - Column normalization and calendar alignment with forward/backward fill
//! - Provider traits plus HTTP shims (Yahoo, Google Trends, NewsAPI)
//! - Per-provider data sources composing all of the above

pub mod config;
pub mod data;
pub mod domain;
pub mod fingerprint;
pub mod providers;
pub mod sources;

pub use config::DataConfig;
pub use domain::{DateRange, Interval, ProviderId, QueryParams, Table};
pub use fingerprint::{build_cache_key, CacheKey};
pub use sources::{DataSource, LoadError, Loaded, NewsSource, Origin, PriceSource, TrendSource};
