//! Per-provider data sources.
//!
//! Every source runs the same state machine per `load`:
//! `CHECK_CACHE → HIT` or `MISS → FETCH → NORMALIZE → ALIGN → STORE`.
//! Nothing is written to the cache unless every earlier stage succeeded,
//! so a failed load leaves the cache untouched.

pub mod news;
pub mod prices;
pub mod trends;

pub use news::NewsSource;
pub use prices::PriceSource;
pub use trends::TrendSource;

use crate::data::{AlignError, BatchError, CacheError, FingerprintCache, NormalizeError};
use crate::domain::{DateRange, ProviderId, Query, QueryParams, Table};
use crate::fingerprint::CacheKey;
use thiserror::Error;
use tracing::{info, warn};

/// Where a loaded table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Remote,
}

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub key: CacheKey,
    pub table: Table,
    pub origin: Origin,
    /// Value columns without a single observation in the range.
    pub dead_columns: Vec<String>,
    /// Labels of chunks that failed under a tolerant policy (remote loads only).
    pub failed_chunks: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{provider}: invalid parameters: {reason}")]
    InvalidParams { provider: ProviderId, reason: String },

    #[error("{query}: fetch failed: {source}")]
    Fetch {
        query: Query,
        #[source]
        source: BatchError,
    },

    #[error("{query}: normalization failed: {source}")]
    Normalize {
        query: Query,
        #[source]
        source: NormalizeError,
    },

    #[error("{query}: alignment failed: {source}")]
    Align {
        query: Query,
        #[source]
        source: AlignError,
    },

    #[error("{query}: cache write failed: {source}")]
    Store {
        query: Query,
        #[source]
        source: CacheError,
    },
}

impl LoadError {
    /// Stage name for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            LoadError::InvalidParams { .. } => "params",
            LoadError::Fetch { .. } => "fetch",
            LoadError::Normalize { .. } => "normalize",
            LoadError::Align { .. } => "align",
            LoadError::Store { .. } => "store",
        }
    }
}

/// A per-provider facade: fetch-or-reuse a table for a date range.
pub trait DataSource: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn cache(&self) -> &FingerprintCache;

    /// Load the table for `range` and `params`, from cache when possible.
    ///
    /// Idempotent: after the first success, identical calls are served from
    /// the cache without contacting the provider.
    fn load(&self, range: DateRange, params: &QueryParams) -> Result<Loaded, LoadError>;
}

/// A freshly fetched, normalized and (where applicable) aligned table.
pub(crate) struct Fetched {
    pub table: Table,
    pub failed_chunks: Vec<String>,
}

/// Reject parameter names a source does not understand.
pub(crate) fn check_param_names(
    provider: ProviderId,
    params: &QueryParams,
    allowed: &[&str],
) -> Result<(), LoadError> {
    let unknown: Vec<&str> = params.names().filter(|n| !allowed.contains(n)).collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(LoadError::InvalidParams {
            provider,
            reason: format!("unknown parameter(s) {unknown:?}, expected one of {allowed:?}"),
        })
    }
}

/// Serve `query` from `cache`, or run `fetch` and store its result.
pub(crate) fn load_through_cache<F>(
    cache: &FingerprintCache,
    query: Query,
    fetch: F,
) -> Result<Loaded, LoadError>
where
    F: FnOnce(&Query) -> Result<Fetched, LoadError>,
{
    let key = query.cache_key();

    if let Some(table) = cache.get(&key) {
        let dead_columns = table.dead_columns();
        return Ok(Loaded {
            key,
            table,
            origin: Origin::Cache,
            dead_columns,
            failed_chunks: Vec::new(),
        });
    }

    info!(%query, "cache miss, fetching from provider");
    let fetched = fetch(&query)?;

    if !fetched.failed_chunks.is_empty() {
        warn!(%query, failed = ?fetched.failed_chunks, "storing partial result");
    }

    cache
        .put(&key, &fetched.table)
        .map_err(|source| LoadError::Store {
            query: query.clone(),
            source,
        })?;

    let dead_columns = fetched.table.dead_columns();
    info!(%query, %key, rows = fetched.table.len(), "loaded from provider");
    Ok(Loaded {
        key,
        table: fetched.table,
        origin: Origin::Remote,
        dead_columns,
        failed_chunks: fetched.failed_chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_param_names_are_rejected() {
        let params = QueryParams::new()
            .with_scalar("interval", "1d")
            .with_list("tikcers", ["BTC-USD"]);
        let err = check_param_names(ProviderId::Prices, &params, &["tickers", "interval"])
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidParams { .. }));
        assert!(err.to_string().contains("tikcers"));

        let ok = QueryParams::new().with_scalar("interval", "1d");
        assert!(check_param_names(ProviderId::Prices, &ok, &["tickers", "interval"]).is_ok());
    }
}
