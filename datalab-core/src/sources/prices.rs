//! Price source: OHLCV per ticker, aligned onto the interval calendar.
//!
//! Params: `tickers` (list, defaults from settings), `interval` (scalar,
//! defaults from settings). Tickers are fetched in chunks; a failed chunk
//! is tolerated as long as at least one chunk succeeds.

use super::{check_param_names, load_through_cache, DataSource, Fetched, LoadError, Loaded};
use crate::config::PriceSettings;
use crate::data::{
    align, chunk_list, ColumnNormalizer, FailurePolicy, FingerprintCache, NamingContext,
    PriceProvider, RemoteBatcher,
};
use crate::domain::{DateRange, Interval, ProviderId, Query, QueryParams};
use std::path::Path;
use std::sync::Arc;

pub const PARAM_TICKERS: &str = "tickers";
pub const PARAM_INTERVAL: &str = "interval";

pub struct PriceSource {
    provider: Arc<dyn PriceProvider>,
    cache: FingerprintCache,
    settings: PriceSettings,
}

impl PriceSource {
    pub fn new(provider: Arc<dyn PriceProvider>, cache_root: &Path, settings: PriceSettings) -> Self {
        Self {
            provider,
            cache: FingerprintCache::new(cache_root, ProviderId::Prices.dir_name()),
            settings,
        }
    }

    /// Resolve defaults and validate. The returned params address the cache.
    fn resolve(&self, params: &QueryParams) -> Result<(Vec<String>, Interval, QueryParams), LoadError> {
        check_param_names(ProviderId::Prices, params, &[PARAM_TICKERS, PARAM_INTERVAL])?;
        let invalid = |reason: String| LoadError::InvalidParams {
            provider: ProviderId::Prices,
            reason,
        };

        let tickers: Vec<String> = params
            .list(PARAM_TICKERS)
            .unwrap_or_else(|| self.settings.tickers.clone())
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tickers.is_empty() {
            return Err(invalid("no tickers requested".into()));
        }

        let interval = match params.get(PARAM_INTERVAL) {
            None => self.settings.interval,
            Some(_) => params
                .scalar(PARAM_INTERVAL)
                .ok_or_else(|| invalid("interval must be a single value".into()))?
                .parse::<Interval>()
                .map_err(|e| invalid(e.to_string()))?,
        };

        let effective = QueryParams::new()
            .with_list(PARAM_TICKERS, tickers.clone())
            .with_scalar(PARAM_INTERVAL, interval.to_string());
        Ok((tickers, interval, effective))
    }

    fn fetch(&self, query: &Query, tickers: &[String], interval: Interval) -> Result<Fetched, LoadError> {
        let chunks = chunk_list(tickers, self.settings.chunk_size).map_err(|source| LoadError::Fetch {
            query: query.clone(),
            source,
        })?;

        let batcher = RemoteBatcher::new(self.settings.delay(), FailurePolicy::Continue);
        let outcome = batcher
            .fetch(&chunks, |chunk| self.provider.fetch_prices(chunk, query.range, interval))
            .map_err(|source| LoadError::Fetch {
                query: query.clone(),
                source,
            })?;
        let failed_chunks = outcome.failed_labels();

        let mut normalizer = ColumnNormalizer::new();
        let mut partials = Vec::with_capacity(outcome.results.len());
        for (raw, chunk) in outcome.results.into_iter().zip(succeeded(&chunks, &outcome.failures)) {
            // A single-ticker call may come back with bare field names.
            let ctx = match chunk.as_slice() {
                [only] => NamingContext::with_default_entity(only.clone()),
                _ => NamingContext::new(),
            };
            let table = normalizer.normalize(raw, &ctx).map_err(|source| LoadError::Normalize {
                query: query.clone(),
                source,
            })?;
            partials.push(table);
        }

        let aligned = align(partials, query.range, interval).map_err(|source| LoadError::Align {
            query: query.clone(),
            source,
        })?;

        Ok(Fetched {
            table: aligned.table,
            failed_chunks,
        })
    }
}

/// Chunks that produced a result, in order.
fn succeeded<'a>(
    chunks: &'a [Vec<String>],
    failures: &'a [crate::data::ChunkFailure],
) -> impl Iterator<Item = &'a Vec<String>> + 'a {
    chunks
        .iter()
        .enumerate()
        .filter(move |(i, _)| !failures.iter().any(|f| f.index == *i))
        .map(|(_, c)| c)
}

impl DataSource for PriceSource {
    fn provider(&self) -> ProviderId {
        ProviderId::Prices
    }

    fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    fn load(&self, range: DateRange, params: &QueryParams) -> Result<Loaded, LoadError> {
        let (tickers, interval, effective) = self.resolve(params)?;
        let query = Query::new(ProviderId::Prices, range, effective);
        load_through_cache(&self.cache, query, |q| self.fetch(q, &tickers, interval))
    }
}
