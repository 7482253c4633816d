//! Search-interest source: one daily column per keyword.
//!
//! Param: `keywords` (list, defaults from settings). Duplicate keywords are
//! dropped before chunking, keeping the first occurrence. Chunks never
//! exceed the provider's own per-call cap. The provider's partial-period
//! flag is dropped before alignment.

use super::{check_param_names, load_through_cache, DataSource, Fetched, LoadError, Loaded};
use crate::config::TrendSettings;
use crate::data::{
    align, chunk_list, ColumnNormalizer, FailurePolicy, FingerprintCache, InterestProvider,
    NamingContext, RemoteBatcher, PARTIAL_PERIOD_FIELD,
};
use crate::domain::{DateRange, Interval, ProviderId, Query, QueryParams, Table, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const PARAM_KEYWORDS: &str = "keywords";

pub struct TrendSource {
    provider: Arc<dyn InterestProvider>,
    cache: FingerprintCache,
    settings: TrendSettings,
}

impl TrendSource {
    pub fn new(provider: Arc<dyn InterestProvider>, cache_root: &Path, settings: TrendSettings) -> Self {
        Self {
            provider,
            cache: FingerprintCache::new(cache_root, ProviderId::Trends.dir_name()),
            settings,
        }
    }

    /// Keywords per call: the configured size, capped by the provider.
    pub fn chunk_size(&self) -> usize {
        self.settings
            .chunk_size
            .min(self.provider.max_keywords_per_call())
            .max(1)
    }

    fn resolve(&self, params: &QueryParams) -> Result<(Vec<String>, QueryParams), LoadError> {
        check_param_names(ProviderId::Trends, params, &[PARAM_KEYWORDS])?;

        let requested = params
            .list(PARAM_KEYWORDS)
            .unwrap_or_else(|| self.settings.keywords.clone());
        let keywords = dedupe_keywords(requested);
        if keywords.is_empty() {
            return Err(LoadError::InvalidParams {
                provider: ProviderId::Trends,
                reason: "no keywords requested".into(),
            });
        }

        let effective = QueryParams::new().with_list(PARAM_KEYWORDS, keywords.clone());
        Ok((keywords, effective))
    }

    fn fetch(&self, query: &Query, keywords: &[String]) -> Result<Fetched, LoadError> {
        let fetch_err = |source| LoadError::Fetch {
            query: query.clone(),
            source,
        };
        let chunks = chunk_list(keywords, self.chunk_size()).map_err(fetch_err)?;

        let batcher = RemoteBatcher::new(self.settings.delay(), FailurePolicy::Continue);
        let outcome = batcher
            .fetch(&chunks, |chunk| self.provider.fetch_interest(chunk, query.range))
            .map_err(fetch_err)?;
        let failed_chunks = outcome.failed_labels();

        let mut normalizer = ColumnNormalizer::new();
        let ctx = NamingContext::new();
        let mut partials = Vec::with_capacity(outcome.results.len());
        for mut raw in outcome.results {
            raw.drop_field(PARTIAL_PERIOD_FIELD);
            let table = normalizer.normalize(raw, &ctx).map_err(|source| LoadError::Normalize {
                query: query.clone(),
                source,
            })?;
            partials.push(table);
        }

        let aligned = align(partials, query.range, Interval::DAILY).map_err(|source| LoadError::Align {
            query: query.clone(),
            source,
        })?;

        Ok(Fetched {
            table: aligned.table,
            failed_chunks,
        })
    }
}

/// Trim, drop empties and duplicates, keep first-seen order.
pub fn dedupe_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(keywords.len());
    for kw in keywords {
        let kw = kw.trim().to_string();
        if kw.is_empty() {
            continue;
        }
        if seen.insert(kw.clone()) {
            out.push(kw);
        } else {
            warn!(keyword = %kw, "duplicate keyword dropped");
        }
    }
    out
}

/// Columns whose every value is zero or null: keywords nobody searched for.
pub fn zero_interest_columns(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| {
            table
                .rows()
                .iter()
                .all(|r| matches!(r.values[*idx], Value::Null) || r.values[*idx].as_f64() == Some(0.0))
        })
        .map(|(_, name)| name.clone())
        .collect()
}

impl DataSource for TrendSource {
    fn provider(&self) -> ProviderId {
        ProviderId::Trends
    }

    fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    fn load(&self, range: DateRange, params: &QueryParams) -> Result<Loaded, LoadError> {
        let (keywords, effective) = self.resolve(params)?;
        let query = Query::new(ProviderId::Trends, range, effective);
        let loaded = load_through_cache(&self.cache, query, |q| self.fetch(q, &keywords))?;

        let silent = zero_interest_columns(&loaded.table);
        if silent.is_empty() {
            info!("every keyword has some interest in range");
        } else {
            info!(keywords = ?silent, "keywords with no interest in range");
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Row;
    use chrono::NaiveDate;

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let kws = vec![
            "bitcoin".to_string(),
            "btc".into(),
            " bitcoin ".into(),
            "".into(),
            "eth".into(),
            "btc".into(),
        ];
        assert_eq!(dedupe_keywords(kws), vec!["bitcoin", "btc", "eth"]);
    }

    #[test]
    fn zero_interest_detects_all_zero_and_all_null() {
        let d = |n| NaiveDate::from_ymd_opt(2024, 1, n).unwrap();
        let table = Table::from_rows(
            vec!["alive".into(), "zero".into(), "null".into()],
            vec![
                Row::daily(d(1), vec![1.0.into(), 0.0.into(), Value::Null]),
                Row::daily(d(2), vec![0.0.into(), 0.0.into(), Value::Null]),
            ],
        )
        .unwrap();
        assert_eq!(zero_interest_columns(&table), vec!["zero", "null"]);
    }
}
