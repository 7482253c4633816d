//! News source: one row per article, one provider call per day.
//!
//! Param: `query` (scalar, defaults from settings). Any failed day fails the
//! whole load: a partial article set would silently under-report coverage.
//! The table is not calendar-aligned since many articles can share a date.

use super::{check_param_names, load_through_cache, DataSource, Fetched, LoadError, Loaded};
use crate::config::NewsSettings;
use crate::data::{
    Article, ArticlePage, ArticleProvider, ColumnNormalizer, FailurePolicy, FingerprintCache,
    NamingContext, RemoteBatcher,
};
use crate::domain::{ColumnKey, DateRange, ProviderId, Query, QueryParams, RawTable, Row, Value};
use chrono::{NaiveTime, SecondsFormat};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const PARAM_QUERY: &str = "query";

/// Article table columns, after `date`.
pub const ARTICLE_COLUMNS: [&str; 7] = [
    "published_at",
    "author",
    "title",
    "description",
    "content",
    "source",
    "url",
];

pub struct NewsSource {
    provider: Arc<dyn ArticleProvider>,
    cache: FingerprintCache,
    settings: NewsSettings,
}

impl NewsSource {
    pub fn new(provider: Arc<dyn ArticleProvider>, cache_root: &Path, settings: NewsSettings) -> Self {
        Self {
            provider,
            cache: FingerprintCache::new(cache_root, ProviderId::News.dir_name()),
            settings,
        }
    }

    fn resolve(&self, params: &QueryParams) -> Result<(String, QueryParams), LoadError> {
        check_param_names(ProviderId::News, params, &[PARAM_QUERY])?;
        let invalid = |reason: &str| LoadError::InvalidParams {
            provider: ProviderId::News,
            reason: reason.to_string(),
        };

        let query = match params.get(PARAM_QUERY) {
            None => self.settings.query.clone(),
            Some(_) => params
                .scalar(PARAM_QUERY)
                .ok_or_else(|| invalid("query must be a single value"))?
                .trim()
                .to_string(),
        };
        if query.is_empty() {
            return Err(invalid("query must not be empty"));
        }

        // Language and page size change the result set, so they address the cache too.
        let effective = QueryParams::new()
            .with_scalar(PARAM_QUERY, query.clone())
            .with_scalar("language", self.settings.language.clone())
            .with_scalar("page_size", self.settings.page_size.to_string());
        Ok((query, effective))
    }

    fn fetch(&self, query: &Query, search: &str) -> Result<Fetched, LoadError> {
        let windows = query.range.day_windows();
        let batcher = RemoteBatcher::new(self.settings.delay(), FailurePolicy::FailFast);

        let outcome = batcher
            .fetch(&windows, |window| {
                let page = self.provider.fetch_articles(search, *window)?;
                info!(
                    date = %window.from_date(),
                    found = page.articles.len(),
                    total = page.total_results,
                    "articles fetched"
                );
                Ok(page)
            })
            .map_err(|source| LoadError::Fetch {
                query: query.clone(),
                source,
            })?;

        let raw = articles_table(outcome.results, query.range);
        let table = ColumnNormalizer::new()
            .normalize(raw, &NamingContext::new())
            .map_err(|source| LoadError::Normalize {
                query: query.clone(),
                source,
            })?;

        Ok(Fetched {
            table,
            failed_chunks: Vec::new(),
        })
    }
}

/// Collapse every run of line breaks into a single space.
pub fn clean_text(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    let mut out = String::with_capacity(text.len());
    let mut in_break = false;
    for c in text.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
        } else {
            out.push(c);
            in_break = false;
        }
    }
    out
}

/// Flatten pages into one table: de-duplicated by URL, sorted by time.
fn articles_table(pages: Vec<ArticlePage>, range: DateRange) -> RawTable {
    let mut seen = HashSet::new();
    let mut articles: Vec<Article> = pages
        .into_iter()
        .flat_map(|p| p.articles)
        .filter(|a| seen.insert(a.url.clone()))
        .collect();
    let before = articles.len();
    articles.retain(|a| range.contains(a.published_at.date_naive()));
    if articles.len() < before {
        debug!(dropped = before - articles.len(), "articles outside range dropped");
    }
    articles.sort_by_key(|a| a.published_at);

    let columns = ARTICLE_COLUMNS.iter().map(|c| ColumnKey::flat(*c)).collect();
    let rows = articles
        .into_iter()
        .map(|a| {
            let date = a.published_at.date_naive().and_time(NaiveTime::MIN);
            let values = vec![
                Value::Text(a.published_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                Value::Text(clean_text(a.author.as_deref())),
                Value::Text(clean_text(a.title.as_deref())),
                Value::Text(clean_text(a.description.as_deref())),
                Value::Text(clean_text(a.content.as_deref())),
                Value::Text(clean_text(a.source.as_deref())),
                Value::Text(a.url),
            ];
            Row::new(date, values)
        })
        .collect();
    // Width matches ARTICLE_COLUMNS.
    RawTable::from_checked(columns, rows)
}

impl DataSource for NewsSource {
    fn provider(&self) -> ProviderId {
        ProviderId::News
    }

    fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    fn load(&self, range: DateRange, params: &QueryParams) -> Result<Loaded, LoadError> {
        let (search, effective) = self.resolve(params)?;
        let query = Query::new(ProviderId::News, range, effective);
        let mut loaded = load_through_cache(&self.cache, query, |q| self.fetch(q, &search))?;
        // An empty article set has every column "dead"; that is not a data problem.
        if loaded.table.is_empty() {
            loaded.dead_columns.clear();
        }
        Ok(loaded)
    }
}
