//! Provider capability traits and structured error types.
//!
//! The core never talks to a remote service directly. Each provider is a
//! trait the sources depend on, so the HTTP shims can be swapped or mocked
//! in tests. Shims return `Result`, never an empty table standing in for a
//! failure: "no data" and "the call failed" stay distinguishable.

use crate::domain::{DateRange, Interval, RawTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for provider calls.
///
/// These are designed to be displayable in both CLI and log contexts.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("request not supported by provider: {0}")]
    Unsupported(String),

    #[error("provider error: {0}")]
    Other(String),
}

/// Field name of the partial-period flag some interest providers append.
pub const PARTIAL_PERIOD_FIELD: &str = "isPartial";

/// One news article as returned by the article provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub source: Option<String>,
    pub url: String,
}

/// Articles for one window, plus the provider's own total count.
#[derive(Debug, Clone, Default)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub total_results: u64,
}

/// Price/quote capability.
///
/// Columns are keyed `(ticker, field)` with fields `Open`, `High`, `Low`,
/// `Close`, `Adj Close`, `Volume`. An unreachable symbol may produce an empty
/// table rather than an error.
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_prices(
        &self,
        tickers: &[String],
        range: DateRange,
        interval: Interval,
    ) -> Result<RawTable, ProviderError>;

    /// False while the provider is refusing requests (rate limit, ban).
    fn is_available(&self) -> bool {
        true
    }
}

/// Search-interest capability.
///
/// One column per keyword, keyed by the keyword as field. May include a
/// [`PARTIAL_PERIOD_FIELD`] column.
pub trait InterestProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Hard cap on keywords per call.
    fn max_keywords_per_call(&self) -> usize {
        5
    }

    fn fetch_interest(
        &self,
        keywords: &[String],
        range: DateRange,
    ) -> Result<RawTable, ProviderError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// News-article capability. Called once per day window.
pub trait ArticleProvider: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_articles(&self, query: &str, window: DateRange)
        -> Result<ArticlePage, ProviderError>;

    fn is_available(&self) -> bool {
        true
    }
}
