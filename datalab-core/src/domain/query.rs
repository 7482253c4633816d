//! Fetch requests: provider, date range and parameters.

use super::range::DateRange;
use crate::fingerprint::{build_cache_key, CacheKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which external provider a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Prices,
    Trends,
    News,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Prices, ProviderId::Trends, ProviderId::News];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Prices => "prices",
            ProviderId::Trends => "trends",
            ProviderId::News => "news",
        }
    }

    /// Cache subdirectory for this provider's artifacts.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ProviderId::Prices => "prices",
            ProviderId::Trends => "google_trends",
            ProviderId::News => "newsapi",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter value: a single string or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(String),
    List(Vec<String>),
}

/// Query parameters, held in name order.
///
/// Name order makes the serialized form independent of insertion order.
/// Items inside a list keep the caller's order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), ParamValue::Scalar(value.into()));
        self
    }

    pub fn with_list<I, S>(mut self, name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.0.insert(name.into(), ParamValue::List(items));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            ParamValue::Scalar(s) => Some(s),
            ParamValue::List(_) => None,
        }
    }

    /// A list parameter; a scalar is read as a one-item list.
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        match self.0.get(name)? {
            ParamValue::List(items) => Some(items.clone()),
            ParamValue::Scalar(s) => Some(vec![s.clone()]),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `name=value` pairs joined by `&`, names ascending, values JSON-encoded.
    pub fn canonical_string(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| {
                let encoded = match value {
                    ParamValue::Scalar(s) => serde_json::Value::from(s.as_str()),
                    ParamValue::List(items) => serde_json::Value::from(items.clone()),
                };
                format!("{name}={encoded}")
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// One fetch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub provider: ProviderId,
    pub range: DateRange,
    pub params: QueryParams,
}

impl Query {
    pub fn new(provider: ProviderId, range: DateRange, params: QueryParams) -> Self {
        Self {
            provider,
            range,
            params,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        build_cache_key(&self.range, &self.params)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.provider, self.range)?;
        if !self.params.is_empty() {
            write!(f, " [{}]", self.params.canonical_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_is_name_ordered() {
        let a = QueryParams::new()
            .with_scalar("interval", "1d")
            .with_list("tickers", ["BTC-USD", "ETH-USD"]);
        let b = QueryParams::new()
            .with_list("tickers", ["BTC-USD", "ETH-USD"])
            .with_scalar("interval", "1d");
        assert_eq!(a.canonical_string(), b.canonical_string());
        assert_eq!(
            a.canonical_string(),
            r#"interval="1d"&tickers=["BTC-USD","ETH-USD"]"#
        );
    }

    #[test]
    fn list_order_is_significant() {
        let a = QueryParams::new().with_list("keywords", ["btc", "eth"]);
        let b = QueryParams::new().with_list("keywords", ["eth", "btc"]);
        assert_ne!(a.canonical_string(), b.canonical_string());
    }

    #[test]
    fn scalar_reads_as_single_item_list() {
        let p = QueryParams::new().with_scalar("tickers", "BTC-USD");
        assert_eq!(p.list("tickers"), Some(vec!["BTC-USD".to_string()]));
        assert_eq!(p.scalar("tickers"), Some("BTC-USD"));
        assert_eq!(p.list("missing"), None);
    }

    #[test]
    fn provider_dirs_are_distinct() {
        let dirs: std::collections::HashSet<_> =
            ProviderId::ALL.iter().map(|p| p.dir_name()).collect();
        assert_eq!(dirs.len(), ProviderId::ALL.len());
    }
}
