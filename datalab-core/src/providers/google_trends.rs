//! Google Trends interest provider.
//!
//! Three-step protocol:
//! 1. GET the Trends home page so the client holds a session cookie
//! 2. `explore` with the keyword set, which returns a `TIMESERIES` widget
//!    (token + request payload)
//! 3. `widgetdata/multiline` with that widget, which returns the series
//!
//! Both API responses carry an anti-JSON-hijacking prefix before the body.
//! At most five keywords are accepted per call.

use super::http::HttpShim;
use crate::config::TrendSettings;
use crate::data::{InterestProvider, ProviderError, PARTIAL_PERIOD_FIELD};
use crate::domain::{ColumnKey, DateRange, RawTable, Row, Value};
use chrono::{DateTime, NaiveTime};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

const HOME_URL: &str = "https://trends.google.com/?geo=US";
const EXPLORE_URL: &str = "https://trends.google.com/trends/api/explore";
const MULTILINE_URL: &str = "https://trends.google.com/trends/api/widgetdata/multiline";

const MAX_KEYWORDS: usize = 5;

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    widgets: Vec<Widget>,
}

#[derive(Debug, Deserialize)]
struct Widget {
    id: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    request: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MultilineResponse {
    default: Timeline,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timeline {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelinePoint {
    time: String,
    value: Vec<f64>,
    #[serde(default)]
    is_partial: bool,
}

pub struct GoogleTrendsProvider {
    http: HttpShim,
    hl: String,
    tz: i32,
    geo: String,
    has_session: AtomicBool,
}

impl GoogleTrendsProvider {
    pub fn new(http: HttpShim, settings: &TrendSettings) -> Self {
        Self {
            http,
            hl: settings.hl.clone(),
            tz: settings.tz,
            geo: settings.geo.clone(),
            has_session: AtomicBool::new(false),
        }
    }

    fn ensure_session(&self) -> Result<(), ProviderError> {
        if self.has_session.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.http
            .get_text("trends session", |client| client.get(HOME_URL))?;
        self.has_session.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn explore(&self, keywords: &[String], range: DateRange) -> Result<Widget, ProviderError> {
        let req = explore_request(keywords, range, &self.geo).to_string();
        let tz = self.tz.to_string();
        let body = self.http.get_text("trends explore", |client| {
            client.get(EXPLORE_URL).query(&[
                ("hl", self.hl.as_str()),
                ("tz", tz.as_str()),
                ("req", req.as_str()),
            ])
        })?;
        timeseries_widget(&body)
    }

    fn multiline(&self, widget: &Widget) -> Result<Vec<TimelinePoint>, ProviderError> {
        let req = widget.request.to_string();
        let tz = self.tz.to_string();
        let body = self.http.get_text("trends multiline", |client| {
            client.get(MULTILINE_URL).query(&[
                ("hl", self.hl.as_str()),
                ("tz", tz.as_str()),
                ("req", req.as_str()),
                ("token", widget.token.as_str()),
            ])
        })?;
        parse_multiline(&body)
    }
}

fn explore_request(keywords: &[String], range: DateRange, geo: &str) -> serde_json::Value {
    let time = format!(
        "{} {}",
        range.from_date().format("%Y-%m-%d"),
        range.to_date().format("%Y-%m-%d")
    );
    let items: Vec<serde_json::Value> = keywords
        .iter()
        .map(|kw| json!({ "keyword": kw, "time": time, "geo": geo }))
        .collect();
    json!({ "comparisonItem": items, "category": 0, "property": "" })
}

/// Drop everything before the first `{`.
fn strip_guard(body: &str) -> Result<&str, ProviderError> {
    body.find('{')
        .map(|start| &body[start..])
        .ok_or_else(|| ProviderError::ResponseFormatChanged("no JSON object in response".into()))
}

fn timeseries_widget(body: &str) -> Result<Widget, ProviderError> {
    let explore: ExploreResponse = serde_json::from_str(strip_guard(body)?)
        .map_err(|e| ProviderError::ResponseFormatChanged(format!("explore response: {e}")))?;
    explore
        .widgets
        .into_iter()
        .find(|w| w.id == "TIMESERIES")
        .ok_or_else(|| ProviderError::ResponseFormatChanged("no TIMESERIES widget".into()))
}

fn parse_multiline(body: &str) -> Result<Vec<TimelinePoint>, ProviderError> {
    let resp: MultilineResponse = serde_json::from_str(strip_guard(body)?)
        .map_err(|e| ProviderError::ResponseFormatChanged(format!("multiline response: {e}")))?;
    Ok(resp.default.timeline_data)
}

/// One column per keyword plus the partial flag.
fn to_table(keywords: &[String], points: Vec<TimelinePoint>) -> Result<RawTable, ProviderError> {
    let mut columns: Vec<ColumnKey> = keywords.iter().map(ColumnKey::flat).collect();
    columns.push(ColumnKey::flat(PARTIAL_PERIOD_FIELD));
    let mut table = RawTable::new(columns);

    for point in points {
        let secs: i64 = point.time.parse().map_err(|_| {
            ProviderError::ResponseFormatChanged(format!("bad timeline time '{}'", point.time))
        })?;
        let date = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("invalid timestamp: {secs}")))?
            .date_naive()
            .and_time(NaiveTime::MIN);

        if point.value.len() != keywords.len() {
            return Err(ProviderError::ResponseFormatChanged(format!(
                "expected {} values per point, got {}",
                keywords.len(),
                point.value.len()
            )));
        }

        let mut values: Vec<Value> = point.value.into_iter().map(Value::number).collect();
        values.push(Value::from(if point.is_partial { "True" } else { "False" }));
        table
            .push(Row::new(date, values))
            .map_err(|e| ProviderError::ResponseFormatChanged(e.to_string()))?;
    }
    Ok(table)
}

impl InterestProvider for GoogleTrendsProvider {
    fn name(&self) -> &str {
        "google_trends"
    }

    fn max_keywords_per_call(&self) -> usize {
        MAX_KEYWORDS
    }

    fn fetch_interest(
        &self,
        keywords: &[String],
        range: DateRange,
    ) -> Result<RawTable, ProviderError> {
        if keywords.is_empty() {
            return Ok(RawTable::new(vec![ColumnKey::flat(PARTIAL_PERIOD_FIELD)]));
        }
        if keywords.len() > MAX_KEYWORDS {
            return Err(ProviderError::Unsupported(format!(
                "{} keywords in one call, limit is {MAX_KEYWORDS}",
                keywords.len()
            )));
        }

        self.ensure_session()?;
        let widget = self.explore(keywords, range)?;
        let points = self.multiline(&widget)?;
        debug!(keywords = keywords.len(), points = points.len(), "trends timeline received");
        to_table(keywords, points)
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
