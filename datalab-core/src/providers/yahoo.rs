//! Yahoo Finance price provider.
//!
//! Fetches OHLCV series from Yahoo's v8 chart API, one request per ticker,
//! and outer-joins them by timestamp into one `(ticker, field)` table.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. An unknown ticker is logged and skipped, not fatal.

use super::http::HttpShim;
use crate::data::{PriceProvider, ProviderError};
use crate::domain::{ColumnKey, DateRange, Interval, RawTable, Row, Value};
use chrono::{DateTime, NaiveDateTime};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Field names in the order they appear per ticker.
pub const PRICE_FIELDS: [&str; 6] = ["Open", "High", "Low", "Close", "Adj Close", "Volume"];

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// One ticker's observations: instant → six field values.
type Series = Vec<(NaiveDateTime, [Option<f64>; 6])>;

pub struct YahooProvider {
    http: HttpShim,
}

impl YahooProvider {
    pub fn new(http: HttpShim) -> Self {
        Self { http }
    }

    /// Yahoo's `interval` query value.
    pub fn interval_code(interval: Interval) -> Result<&'static str, ProviderError> {
        let code = match interval {
            Interval::Minutes(1) => "1m",
            Interval::Minutes(2) => "2m",
            Interval::Minutes(5) => "5m",
            Interval::Minutes(15) => "15m",
            Interval::Minutes(30) => "30m",
            Interval::Minutes(60) | Interval::Hours(1) => "1h",
            Interval::Minutes(90) => "90m",
            Interval::Days(1) => "1d",
            Interval::Days(5) => "5d",
            Interval::Days(7) => "1wk",
            other => {
                return Err(ProviderError::Unsupported(format!(
                    "Yahoo has no {other} interval"
                )))
            }
        };
        Ok(code)
    }

    fn chart_url(symbol: &str) -> String {
        format!("https://query2.finance.yahoo.com/v8/finance/chart/{symbol}")
    }

    fn fetch_one(
        &self,
        symbol: &str,
        range: DateRange,
        interval: Interval,
    ) -> Result<Series, ProviderError> {
        let code = Self::interval_code(interval)?;
        let period1 = range.start().and_utc().timestamp().to_string();
        let period2 = range.end_exclusive().and_utc().timestamp().to_string();
        let url = Self::chart_url(symbol);

        let body = self.http.get_text_with(
            symbol,
            |client| {
                client.get(&url).query(&[
                    ("period1", period1.as_str()),
                    ("period2", period2.as_str()),
                    ("interval", code),
                    ("includeAdjustedClose", "true"),
                ])
            },
            |status, body| {
                if status == StatusCode::NOT_FOUND {
                    ProviderError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    ProviderError::Other(format!("HTTP {status} for {symbol}: {body}"))
                }
            },
        )?;

        let chart: ChartResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;
        parse_response(symbol, chart, interval)
    }
}

fn parse_response(
    symbol: &str,
    resp: ChartResponse,
    interval: Interval,
) -> Result<Series, ProviderError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Some(err) => ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
    })?;

    let Some(data) = result.into_iter().next() else {
        return Err(ProviderError::ResponseFormatChanged("result array is empty".into()));
    };

    // No timestamps means no trading in the window.
    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormatChanged("no quote data".into()))?;

    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();

    let mut series = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let instant = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;
        let instant = if interval.is_intraday() {
            instant
        } else {
            instant.date().and_time(chrono::NaiveTime::MIN)
        };

        let fields = [
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
            adj_closes.as_ref().and_then(|v| at(v, i)),
            at(&quote.volume, i),
        ];

        // Holidays and halted sessions come back as all-null rows.
        if fields.iter().all(Option::is_none) {
            continue;
        }
        series.push((instant, fields));
    }

    Ok(series)
}

/// Outer-join per-ticker series into one `(ticker, field)` table.
fn join_series(per_ticker: Vec<(String, Series)>) -> RawTable {
    let width = per_ticker.len() * PRICE_FIELDS.len();
    let columns = per_ticker
        .iter()
        .flat_map(|(ticker, _)| {
            PRICE_FIELDS
                .iter()
                .map(move |field| ColumnKey::nested(ticker.clone(), *field))
        })
        .collect();

    let mut grid: BTreeMap<NaiveDateTime, Vec<Value>> = BTreeMap::new();
    for (slot, (_, series)) in per_ticker.into_iter().enumerate() {
        let offset = slot * PRICE_FIELDS.len();
        for (instant, fields) in series {
            let row = grid
                .entry(instant)
                .or_insert_with(|| vec![Value::Null; width]);
            for (j, v) in fields.into_iter().enumerate() {
                if row[offset + j].is_null() {
                    row[offset + j] = Value::from(v);
                }
            }
        }
    }

    let rows = grid
        .into_iter()
        .map(|(instant, values)| Row::new(instant, values))
        .collect();
    // Every row was allocated at `width`.
    RawTable::from_checked(columns, rows)
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_prices(
        &self,
        tickers: &[String],
        range: DateRange,
        interval: Interval,
    ) -> Result<RawTable, ProviderError> {
        Self::interval_code(interval)?;

        let mut per_ticker = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            match self.fetch_one(ticker, range, interval) {
                Ok(series) if series.is_empty() => {
                    warn!(%ticker, %range, "no price rows returned");
                }
                Ok(series) => {
                    debug!(%ticker, rows = series.len(), "fetched prices");
                    per_ticker.push((ticker.clone(), series));
                }
                Err(ProviderError::SymbolNotFound { symbol }) => {
                    warn!(%symbol, "symbol not found, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(join_series(per_ticker))
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = r#"{
      "chart": {
        "result": [{
          "timestamp": [1704067200, 1704153600, 1704240000],
          "indicators": {
            "quote": [{
              "open":   [42000.0, null, 44000.0],
              "high":   [43000.0, null, 45000.0],
              "low":    [41000.0, null, 43500.0],
              "close":  [42500.0, null, 44800.0],
              "volume": [1000,    null, 1200]
            }],
            "adjclose": [{ "adjclose": [42500.0, null, 44800.0] }]
          }
        }],
        "error": null
      }
    }"#;

    fn d(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn parses_chart_and_skips_empty_rows() {
        let resp: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let series = parse_response("BTC-USD", resp, Interval::DAILY).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0, d(1));
        assert_eq!(series[1].0, d(3));
        assert_eq!(series[1].1[3], Some(44800.0));
        assert_eq!(series[0].1[5], Some(1000.0));
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
        )
        .unwrap();
        let err = parse_response("NOPE", resp, Interval::DAILY).unwrap_err();
        assert!(matches!(err, ProviderError::SymbolNotFound { symbol } if symbol == "NOPE"));
    }

    #[test]
    fn missing_timestamps_is_empty_not_error() {
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#,
        )
        .unwrap();
        assert!(parse_response("BTC-USD", resp, Interval::DAILY)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn join_outer_joins_by_instant() {
        let btc = vec![(d(1), [Some(1.0); 6]), (d(2), [Some(2.0); 6])];
        let eth = vec![(d(2), [Some(20.0); 6]), (d(3), [Some(30.0); 6])];
        let table = join_series(vec![("BTC-USD".into(), btc), ("ETH-USD".into(), eth)]);

        assert_eq!(table.columns().len(), 12);
        assert_eq!(table.columns()[3], ColumnKey::nested("BTC-USD", "Close"));
        assert_eq!(table.columns()[9], ColumnKey::nested("ETH-USD", "Close"));
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[0].values[9], Value::Null);
        assert_eq!(table.rows()[2].values[3], Value::Null);
        assert_eq!(table.rows()[1].values[9], Value::Number(20.0));
        assert!(table.rows().iter().all(|r| r.values.len() == 12));
    }

    #[test]
    fn join_of_nothing_is_empty() {
        let table = join_series(Vec::new());
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[test]
    fn interval_codes() {
        assert_eq!(YahooProvider::interval_code(Interval::DAILY).unwrap(), "1d");
        assert_eq!(YahooProvider::interval_code(Interval::Hours(1)).unwrap(), "1h");
        assert_eq!(YahooProvider::interval_code(Interval::Minutes(15)).unwrap(), "15m");
        assert_eq!(YahooProvider::interval_code(Interval::Days(7)).unwrap(), "1wk");
        assert!(matches!(
            YahooProvider::interval_code(Interval::Hours(4)),
            Err(ProviderError::Unsupported(_))
        ));
    }
}
