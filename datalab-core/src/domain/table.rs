//! Tabular series: a `date` index plus named scalar columns.
//!
//! `RawTable` is what provider shims return (hierarchical `(entity, field)`
//! column keys). `Table` is the flat form every later stage works with.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Name of the mandatory index column.
pub const DATE_COLUMN: &str = "date";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("row for {date} has {got} values, expected {expected}")]
    RowWidth {
        date: NaiveDateTime,
        expected: usize,
        got: usize,
    },
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric cell; NaN and infinities become `Null`.
    pub fn number(v: f64) -> Self {
        if v.is_finite() {
            Value::Number(v)
        } else {
            Value::Null
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::number(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Value::number).unwrap_or(Value::Null)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Storage kind of a column, recorded in cache metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Number,
    Text,
}

/// One observation: index instant plus one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub date: NaiveDateTime,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(date: NaiveDateTime, values: Vec<Value>) -> Self {
        Self { date, values }
    }

    /// Row indexed at midnight of `date`.
    pub fn daily(date: NaiveDate, values: Vec<Value>) -> Self {
        Self::new(date.and_time(NaiveTime::MIN), values)
    }
}

/// Flat table with a `date` index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table, checking every row has one value per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, TableError> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    /// Rows already known to match `columns` in width.
    pub(crate) fn from_checked(columns: Vec<String>, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|r| r.values.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn push(&mut self, row: Row) -> Result<(), TableError> {
        check_width(&row, self.columns.len())?;
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of a column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r.values[idx]).collect())
    }

    /// Numeric view of a column (non-numbers read as `None`).
    pub fn numbers(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name)
            .map(|vals| vals.into_iter().map(Value::as_f64).collect())
    }

    pub fn dates(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// True when any row carries a time-of-day component.
    pub fn is_intraday(&self) -> bool {
        self.rows.iter().any(|r| r.date.time() != NaiveTime::MIN)
    }

    /// Column kinds: `Text` if any cell is text, otherwise `Number`.
    pub fn kinds(&self) -> Vec<ColumnKind> {
        (0..self.columns.len())
            .map(|idx| {
                if self
                    .rows
                    .iter()
                    .any(|r| matches!(r.values[idx], Value::Text(_)))
                {
                    ColumnKind::Text
                } else {
                    ColumnKind::Number
                }
            })
            .collect()
    }

    /// Columns with no non-null observation at all.
    pub fn dead_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.rows.iter().all(|r| r.values[*idx].is_null()))
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// True when no two rows share a date.
    pub fn has_unique_dates(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows.iter().all(|r| seen.insert(r.date))
    }

    /// Stable sort by date.
    pub fn sort_by_date(&mut self) {
        self.rows.sort_by_key(|r| r.date);
    }
}

/// Hierarchical column key as returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnKey {
    pub entity: Option<String>,
    pub field: String,
}

impl ColumnKey {
    pub fn flat(field: impl Into<String>) -> Self {
        Self {
            entity: None,
            field: field.into(),
        }
    }

    pub fn nested(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
            field: field.into(),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "({entity}, {})", self.field),
            None => write!(f, "{}", self.field),
        }
    }
}

/// Provider output before normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    columns: Vec<ColumnKey>,
    rows: Vec<Row>,
}

impl RawTable {
    pub fn new(columns: Vec<ColumnKey>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Rows already known to match `columns` in width.
    pub(crate) fn from_checked(columns: Vec<ColumnKey>, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|r| r.values.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn push(&mut self, row: Row) -> Result<(), TableError> {
        check_width(&row, self.columns.len())?;
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<ColumnKey>, Vec<Row>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Remove every column whose field equals `field` (any entity).
    pub fn drop_field(&mut self, field: &str) {
        let keep: Vec<bool> = self.columns.iter().map(|c| c.field != field).collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        self.columns = self
            .columns
            .drain(..)
            .zip(&keep)
            .filter_map(|(c, k)| k.then_some(c))
            .collect();
        for row in &mut self.rows {
            row.values = row
                .values
                .drain(..)
                .zip(&keep)
                .filter_map(|(v, k)| k.then_some(v))
                .collect();
        }
    }
}

fn check_width(row: &Row, expected: usize) -> Result<(), TableError> {
    if row.values.len() != expected {
        return Err(TableError::RowWidth {
            date: row.date,
            expected,
            got: row.values.len(),
        });
    }
    Ok(())
}

/// Render an index instant: date-only for daily tables, full timestamp otherwise.
pub fn format_date(date: NaiveDateTime, intraday: bool) -> String {
    if intraday {
        date.format(DATETIME_FORMAT).to_string()
    } else {
        date.format(DATE_FORMAT).to_string()
    }
}

/// Parse either rendering produced by [`format_date`].
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
