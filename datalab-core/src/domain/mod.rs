//! Domain types for DataLab

pub mod query;
pub mod range;
pub mod table;

pub use query::{ParamValue, ProviderId, Query, QueryParams};
pub use range::{DateRange, Interval, RangeError};
pub use table::{
    format_date, parse_date, ColumnKey, ColumnKind, RawTable, Row, Table, TableError, Value,
    DATE_COLUMN,
};
