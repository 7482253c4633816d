//! Multi-series time alignment.
//!
//! Given partial tables (one per provider call), merge them onto the
//! canonical calendar of the requested range. Every calendar slot gets a
//! row. Gaps are forward-filled, then leading gaps are backward-filled:
//! a missing slot carries the last known state rather than an interpolation.

use crate::domain::{DateRange, Interval, Row, Table, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlignError {
    #[error("no partial series contained any rows for {range}")]
    Impossible { range: DateRange },
}

/// Aligned output plus diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned {
    /// One row per calendar slot, ascending.
    pub table: Table,
    /// Columns with no observation anywhere in the range (left all-null).
    pub dead_columns: Vec<String>,
}

/// Align partial tables onto the calendar of `range` at `interval`.
///
/// Within a partial, the first row for a slot wins; later duplicates are
/// dropped. Across partials sharing a column, the first non-null value wins.
/// Rows outside the range are dropped.
pub fn align(
    partials: Vec<Table>,
    range: DateRange,
    interval: Interval,
) -> Result<Aligned, AlignError> {
    if partials.iter().all(Table::is_empty) {
        return Err(AlignError::Impossible { range });
    }

    // Union of columns in first-seen order.
    let mut columns: Vec<String> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for partial in &partials {
        for name in partial.columns() {
            if !position.contains_key(name) {
                position.insert(name.clone(), columns.len());
                columns.push(name.clone());
            }
        }
    }

    let calendar = interval.calendar(&range);
    let width = columns.len();
    let mut grid: Vec<Vec<Value>> = vec![vec![Value::Null; width]; calendar.len()];

    let mut off_calendar = 0usize;
    let mut duplicates = 0usize;

    for partial in partials {
        let (names, rows) = partial.into_parts();
        let mapping: Vec<usize> = names.iter().map(|n| position[n]).collect();
        let mut seen: HashSet<usize> = HashSet::with_capacity(rows.len());

        for row in rows {
            let Some(slot) = interval.slot_of(&range, row.date) else {
                off_calendar += 1;
                continue;
            };
            if !seen.insert(slot) {
                duplicates += 1;
                continue;
            }
            for (value, &col) in row.values.into_iter().zip(&mapping) {
                let cell = &mut grid[slot][col];
                if cell.is_null() && !value.is_null() {
                    *cell = value;
                }
            }
        }
    }

    if off_calendar > 0 || duplicates > 0 {
        debug!(off_calendar, duplicates, %range, "dropped rows during alignment");
    }

    let dead_columns: Vec<String> = (0..width)
        .filter(|&col| grid.iter().all(|row| row[col].is_null()))
        .map(|col| columns[col].clone())
        .collect();

    for col in 0..width {
        fill_column(&mut grid, col);
    }

    if !dead_columns.is_empty() {
        warn!(columns = ?dead_columns, %range, "columns have no data for the whole range");
    }

    let rows = calendar
        .into_iter()
        .zip(grid)
        .map(|(date, values)| Row::new(date, values))
        .collect();

    Ok(Aligned {
        table: Table::from_checked(columns, rows),
        dead_columns,
    })
}

/// Forward-fill, then backward-fill the leading gap.
fn fill_column(grid: &mut [Vec<Value>], col: usize) {
    let mut last: Option<Value> = None;
    for row in grid.iter_mut() {
        if row[col].is_null() {
            if let Some(v) = &last {
                row[col] = v.clone();
            }
        } else {
            last = Some(row[col].clone());
        }
    }

    let Some(first_known) = grid.iter().position(|row| !row[col].is_null()) else {
        return;
    };
    let value = grid[first_known][col].clone();
    for row in grid.iter_mut().take(first_known) {
        row[col] = value.clone();
    }
}
