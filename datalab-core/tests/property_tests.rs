//! Property tests for cache-key and alignment invariants.
//!
//! Uses proptest to verify:
//! 1. Key determinism: the same range and params always give the same key
//! 2. Order independence: param insertion order never changes the key
//! 3. Key sensitivity: changing any param value or the range changes the key
//! 4. Alignment completeness: one row per calendar day, dates unique and sorted
//! 5. Fill: no nulls remain in any column that had at least one observation
//! 6. Chunking: chunks preserve order and cover every item exactly once

use chrono::NaiveDate;
use datalab_core::data::{align, chunk_list};
use datalab_core::domain::{DateRange, Interval, ParamValue, QueryParams, Row, Table, Value};
use datalab_core::build_cache_key;
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_range() -> impl Strategy<Value = DateRange> {
    (0i64..3000, 0i64..120).prop_map(|(offset, len)| {
        let from = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap() + chrono::Duration::days(offset);
        DateRange::new(from, from + chrono::Duration::days(len)).unwrap()
    })
}

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z_]{1,10}"
}

fn arb_param_value() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        "[A-Za-z0-9 -]{0,12}".prop_map(ParamValue::Scalar),
        prop::collection::vec("[A-Za-z0-9-]{1,8}", 0..5).prop_map(ParamValue::List),
    ]
}

fn arb_params() -> impl Strategy<Value = Vec<(String, ParamValue)>> {
    prop::collection::btree_map(arb_name(), arb_param_value(), 0..6)
        .prop_map(|m| m.into_iter().collect())
}

fn build(pairs: &[(String, ParamValue)]) -> QueryParams {
    let mut params = QueryParams::new();
    for (name, value) in pairs {
        params.insert(name.clone(), value.clone());
    }
    params
}

/// A sparse daily series over `range`: `(day offset, value)` observations,
/// possibly duplicated or out of range.
fn arb_partial(max_days: i64) -> impl Strategy<Value = Vec<(i64, Option<f64>)>> {
    prop::collection::vec(
        (-3i64..max_days + 3, prop::option::weighted(0.8, 0.0..1000.0_f64)),
        0..40,
    )
}

fn to_table(column: &str, from: NaiveDate, obs: &[(i64, Option<f64>)]) -> Table {
    let rows = obs
        .iter()
        .map(|(offset, v)| Row::daily(from + chrono::Duration::days(*offset), vec![Value::from(*v)]))
        .collect();
    Table::from_rows(vec![column.to_string()], rows).unwrap()
}

// ── 1–3. Cache keys ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn key_is_deterministic(range in arb_range(), pairs in arb_params()) {
        let a = build_cache_key(&range, &build(&pairs));
        let b = build_cache_key(&range, &build(&pairs));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn key_ignores_insertion_order(range in arb_range(), pairs in arb_params()) {
        let forward = build(&pairs);
        let reversed: Vec<_> = pairs.iter().rev().cloned().collect();
        prop_assert_eq!(
            build_cache_key(&range, &forward),
            build_cache_key(&range, &build(&reversed))
        );
    }

    #[test]
    fn key_changes_with_any_param_value(
        range in arb_range(),
        pairs in arb_params(),
        name in arb_name(),
        a in arb_param_value(),
        b in arb_param_value(),
    ) {
        prop_assume!(a != b);
        let mut left = build(&pairs);
        let mut right = build(&pairs);
        left.insert(name.clone(), a);
        right.insert(name, b);
        prop_assert_ne!(build_cache_key(&range, &left), build_cache_key(&range, &right));
    }

    #[test]
    fn key_embeds_range_and_changes_with_it(
        r1 in arb_range(),
        r2 in arb_range(),
        pairs in arb_params(),
    ) {
        let params = build(&pairs);
        let k1 = build_cache_key(&r1, &params);
        let k2 = build_cache_key(&r2, &params);
        let prefix = format!("{}--{}--", r1.from_date(), r1.to_date());
        prop_assert!(k1.as_str().starts_with(&prefix));
        if r1 != r2 {
            prop_assert_ne!(k1, k2);
        }
    }
}

// ── 4–5. Alignment ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn aligned_table_is_complete_and_filled(
        len in 0i64..60,
        a in arb_partial(60),
        b in arb_partial(60),
    ) {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let range = DateRange::new(from, from + chrono::Duration::days(len)).unwrap();
        let partials = vec![to_table("a", from, &a), to_table("b", from, &b)];

        let Ok(aligned) = align(partials, range, Interval::DAILY) else {
            // Only when nothing at all was observed.
            prop_assert!(a.is_empty() && b.is_empty());
            return Ok(());
        };
        let table = aligned.table;

        prop_assert_eq!(table.len(), range.num_days());
        prop_assert!(table.has_unique_dates());
        let dates = table.dates();
        prop_assert!(dates.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(dates[0].date(), range.from_date());

        for name in table.columns() {
            let values = table.numbers(name).unwrap();
            let dead = aligned.dead_columns.contains(name);
            if dead {
                prop_assert!(values.iter().all(Option::is_none));
            } else {
                prop_assert!(values.iter().all(Option::is_some), "nulls left in {}", name);
            }
        }
    }
}

// ── 6. Chunking ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn chunks_cover_items_in_order(items in prop::collection::vec(any::<u16>(), 0..50), size in 1usize..8) {
        let chunks = chunk_list(&items, size).unwrap();
        prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
        prop_assert_eq!(chunks.len(), items.len().div_ceil(size));
        prop_assert_eq!(chunks.concat(), items);
    }
}
