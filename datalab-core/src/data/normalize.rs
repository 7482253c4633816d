//! Column normalization: hierarchical provider columns → flat names.
//!
//! `(entity, field)` becomes `{entity}_{field}`, each part lowercased with
//! every run of non-alphanumeric characters collapsed to a single `_`.
//! The mapping must stay injective across everything one load produces,
//! so the normalizer remembers which source column claimed each name.

use crate::domain::{ColumnKey, RawTable, Table, Value, DATE_COLUMN};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("columns {first} and {second} both normalize to '{name}'")]
    Collision {
        name: String,
        first: ColumnKey,
        second: ColumnKey,
    },

    #[error("column {0} normalizes to an empty name")]
    EmptyName(ColumnKey),

    #[error("column {0} collides with the reserved 'date' index")]
    ReservedName(ColumnKey),
}

/// Naming context for one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NamingContext {
    default_entity: Option<String>,
}

impl NamingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity used to prefix columns the provider returned without one.
    pub fn with_default_entity(entity: impl Into<String>) -> Self {
        Self {
            default_entity: Some(entity.into()),
        }
    }
}

/// Lowercase, collapse separator runs to `_`, trim leading/trailing `_`.
pub fn normalize_part(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_sep = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Flat name for a column key under `ctx`.
pub fn flat_name(key: &ColumnKey, ctx: &NamingContext) -> String {
    let field = normalize_part(&key.field);
    let entity = key
        .entity
        .as_deref()
        .or(ctx.default_entity.as_deref())
        .map(normalize_part)
        .filter(|e| !e.is_empty());
    match entity {
        Some(entity) if field.is_empty() => entity,
        Some(entity) => format!("{entity}_{field}"),
        None => field,
    }
}

/// Flattens provider tables while keeping names unique across calls.
#[derive(Debug, Default)]
pub struct ColumnNormalizer {
    claimed: HashMap<String, ColumnKey>,
}

impl ColumnNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten `raw`. Fails without output on any collision.
    ///
    /// The same source column seen again (e.g. in a later chunk) is not a
    /// collision; two distinct source columns mapping to one name is.
    pub fn normalize(&mut self, raw: RawTable, ctx: &NamingContext) -> Result<Table, NormalizeError> {
        let (keys, rows) = raw.into_parts();

        let mut names = Vec::with_capacity(keys.len());
        let mut local: HashMap<String, &ColumnKey> = HashMap::new();
        for key in &keys {
            let name = flat_name(key, ctx);
            if name.is_empty() {
                return Err(NormalizeError::EmptyName(key.clone()));
            }
            if name == DATE_COLUMN {
                return Err(NormalizeError::ReservedName(key.clone()));
            }
            if let Some(first) = local.get(&name) {
                return Err(NormalizeError::Collision {
                    name,
                    first: (*first).clone(),
                    second: key.clone(),
                });
            }
            if let Some(first) = self.claimed.get(&name) {
                if first != key {
                    return Err(NormalizeError::Collision {
                        name,
                        first: first.clone(),
                        second: key.clone(),
                    });
                }
            }
            local.insert(name.clone(), key);
            names.push(name);
        }

        for (name, key) in names.iter().zip(&keys) {
            self.claimed.insert(name.clone(), key.clone());
        }

        let rows = rows
            .into_iter()
            .map(|mut row| {
                for v in &mut row.values {
                    if let Value::Number(n) = v {
                        if !n.is_finite() {
                            *v = Value::Null;
                        }
                    }
                }
                row
            })
            .collect();

        // Row widths were checked when the raw table was built.
        Ok(Table::from_checked(names, rows))
    }
}
