//! Content-addressed CSV cache with an integrity sidecar.
//!
//! Layout: `{cache_dir}/{namespace}/{key}.csv` + `{key}.meta.json`
//!
//! Features:
//! - Atomic writes (a fresh temp file per write, renamed into place)
//! - Integrity validation on load (key, BLAKE3 hash, header, row count)
//! - Quarantine for corrupt files ({key}.csv.quarantined)
//! - No expiry: an entry lives until `remove` or `clear`
//!
//! There is no locking. Two writers racing on one key both succeed and
//! leave whichever rename landed last. A reader that catches data from one
//! writer and a sidecar from the other sees a hash mismatch, i.e. a miss.

use crate::domain::{format_date, parse_date, ColumnKind, Row, Table, Value, DATE_COLUMN};
use crate::fingerprint::{content_hash, CacheKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

const DATA_EXT: &str = "csv";
const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("cache metadata error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("cache integrity check failed: {0}")]
    Integrity(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Name and kind of a cached value column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Metadata sidecar for one cached artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub key: CacheKey,
    pub columns: Vec<ColumnSpec>,
    pub row_count: usize,
    pub data_hash: String,
    pub cached_at: DateTime<Utc>,
}

/// File-backed get/put of tables addressed by [`CacheKey`].
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    dir: PathBuf,
}

impl FingerprintCache {
    /// Cache rooted at `{root}/{namespace}`. Nothing is created until `put`.
    pub fn new(root: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            dir: root.as_ref().join(namespace),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{DATA_EXT}"))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}{META_SUFFIX}"))
    }

    /// Cached table for `key`, or `None`.
    ///
    /// Never fails: a missing, unreadable or corrupt artifact is a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Table> {
        match self.read_entry(key) {
            Ok(Some(table)) => {
                debug!(%key, rows = table.len(), "cache hit");
                Some(table)
            }
            Ok(None) => {
                debug!(%key, "cache miss");
                None
            }
            Err(e) => {
                warn!(%key, error = %e, "unreadable cache entry, treating as miss");
                if matches!(e, CacheError::Integrity(_) | CacheError::Csv(_) | CacheError::Meta(_)) {
                    self.quarantine(key);
                }
                None
            }
        }
    }

    fn read_entry(&self, key: &CacheKey) -> Result<Option<Table>, CacheError> {
        let data_path = self.data_path(key);
        let meta_path = self.meta_path(key);
        if !data_path.exists() && !meta_path.exists() {
            return Ok(None);
        }

        let meta_json = fs::read_to_string(&meta_path).map_err(io_err(&meta_path))?;
        let meta: CacheMeta = serde_json::from_str(&meta_json)?;
        if &meta.key != key {
            return Err(CacheError::Integrity(format!(
                "sidecar belongs to {}",
                meta.key
            )));
        }

        let bytes = fs::read(&data_path).map_err(io_err(&data_path))?;
        if content_hash(&bytes) != meta.data_hash {
            return Err(CacheError::Integrity("content hash mismatch".into()));
        }

        let table = read_csv(bytes.as_slice(), &meta.columns)?;
        if table.len() != meta.row_count {
            return Err(CacheError::Integrity(format!(
                "expected {} rows, found {}",
                meta.row_count,
                table.len()
            )));
        }
        Ok(Some(table))
    }

    /// Store `table` under `key`, replacing any existing entry.
    pub fn put(&self, key: &CacheKey, table: &Table) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let mut bytes = Vec::new();
        write_csv(table, &mut bytes)?;

        let meta = CacheMeta {
            key: key.clone(),
            columns: table
                .columns()
                .iter()
                .zip(table.kinds())
                .map(|(name, kind)| ColumnSpec {
                    name: name.clone(),
                    kind,
                })
                .collect(),
            row_count: table.len(),
            data_hash: content_hash(&bytes),
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;

        // Data first: a crash between the two renames leaves a stale sidecar
        // whose hash no longer matches, which reads as a miss.
        write_atomic(&self.data_path(key), &bytes)?;
        write_atomic(&self.meta_path(key), &meta_json)?;
        debug!(%key, rows = table.len(), dir = %self.dir.display(), "cached");
        Ok(())
    }

    /// True when both the artifact and its sidecar exist.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.data_path(key).exists() && self.meta_path(key).exists()
    }

    /// Delete the entry for `key`. Returns whether anything was removed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut removed = false;
        for path in [self.data_path(key), self.meta_path(key)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        Ok(removed)
    }

    /// Delete every file in this namespace. Returns the number of entries removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(&self.dir)(e)),
        };

        let mut entries = 0;
        for entry in read {
            let path = entry.map_err(io_err(&self.dir))?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) == Some(DATA_EXT) {
                entries += 1;
            }
            fs::remove_file(&path).map_err(io_err(&path))?;
        }
        Ok(entries)
    }

    /// Metadata of every readable entry, sorted by key.
    pub fn entries(&self) -> Result<Vec<CacheMeta>, CacheError> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir)(e)),
        };

        let mut metas = Vec::new();
        for entry in read {
            let path = entry.map_err(io_err(&self.dir))?.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(META_SUFFIX));
            if !is_meta {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(io_err(&path))
                .and_then(|s| serde_json::from_str::<CacheMeta>(&s).map_err(CacheError::from));
            match parsed {
                Ok(meta) => metas.push(meta),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable sidecar"),
            }
        }
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }

    fn quarantine(&self, key: &CacheKey) {
        let path = self.data_path(key);
        if !path.exists() {
            return;
        }
        let target = path.with_extension(format!("{DATA_EXT}.quarantined"));
        match fs::rename(&path, &target) {
            Ok(()) => warn!(path = %target.display(), "quarantined corrupt cache file"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to quarantine cache file"),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    // One temp file per write: concurrent writers to the same key never share it.
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    let tmp_path = tmp.path().to_path_buf();
    tmp.write_all(bytes).map_err(io_err(&tmp_path))?;
    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;
    Ok(())
}

// ── CSV helpers ─────────────────────────────────────────────────────

/// Write `table` as CSV: `date` first, then value columns.
///
/// Null cells are empty. Dates carry a time only for intraday tables.
pub fn write_csv<W: io::Write>(table: &Table, writer: W) -> Result<(), csv::Error> {
    let intraday = table.is_intraday();
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(std::iter::once(DATE_COLUMN).chain(table.columns().iter().map(String::as_str)))?;

    let mut record: Vec<String> = Vec::with_capacity(table.columns().len() + 1);
    for row in table.rows() {
        record.clear();
        record.push(format_date(row.date, intraday));
        record.extend(row.values.iter().map(|v| match v {
            Value::Null => String::new(),
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
        }));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a CSV written by [`write_csv`], typing cells by `columns`.
///
/// Empty number cells read as null; empty text cells read as empty strings.
pub fn read_csv<R: io::Read>(reader: R, columns: &[ColumnSpec]) -> Result<Table, CacheError> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr.headers()?.clone();
    let expected = std::iter::once(DATE_COLUMN).chain(columns.iter().map(|c| c.name.as_str()));
    if !headers.iter().eq(expected) {
        return Err(CacheError::Integrity(format!(
            "header mismatch: {:?}",
            headers.iter().collect::<Vec<_>>()
        )));
    }

    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut table = Table::new(names);

    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = parse_date(raw_date).ok_or_else(|| {
            CacheError::Integrity(format!("row {line}: bad date '{raw_date}'"))
        })?;

        let mut values = Vec::with_capacity(columns.len());
        for (spec, cell) in columns.iter().zip(record.iter().skip(1)) {
            let value = match spec.kind {
                ColumnKind::Number if cell.is_empty() => Value::Null,
                ColumnKind::Number => cell.parse::<f64>().map(Value::number).map_err(|_| {
                    CacheError::Integrity(format!(
                        "row {line}: '{cell}' in {} is not a number",
                        spec.name
                    ))
                })?,
                ColumnKind::Text => Value::Text(cell.to_string()),
            };
            values.push(value);
        }

        table
            .push(Row::new(date, values))
            .map_err(|e| CacheError::Integrity(e.to_string()))?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DateRange, QueryParams};
    use crate::fingerprint::build_cache_key;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, n).unwrap()
    }

    fn key(tag: &str) -> CacheKey {
        build_cache_key(
            &DateRange::new(day(1), day(3)).unwrap(),
            &QueryParams::new().with_scalar("tag", tag),
        )
    }

    fn sample_table() -> Table {
        Table::from_rows(
            vec!["btc_usd_close".into(), "note".into(), "empty".into()],
            vec![
                Row::daily(day(1), vec![100.5.into(), "a, b".into(), Value::Null]),
                Row::daily(day(2), vec![Value::Null, "line \"quoted\"".into(), Value::Null]),
                Row::daily(day(3), vec![0.1.into(), "".into(), Value::Null]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn put_then_get_returns_same_table() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "prices");
        let k = key("a");

        assert!(cache.get(&k).is_none());
        cache.put(&k, &sample_table()).unwrap();
        assert!(cache.contains(&k));
        assert_eq!(cache.get(&k).unwrap(), sample_table());
        assert!(tmp.path().join("prices").join(format!("{k}.csv")).exists());
    }

    #[test]
    fn intraday_timestamps_round_trip() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "prices");
        let mut t = Table::new(vec!["p".into()]);
        t.push(Row::new(day(1).and_hms_opt(13, 15, 0).unwrap(), vec![1.0.into()]))
            .unwrap();
        cache.put(&key("intraday"), &t).unwrap();
        assert_eq!(cache.get(&key("intraday")).unwrap(), t);
    }

    #[test]
    fn empty_table_is_cacheable() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "newsapi");
        let t = Table::new(vec!["title".into()]);
        cache.put(&key("empty"), &t).unwrap();
        assert_eq!(cache.get(&key("empty")).unwrap(), t);
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "prices");
        let k = key("a");
        cache.put(&k, &sample_table()).unwrap();

        let mut replacement = Table::new(vec!["x".into()]);
        replacement
            .push(Row::daily(day(1), vec![1.0.into()]))
            .unwrap();
        cache.put(&k, &replacement).unwrap();
        assert_eq!(cache.get(&k).unwrap(), replacement);
    }

    #[test]
    fn tampered_data_is_a_miss_and_quarantined() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "prices");
        let k = key("a");
        cache.put(&k, &sample_table()).unwrap();

        let data = cache.dir().join(format!("{k}.csv"));
        fs::write(&data, "date,btc_usd_close\n2024-01-01,999\n").unwrap();

        assert!(cache.get(&k).is_none());
        assert!(!data.exists());
        assert!(cache.dir().join(format!("{k}.csv.quarantined")).exists());
    }

    #[test]
    fn missing_or_garbage_sidecar_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "prices");
        let k = key("a");
        cache.put(&k, &sample_table()).unwrap();

        let meta = cache.dir().join(format!("{k}.meta.json"));
        fs::write(&meta, "{ not json").unwrap();
        assert!(cache.get(&k).is_none());

        cache.put(&k, &sample_table()).unwrap();
        fs::remove_file(&meta).unwrap();
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn concurrent_puts_to_one_key_all_succeed() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "prices");
        let k = key("race");
        let table = sample_table();

        let failures: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| (0..50).filter(|_| cache.put(&k, &table).is_err()).count())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(failures, 0);
        assert_eq!(cache.get(&k).unwrap(), table);
        // No temp files left behind.
        let names: Vec<String> = fs::read_dir(cache.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
    }

    #[test]
    fn remove_and_clear() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "google_trends");
        cache.put(&key("a"), &sample_table()).unwrap();
        cache.put(&key("b"), &sample_table()).unwrap();

        assert!(cache.remove(&key("a")).unwrap());
        assert!(!cache.remove(&key("a")).unwrap());
        assert!(!cache.contains(&key("a")));
        assert!(cache.contains(&key("b")));

        cache.put(&key("c"), &sample_table()).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn clear_on_missing_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "never_written");
        assert_eq!(cache.clear().unwrap(), 0);
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn entries_list_metadata() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path(), "prices");
        cache.put(&key("a"), &sample_table()).unwrap();

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key("a"));
        assert_eq!(entries[0].row_count, 3);
        assert_eq!(
            entries[0].columns.iter().map(|c| c.kind).collect::<Vec<_>>(),
            vec![ColumnKind::Number, ColumnKind::Text, ColumnKind::Number]
        );
    }

    #[test]
    fn read_csv_rejects_header_mismatch() {
        let specs = vec![ColumnSpec {
            name: "a".into(),
            kind: ColumnKind::Number,
        }];
        let err = read_csv("date,b\n2024-01-01,1\n".as_bytes(), &specs).unwrap_err();
        assert!(matches!(err, CacheError::Integrity(_)));
    }
}
