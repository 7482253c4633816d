//! Sequential, rate-limited batch fetching.
//!
//! A request too large for one provider call is split into chunks. Chunks
//! are issued strictly in order with a blocking sleep between consecutive
//! calls. No call is retried here; a failed chunk is either recorded
//! (`Continue`) or ends the fetch (`FailFast`). Results already accumulated
//! from earlier chunks are never modified by a later failure.

use super::provider::ProviderError;
use crate::domain::DateRange;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// What a chunk failure does to the rest of the fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and keep going (partial data is acceptable).
    Continue,
    /// Abort on the first failure (partial data would under-report).
    FailFast,
}

/// A failed chunk.
#[derive(Debug)]
pub struct ChunkFailure {
    pub index: usize,
    pub label: String,
    pub error: ProviderError,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("chunk size must be at least 1")]
    ZeroChunkSize,

    #[error("chunk {} of {total} ({label}) failed: {source}", .index + 1)]
    ChunkFailed {
        index: usize,
        total: usize,
        label: String,
        #[source]
        source: ProviderError,
    },

    #[error("all {} chunks failed", .failures.len())]
    AllChunksFailed { failures: Vec<ChunkFailure> },
}

/// Successful chunk results in request order, plus recorded failures.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub results: Vec<T>,
    pub failures: Vec<ChunkFailure>,
}

impl<T> BatchOutcome<T> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn failed_labels(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.label.clone()).collect()
    }
}

/// Something that can be sent as one provider call.
pub trait Chunk {
    /// Short human-readable description for logs and errors.
    fn label(&self) -> String;
}

impl Chunk for Vec<String> {
    fn label(&self) -> String {
        self.join(",")
    }
}

impl Chunk for DateRange {
    fn label(&self) -> String {
        if self.from_date() == self.to_date() {
            self.from_date().to_string()
        } else {
            self.to_string()
        }
    }
}

/// Split `items` into consecutive chunks of at most `chunk_size`.
pub fn chunk_list<T: Clone>(items: &[T], chunk_size: usize) -> Result<Vec<Vec<T>>, BatchError> {
    if chunk_size == 0 {
        return Err(BatchError::ZeroChunkSize);
    }
    Ok(items.chunks(chunk_size).map(<[T]>::to_vec).collect())
}

/// Drives provider calls chunk by chunk.
#[derive(Debug, Clone)]
pub struct RemoteBatcher {
    delay: Duration,
    policy: FailurePolicy,
}

impl RemoteBatcher {
    pub fn new(delay: Duration, policy: FailurePolicy) -> Self {
        Self { delay, policy }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Call `call` once per chunk, in order, waiting `delay` between calls.
    ///
    /// Under `Continue`, fails only when every chunk failed. Under
    /// `FailFast`, fails on the first failed chunk.
    pub fn fetch<C, T, F>(&self, chunks: &[C], mut call: F) -> Result<BatchOutcome<T>, BatchError>
    where
        C: Chunk,
        F: FnMut(&C) -> Result<T, ProviderError>,
    {
        let total = chunks.len();
        if total == 0 {
            return Ok(BatchOutcome::empty());
        }

        let mut outcome = BatchOutcome::empty();

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                info!(
                    delay_ms = self.delay.as_millis() as u64,
                    "waiting before next request to respect provider rate limit"
                );
                std::thread::sleep(self.delay);
            }

            let label = chunk.label();
            info!(chunk = index + 1, total, %label, "fetching chunk");

            match call(chunk) {
                Ok(result) => outcome.results.push(result),
                Err(error) => match self.policy {
                    FailurePolicy::FailFast => {
                        return Err(BatchError::ChunkFailed {
                            index,
                            total,
                            label,
                            source: error,
                        });
                    }
                    FailurePolicy::Continue => {
                        warn!(chunk = index + 1, total, %label, %error, "chunk failed, continuing");
                        outcome.failures.push(ChunkFailure {
                            index,
                            label,
                            error,
                        });
                    }
                },
            }
        }

        if outcome.results.is_empty() {
            return Err(BatchError::AllChunksFailed {
                failures: outcome.failures,
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn keywords(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("kw{i}")).collect()
    }

    #[test]
    fn chunking_twelve_by_five() {
        let chunks = chunk_list(&keywords(12), 5).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(chunks[2], vec!["kw10".to_string(), "kw11".to_string()]);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            chunk_list(&keywords(3), 0),
            Err(BatchError::ZeroChunkSize)
        ));
    }

    #[test]
    fn empty_chunk_list_makes_no_calls() {
        let batcher = RemoteBatcher::new(Duration::ZERO, FailurePolicy::Continue);
        let mut calls = 0;
        let outcome = batcher
            .fetch(&Vec::<Vec<String>>::new(), |_| {
                calls += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 0);
        assert!(outcome.results.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn calls_are_issued_in_order() {
        let batcher = RemoteBatcher::new(Duration::ZERO, FailurePolicy::Continue);
        let chunks = chunk_list(&keywords(12), 5).unwrap();
        let mut seen = Vec::new();
        let outcome = batcher
            .fetch(&chunks, |chunk| {
                seen.push(chunk.clone());
                Ok(chunk.len())
            })
            .unwrap();
        assert_eq!(seen, chunks);
        assert_eq!(outcome.results, vec![5, 5, 2]);
    }

    #[test]
    fn continue_policy_keeps_earlier_results() {
        let batcher = RemoteBatcher::new(Duration::ZERO, FailurePolicy::Continue);
        let chunks = chunk_list(&keywords(6), 2).unwrap();
        let outcome = batcher
            .fetch(&chunks, |chunk| {
                if chunk[0] == "kw2" {
                    Err(ProviderError::Other("boom".into()))
                } else {
                    Ok(chunk[0].clone())
                }
            })
            .unwrap();
        assert_eq!(outcome.results, vec!["kw0".to_string(), "kw4".to_string()]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failed_labels(), vec!["kw2,kw3".to_string()]);
    }

    #[test]
    fn continue_policy_fails_when_every_chunk_fails() {
        let batcher = RemoteBatcher::new(Duration::ZERO, FailurePolicy::Continue);
        let chunks = chunk_list(&keywords(4), 2).unwrap();
        let err = batcher
            .fetch(&chunks, |_| -> Result<(), _> {
                Err(ProviderError::NetworkUnreachable("down".into()))
            })
            .unwrap_err();
        match err {
            BatchError::AllChunksFailed { failures } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let batcher = RemoteBatcher::new(Duration::ZERO, FailurePolicy::FailFast);
        let chunks = chunk_list(&keywords(6), 2).unwrap();
        let mut calls = 0;
        let err = batcher
            .fetch(&chunks, |chunk| {
                calls += 1;
                if chunk[0] == "kw2" {
                    Err(ProviderError::Other("boom".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(calls, 2);
        assert!(matches!(err, BatchError::ChunkFailed { index: 1, total: 3, .. }));
    }

    #[test]
    fn empty_provider_result_is_not_a_failure() {
        let batcher = RemoteBatcher::new(Duration::ZERO, FailurePolicy::FailFast);
        let chunks = chunk_list(&keywords(2), 1).unwrap();
        let outcome = batcher
            .fetch(&chunks, |_| Ok(Vec::<u8>::new()))
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn delay_is_applied_between_calls_only() {
        let delay = Duration::from_millis(20);
        let batcher = RemoteBatcher::new(delay, FailurePolicy::Continue);
        let chunks = chunk_list(&keywords(3), 1).unwrap();
        let started = Instant::now();
        batcher.fetch(&chunks, |_| Ok(())).unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= delay * 2, "elapsed {elapsed:?}");
    }

    #[test]
    fn date_range_chunk_labels() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(DateRange::day(day).label(), "2024-01-03");
    }
}
