//! Data acquisition building blocks: cache, batching, alignment, normalization.

pub mod align;
pub mod batcher;
pub mod cache;
pub mod circuit_breaker;
pub mod normalize;
pub mod provider;

pub use align::{align, AlignError, Aligned};
pub use batcher::{chunk_list, BatchError, BatchOutcome, Chunk, ChunkFailure, FailurePolicy, RemoteBatcher};
pub use cache::{read_csv, write_csv, CacheError, CacheMeta, ColumnSpec, FingerprintCache};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use normalize::{flat_name, normalize_part, ColumnNormalizer, NamingContext, NormalizeError};
pub use provider::{
    Article, ArticlePage, ArticleProvider, InterestProvider, PriceProvider, ProviderError,
    PARTIAL_PERIOD_FIELD,
};
