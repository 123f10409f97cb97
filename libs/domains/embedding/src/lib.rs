//! Embedding Domain Library
//!
//! Turns incident free-text fields into fixed-dimension vectors and answers
//! "find records near this one" queries. The remote provider is optional:
//! a deterministic local generator keeps ingestion and search available
//! when it is unconfigured or failing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ EmbeddingService │  ← backfill, rebuild, diagnostics, search
//! └───┬──────────┬───┘
//!     │          │
//! ┌───▼──────┐ ┌─▼───────────────────┐
//! │ Batch    │ │ SimilarityQueryEngine│
//! │ Processor│ └─┬─────────────┬─────┘
//! └─┬───┬────┘   │             │
//!   │   │  ┌─────▼─────┐ ┌─────▼──────┐
//!   │   │  │ VectorIndex│ │ RecordStore│   (traits)
//!   │   │  └─────┬─────┘ └─────┬──────┘
//!   │   │  ┌─────▼─────┐ ┌─────▼───────────┐
//!   │   │  │ BruteForce│ │ MemoryRecordStore│  (+ production backends)
//!   │   │  └───────────┘ └─────────────────┘
//!   │   │
//!   │ ┌─▼──────────────┐     ┌──────────────────┐
//!   │ │ EmbeddingCache │     │ EmbeddingProvider │  (trait)
//!   │ └────────────────┘     └────────┬─────────┘
//!   │                        ┌────────▼─────────┐
//!   └────────────────────────► OpenAIProvider    │
//!                            │ Deterministic     │
//!                            └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_embedding::{
//!     EmbeddingService, MemoryRecordStore, OpenAIProvider, SimilarityQuery,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryRecordStore::new();
//! let mut service = EmbeddingService::new(store);
//! if let Some(provider) = OpenAIProvider::from_env() {
//!     service = service.with_provider(Arc::new(provider));
//! }
//!
//! service.hydrate_indexes().await?;
//! let outcome = service.process_missing(None).await?;
//! println!("processed {} records", outcome.processed);
//!
//! let matches = service
//!     .similarity_search(SimilarityQuery::new("burglary near Camden"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod memory;
pub mod models;
pub mod provider;
pub mod query;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use batch::{BatchProcessor, CancelToken};
pub use cache::EmbeddingCache;
pub use config::PipelineConfig;
pub use error::{EmbeddingError, EmbeddingResult};
pub use index::{
    BruteForceIndex, FieldIndexes, HnswParams, IndexParams, IvfFlatParams, VectorIndex,
    cosine_distance,
};
pub use memory::MemoryRecordStore;
pub use models::{
    BatchOutcome, BatchProbe, CacheStats, EmbedField, EmbeddingProbe, EmbeddingStats,
    FieldCoverage, FieldUpdate, IncidentRecord, SimilarityMatch, SimilarityQuery,
};
pub use provider::{
    DeterministicProvider, EmbeddingProvider, OpenAIConfig, OpenAIProvider, TextEmbedder,
};
pub use query::{QueryFilters, SimilarityQueryEngine};
pub use service::EmbeddingService;
pub use store::RecordStore;
