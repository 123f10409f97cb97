use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use crate::batch::{BatchProcessor, CancelToken};
use crate::cache::EmbeddingCache;
use crate::config::PipelineConfig;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::index::FieldIndexes;
use crate::models::{
    BatchOutcome, BatchProbe, CacheStats, EmbedField, EmbeddingProbe, EmbeddingStats,
    SimilarityMatch, SimilarityQuery,
};
use crate::provider::{EmbeddingProvider, TextEmbedder};
use crate::query::SimilarityQueryEngine;
use crate::store::RecordStore;

/// High-level embedding pipeline operations
///
/// Owns the cache, the resilient embedder, and one vector index per
/// embeddable field, and combines them over a [`RecordStore`]. This is the
/// surface the API layer calls; everything below it is injectable for
/// tests.
pub struct EmbeddingService<R: RecordStore> {
    store: Arc<R>,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<TextEmbedder>,
    indexes: FieldIndexes,
    config: PipelineConfig,
    cancel: CancelToken,
}

impl<R: RecordStore> EmbeddingService<R> {
    /// Service with default config and the deterministic generator only
    pub fn new(store: R) -> Self {
        Self::with_config(store, PipelineConfig::default())
    }

    pub fn with_config(store: R, config: PipelineConfig) -> Self {
        Self {
            store: Arc::new(store),
            cache: Arc::new(EmbeddingCache::new()),
            embedder: Arc::new(TextEmbedder::new(&config)),
            indexes: FieldIndexes::brute_force(config.dimension),
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Route generation through a remote provider (fallback stays wired)
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Arc::new(TextEmbedder::with_provider(&self.config, provider));
        self
    }

    /// Swap the per-field vector indexes, e.g. for a production ANN backend
    pub fn with_indexes(mut self, indexes: FieldIndexes) -> Self {
        self.indexes = indexes;
        self
    }

    fn processor(&self) -> BatchProcessor<R> {
        BatchProcessor::new(
            self.store.clone(),
            self.embedder.clone(),
            self.cache.clone(),
            self.indexes.clone(),
            self.config.clone(),
            self.cancel.clone(),
        )
    }

    fn engine(&self) -> SimilarityQueryEngine<R> {
        SimilarityQueryEngine::new(
            self.store.clone(),
            self.embedder.clone(),
            self.indexes.clone(),
            self.config.clone(),
        )
    }

    /// Handle for cancelling a long-running backfill between sub-batches
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load every persisted vector into the field indexes
    ///
    /// Call once at startup; afterwards the batch processor keeps the
    /// indexes current as it writes.
    pub async fn hydrate_indexes(&self) -> EmbeddingResult<()> {
        for field in EmbedField::all() {
            let index = self.indexes.for_field(field);
            index.clear();
            let vectors = self.store.embedded_vectors(field).await?;
            let count = vectors.len();
            for (id, vector) in vectors {
                index.insert(id, vector)?;
            }
            info!(field = %field, count, "Hydrated vector index");
        }
        Ok(())
    }

    // ===== Batch operations =====

    /// Backfill missing embeddings for one field, or all fields
    pub async fn process_missing(
        &self,
        field: Option<EmbedField>,
    ) -> EmbeddingResult<BatchOutcome> {
        let processor = self.processor();
        let mut outcome = BatchOutcome::default();
        for field in Self::selected(field) {
            outcome.merge(processor.process_missing(field).await?);
        }
        Ok(outcome)
    }

    /// Destructively clear and regenerate embeddings for one or all fields
    pub async fn rebuild_all(&self, field: Option<EmbedField>) -> EmbeddingResult<BatchOutcome> {
        let processor = self.processor();
        let mut outcome = BatchOutcome::default();
        for field in Self::selected(field) {
            outcome.merge(processor.rebuild(field).await?);
        }
        Ok(outcome)
    }

    /// Regenerate embeddings for a single record
    pub async fn update_one(&self, record_id: Uuid) -> EmbeddingResult<()> {
        self.processor().update_one(record_id).await
    }

    fn selected(field: Option<EmbedField>) -> Vec<EmbedField> {
        match field {
            Some(field) => vec![field],
            None => EmbedField::all().to_vec(),
        }
    }

    // ===== Introspection =====

    pub async fn stats(&self) -> EmbeddingResult<EmbeddingStats> {
        self.processor().stats().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Embedding cache cleared");
    }

    // ===== Diagnostics =====

    /// Embed one text and report the vector with timing
    ///
    /// No side effects beyond warming the cache.
    pub async fn test_embedding(&self, text: &str) -> EmbeddingResult<EmbeddingProbe> {
        let started = Instant::now();
        let vector = self
            .embedder
            .generate(text)
            .await
            .ok_or_else(|| EmbeddingError::Validation("Text is blank".to_string()))?;
        let latency_ms = started.elapsed().as_millis() as u64;
        self.cache.put(text, vector.clone());
        let dimension = vector.len();
        Ok(EmbeddingProbe {
            vector,
            dimension,
            latency_ms,
        })
    }

    /// Embed a batch of texts and report throughput
    pub async fn test_batch(&self, texts: &[String]) -> EmbeddingResult<BatchProbe> {
        if texts.is_empty() {
            return Err(EmbeddingError::Validation("No texts supplied".to_string()));
        }
        let started = Instant::now();
        let vectors = self.embedder.generate_batch(texts).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut count = 0;
        for (text, vector) in texts.iter().zip(vectors) {
            if let Some(vector) = vector {
                self.cache.put(text, vector);
                count += 1;
            }
        }
        Ok(BatchProbe {
            count,
            latency_ms,
            avg_per_item_ms: latency_ms as f64 / texts.len() as f64,
        })
    }

    // ===== Similarity search =====

    pub async fn similarity_search(
        &self,
        query: SimilarityQuery,
    ) -> EmbeddingResult<Vec<SimilarityMatch>> {
        self.engine().search(query).await
    }

    /// Records nearest to an existing record's stored vector
    pub async fn similar_to_record(
        &self,
        record_id: Uuid,
        field: Option<EmbedField>,
        limit: Option<usize>,
    ) -> EmbeddingResult<Vec<SimilarityMatch>> {
        self.engine()
            .similar_to(record_id, field.unwrap_or_default(), limit)
            .await
    }
}
