use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::EmbeddingCache;
use crate::config::PipelineConfig;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::index::FieldIndexes;
use crate::models::{BatchOutcome, EmbedField, EmbeddingStats, FieldCoverage, FieldUpdate, IncidentRecord};
use crate::provider::{TextEmbedder, normalize_text, stable_hash};
use crate::store::RecordStore;

/// Cooperative cancellation handle for long-running backfills
///
/// Checked between sub-batches only: the in-flight sub-batch always runs to
/// completion so no sub-batch is left half-written.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Re-arm the token for the next long-running operation
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct RecordProgress {
    succeeded: bool,
    failed: bool,
}

/// Backfills missing embeddings across the record store in bounded batches
///
/// Records are partitioned into fixed-size sub-batches; each sub-batch
/// consults the cache first, generates the remaining vectors, writes them
/// back and feeds the field index. Failures are absorbed into the
/// per-record counters of [`BatchOutcome`]; nothing escapes a batch run
/// except store scan errors before processing starts.
pub struct BatchProcessor<R: RecordStore> {
    store: Arc<R>,
    embedder: Arc<TextEmbedder>,
    cache: Arc<EmbeddingCache>,
    indexes: FieldIndexes,
    config: PipelineConfig,
    cancel: CancelToken,
}

impl<R: RecordStore> BatchProcessor<R> {
    pub fn new(
        store: Arc<R>,
        embedder: Arc<TextEmbedder>,
        cache: Arc<EmbeddingCache>,
        indexes: FieldIndexes,
        config: PipelineConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            store,
            embedder,
            cache,
            indexes,
            config,
            cancel,
        }
    }

    /// Backfill every record whose field text lacks a stored vector
    pub async fn process_missing(&self, field: EmbedField) -> EmbeddingResult<BatchOutcome> {
        let ids = self.store.find_missing(field).await?;
        if ids.is_empty() {
            debug!(field = %field, "No records missing embeddings");
            return Ok(BatchOutcome::default());
        }

        info!(field = %field, missing = ids.len(), "Backfilling missing embeddings");
        let records = self.store.get_many(&ids).await?;
        let outcome = self.process_records(&records, &[field], false).await;
        info!(
            field = %field,
            processed = outcome.processed,
            errors = outcome.errors,
            "Backfill finished"
        );
        Ok(outcome)
    }

    /// Clear all stored vectors for the field and regenerate from scratch
    ///
    /// Used when the embedding model or dimension changes. Destructive:
    /// the clear happens before any regeneration, and a cancelled rebuild
    /// reports partial completion through the outcome counters.
    pub async fn rebuild(&self, field: EmbedField) -> EmbeddingResult<BatchOutcome> {
        let cleared = self.store.clear_embeddings(field).await?;
        self.indexes.for_field(field).clear();
        info!(field = %field, cleared, "Cleared stored embeddings for rebuild");
        self.process_missing(field).await
    }

    /// Regenerate both field embeddings for a single record
    pub async fn update_one(&self, record_id: Uuid) -> EmbeddingResult<()> {
        let record = self
            .store
            .get(record_id)
            .await?
            .ok_or(EmbeddingError::RecordNotFound(record_id))?;

        let outcome = self
            .process_records(std::slice::from_ref(&record), &EmbedField::all(), true)
            .await;
        if outcome.errors > 0 {
            return Err(EmbeddingError::Persistence(format!(
                "Failed to update embeddings for record {record_id}"
            )));
        }
        Ok(())
    }

    /// Store-wide embedding coverage; read-only
    pub async fn stats(&self) -> EmbeddingResult<EmbeddingStats> {
        let total = self.store.count_all().await?;
        let mut fields = Vec::with_capacity(EmbedField::all().len());
        for field in EmbedField::all() {
            let with_embedding = self.store.count_embedded(field).await?;
            let missing = self.store.find_missing(field).await?.len() as u64;
            fields.push(FieldCoverage {
                field,
                with_embedding,
                missing,
            });
        }
        Ok(EmbeddingStats { total, fields })
    }

    /// Run the given records through the pipeline in sub-batches
    ///
    /// With `force` set, existing vectors are regenerated; otherwise only
    /// absent ones are produced. A failing sub-batch adds its record count
    /// to `errors` and processing continues with the next.
    pub async fn process_records(
        &self,
        records: &[IncidentRecord],
        fields: &[EmbedField],
        force: bool,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (i, chunk) in records.chunks(self.config.sub_batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    completed_batches = i,
                    remaining = records.len() - i * self.config.sub_batch_size,
                    "Backfill cancelled between sub-batches"
                );
                break;
            }
            if i > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            match self.process_chunk(chunk, fields, force).await {
                Ok(chunk_outcome) => outcome.merge(chunk_outcome),
                Err(err) => {
                    error!(
                        error = %err,
                        records = chunk.len(),
                        "Sub-batch failed; continuing with the next"
                    );
                    outcome.errors += chunk.len();
                }
            }
        }

        outcome
    }

    async fn process_chunk(
        &self,
        chunk: &[IncidentRecord],
        fields: &[EmbedField],
        force: bool,
    ) -> EmbeddingResult<BatchOutcome> {
        // Work plan: one entry per (record, field) that needs a vector
        let mut plan: Vec<(Uuid, EmbedField, String)> = Vec::new();
        for record in chunk {
            for &field in fields {
                let text = record.text_for(field);
                if text.trim().is_empty() {
                    continue;
                }
                if !force && record.embedding_for(field).is_some() {
                    continue;
                }
                plan.push((record.id, field, text.to_string()));
            }
        }
        if plan.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut vectors: Vec<Option<Vec<f32>>> =
            plan.iter().map(|(_, _, text)| self.cache.get(text)).collect();

        // Generate each distinct uncached text once
        let mut miss_texts: Vec<String> = Vec::new();
        let mut miss_keys: HashMap<u32, usize> = HashMap::new();
        for (i, vector) in vectors.iter().enumerate() {
            if vector.is_none() {
                let key = stable_hash(&normalize_text(&plan[i].2));
                miss_keys.entry(key).or_insert_with(|| {
                    miss_texts.push(plan[i].2.clone());
                    miss_texts.len() - 1
                });
            }
        }

        if !miss_texts.is_empty() {
            let generated = self.embedder.generate_batch(&miss_texts).await;
            for (i, vector) in vectors.iter_mut().enumerate() {
                if vector.is_none() {
                    let key = stable_hash(&normalize_text(&plan[i].2));
                    if let Some(generated_vector) =
                        miss_keys.get(&key).and_then(|&pos| generated[pos].clone())
                    {
                        self.cache.put(&plan[i].2, generated_vector.clone());
                        *vector = Some(generated_vector);
                    }
                }
            }
        }

        // Write back; collect per-record results into the counters
        let mut progress: HashMap<Uuid, RecordProgress> = HashMap::new();
        for ((record_id, field, _), vector) in plan.iter().zip(vectors) {
            let Some(vector) = vector else { continue };
            let entry = progress.entry(*record_id).or_default();

            let update =
                match FieldUpdate::new(*record_id, *field, vector.clone(), self.config.dimension) {
                    Ok(update) => update,
                    Err(err) => {
                        error!(record_id = %record_id, field = %field, error = %err, "Rejected malformed embedding");
                        entry.failed = true;
                        continue;
                    }
                };

            match self.store.write_embedding(update).await {
                Ok(()) => {
                    if let Err(err) = self.indexes.for_field(*field).insert(*record_id, vector) {
                        warn!(record_id = %record_id, field = %field, error = %err, "Index insert failed");
                    }
                    entry.succeeded = true;
                }
                Err(err) => {
                    error!(record_id = %record_id, field = %field, error = %err, "Failed to persist embedding");
                    entry.failed = true;
                }
            }
        }

        let mut chunk_outcome = BatchOutcome::default();
        for progress in progress.values() {
            if progress.failed {
                chunk_outcome.errors += 1;
            } else if progress.succeeded {
                chunk_outcome.processed += 1;
            }
        }
        Ok(chunk_outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use crate::provider::MockEmbeddingProvider;
    use crate::store::MockRecordStore;
    use chrono::Utc;
    use std::time::Duration;
    use test_utils::TestDataBuilder;

    fn test_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_dimension(8)
            .with_batch_pause(Duration::ZERO)
    }

    fn seeded_records(test_name: &str, count: u64) -> Vec<IncidentRecord> {
        let builder = TestDataBuilder::from_test_name(test_name);
        (0..count)
            .map(|i| {
                IncidentRecord::new(
                    builder.record_id(i),
                    builder.incident_title(i),
                    builder.incident_description(i),
                    builder.occurred_days_ago(i as i64),
                )
                .with_category(builder.category(i))
            })
            .collect()
    }

    fn processor(
        store: Arc<MemoryRecordStore>,
        config: PipelineConfig,
    ) -> BatchProcessor<MemoryRecordStore> {
        let embedder = Arc::new(TextEmbedder::new(&config));
        BatchProcessor::new(
            store,
            embedder,
            Arc::new(EmbeddingCache::new()),
            FieldIndexes::brute_force(config.dimension),
            config,
            CancelToken::new(),
        )
    }

    fn record(title: &str, description: &str) -> IncidentRecord {
        IncidentRecord::new(Uuid::new_v4(), title, description, Utc::now())
    }

    #[tokio::test]
    async fn test_backfill_then_idempotent() {
        let store = Arc::new(MemoryRecordStore::new());
        for r in seeded_records("test_backfill_then_idempotent", 5) {
            store.insert(r);
        }
        let processor = processor(store.clone(), test_config());

        let first = processor.process_missing(EmbedField::Title).await.unwrap();
        assert_eq!(first.processed, 5);
        assert_eq!(first.errors, 0);

        let second = processor.process_missing(EmbedField::Title).await.unwrap();
        assert_eq!(second.processed, 0, "second run must find nothing to do");
        assert_eq!(second.errors, 0);
    }

    #[tokio::test]
    async fn test_rebuild_regenerates_everything() {
        let store = Arc::new(MemoryRecordStore::new());
        for (i, mut r) in seeded_records("test_rebuild_regenerates_everything", 12)
            .into_iter()
            .enumerate()
        {
            if i < 10 {
                r.title_embedding = Some(vec![0.0; 8]);
            }
            store.insert(r);
        }
        let processor = processor(store.clone(), test_config());

        let outcome = processor.rebuild(EmbedField::Title).await.unwrap();
        assert_eq!(outcome.processed, 12, "all records count as missing after the clear");
        assert_eq!(outcome.errors, 0);
        assert_eq!(store.count_embedded(EmbedField::Title).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_update_one_unknown_record() {
        let store = Arc::new(MemoryRecordStore::new());
        let processor = processor(store, test_config());
        let err = processor.update_one(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_one_refreshes_both_fields() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut r = record("Burglary", "Forced entry overnight");
        r.title_embedding = Some(vec![9.0; 8]);
        let id = r.id;
        store.insert(r);
        let processor = processor(store.clone(), test_config());

        processor.update_one(id).await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        let title_vector = stored.title_embedding.unwrap();
        assert_ne!(title_vector, vec![9.0; 8], "existing vector must be regenerated");
        assert!(stored.description_embedding.is_some());
    }

    #[tokio::test]
    async fn test_failed_writes_isolated_per_sub_batch() {
        let config = test_config().with_sub_batch_size(2);
        let records: Vec<IncidentRecord> =
            (0..6).map(|i| record(&format!("Incident {i}"), "")).collect();
        let bad: Vec<Uuid> = records[2..4].iter().map(|r| r.id).collect();

        let mut store = MockRecordStore::new();
        let bad_for_write = bad.clone();
        store.expect_write_embedding().returning(move |update| {
            if bad_for_write.contains(&update.record_id) {
                Err(EmbeddingError::Persistence("disk full".to_string()))
            } else {
                Ok(())
            }
        });

        let embedder = Arc::new(TextEmbedder::new(&config));
        let processor = BatchProcessor::new(
            Arc::new(store),
            embedder,
            Arc::new(EmbeddingCache::new()),
            FieldIndexes::brute_force(config.dimension),
            config,
            CancelToken::new(),
        );

        let outcome = processor
            .process_records(&records, &[EmbedField::Title], false)
            .await;
        assert_eq!(outcome.processed, 4, "other sub-batches must keep processing");
        assert_eq!(outcome.errors, 2, "only the failing sub-batch counts as errors");
    }

    #[tokio::test]
    async fn test_duplicate_titles_invoke_provider_once() {
        let config = test_config();
        let store = Arc::new(MemoryRecordStore::new());
        store.insert(record("Camden burglary", ""));
        store.insert(record("Camden burglary", ""));

        let mut provider = MockEmbeddingProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_embed_batch()
            .withf(|texts: &[String]| texts.len() == 1)
            .times(1)
            .returning(|_| Ok(vec![vec![0.5; 8]]));

        let embedder = Arc::new(TextEmbedder::with_provider(&config, Arc::new(provider)));
        let cache = Arc::new(EmbeddingCache::new());
        let processor = BatchProcessor::new(
            store.clone(),
            embedder,
            cache.clone(),
            FieldIndexes::brute_force(config.dimension),
            config,
            CancelToken::new(),
        );

        let outcome = processor.process_missing(EmbedField::Title).await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(cache.stats().count, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_sub_batches() {
        let config = test_config().with_sub_batch_size(1);
        let store = Arc::new(MemoryRecordStore::new());
        for i in 0..4 {
            store.insert(record(&format!("Incident {i}"), ""));
        }

        let cancel = CancelToken::new();
        cancel.cancel();
        let embedder = Arc::new(TextEmbedder::new(&config));
        let processor = BatchProcessor::new(
            store.clone(),
            embedder,
            Arc::new(EmbeddingCache::new()),
            FieldIndexes::brute_force(config.dimension),
            config,
            cancel.clone(),
        );

        let outcome = processor.process_missing(EmbedField::Title).await.unwrap();
        assert_eq!(outcome.processed, 0);

        cancel.reset();
        let outcome = processor.process_missing(EmbedField::Title).await.unwrap();
        assert_eq!(outcome.processed, 4);
    }

    #[tokio::test]
    async fn test_stats_coverage() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut with_vector = record("Incident 0", "details");
        with_vector.title_embedding = Some(vec![0.0; 8]);
        store.insert(with_vector);
        store.insert(record("Incident 1", ""));
        let processor = processor(store, test_config());

        let stats = processor.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        let title = stats
            .fields
            .iter()
            .find(|c| c.field == EmbedField::Title)
            .unwrap();
        assert_eq!(title.with_embedding, 1);
        assert_eq!(title.missing, 1);
        let description = stats
            .fields
            .iter()
            .find(|c| c.field == EmbedField::Description)
            .unwrap();
        assert_eq!(description.with_embedding, 0);
        assert_eq!(description.missing, 1, "blank description on record 1 is not missing");
    }
}
