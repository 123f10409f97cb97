use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::config::PipelineConfig;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::index::FieldIndexes;
use crate::models::{EmbedField, SimilarityMatch, SimilarityQuery};
use crate::provider::TextEmbedder;
use crate::store::RecordStore;

/// Hard predicates applied alongside the vector ranking
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub categories: Option<Vec<String>>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

impl QueryFilters {
    fn matches(&self, category: Option<&str>, occurred_at: DateTime<Utc>) -> bool {
        if let Some(categories) = &self.categories {
            match category {
                Some(category) => {
                    if !categories.iter().any(|c| c == category) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(after) = self.occurred_after {
            if occurred_at < after {
                return false;
            }
        }
        if let Some(before) = self.occurred_before {
            if occurred_at > before {
                return false;
            }
        }
        true
    }
}

/// Ranks stored records by cosine distance to a query vector
///
/// Candidates come from the field's [`VectorIndex`](crate::index::VectorIndex);
/// category and date-window filters are hard predicates applied after the
/// index lookup, and only candidates strictly under the distance threshold
/// survive. Results are ascending by distance.
pub struct SimilarityQueryEngine<R: RecordStore> {
    store: Arc<R>,
    embedder: Arc<TextEmbedder>,
    indexes: FieldIndexes,
    config: PipelineConfig,
}

impl<R: RecordStore> SimilarityQueryEngine<R> {
    pub fn new(
        store: Arc<R>,
        embedder: Arc<TextEmbedder>,
        indexes: FieldIndexes,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            indexes,
            config,
        }
    }

    /// Embed the query text and rank the store against it
    pub async fn search(&self, query: SimilarityQuery) -> EmbeddingResult<Vec<SimilarityMatch>> {
        query
            .validate()
            .map_err(|e| EmbeddingError::InvalidQuery(e.to_string()))?;
        if let (Some(after), Some(before)) = (query.occurred_after, query.occurred_before) {
            if after > before {
                return Err(EmbeddingError::InvalidQuery(
                    "Date window start is after its end".to_string(),
                ));
            }
        }

        let vector = self
            .embedder
            .generate(&query.text)
            .await
            .ok_or_else(|| EmbeddingError::InvalidQuery("Query text is blank".to_string()))?;

        let filters = QueryFilters {
            categories: query.categories.clone(),
            occurred_after: query.occurred_after,
            occurred_before: query.occurred_before,
        };
        self.query_vector(
            query.field,
            &vector,
            &filters,
            query.threshold,
            query.limit,
            None,
        )
        .await
    }

    /// Rank records near the stored vector of an existing record
    ///
    /// Fails with `RecordNotFound` when the record is absent and
    /// `MissingEmbedding` when it has no stored vector for the field. The
    /// source record is excluded from its own results.
    pub async fn similar_to(
        &self,
        record_id: Uuid,
        field: EmbedField,
        limit: Option<usize>,
    ) -> EmbeddingResult<Vec<SimilarityMatch>> {
        let record = self
            .store
            .get(record_id)
            .await?
            .ok_or(EmbeddingError::RecordNotFound(record_id))?;
        let vector = record
            .embedding_for(field)
            .ok_or(EmbeddingError::MissingEmbedding {
                id: record_id,
                field,
            })?
            .clone();

        self.query_vector(
            field,
            &vector,
            &QueryFilters::default(),
            self.config.default_threshold,
            limit.unwrap_or(self.config.similar_limit),
            Some(record_id),
        )
        .await
    }

    /// Core ranking: over-fetch from the index, filter, order, cap
    pub async fn query_vector(
        &self,
        field: EmbedField,
        vector: &[f32],
        filters: &QueryFilters,
        threshold: f32,
        limit: usize,
        exclude: Option<Uuid>,
    ) -> EmbeddingResult<Vec<SimilarityMatch>> {
        if vector.len() != self.config.dimension {
            return Err(EmbeddingError::InvalidQuery(format!(
                "Query vector has {} components, expected {}",
                vector.len(),
                self.config.dimension
            )));
        }
        if !(0.0..=2.0).contains(&threshold) || threshold == 0.0 {
            return Err(EmbeddingError::InvalidQuery(format!(
                "Threshold {threshold} outside (0, 2]"
            )));
        }
        if limit == 0 {
            return Err(EmbeddingError::InvalidQuery("Limit must be positive".to_string()));
        }

        // Over-fetch so hard filters and the threshold can discard
        // candidates without starving the result cap.
        let fetch = limit.saturating_mul(self.config.oversample).max(limit);
        let candidates = self.indexes.for_field(field).search(vector, fetch)?;
        debug!(field = %field, candidates = candidates.len(), fetch, "Index lookup complete");

        let shortlist: Vec<(Uuid, f32)> = candidates
            .into_iter()
            .filter(|(id, distance)| *distance < threshold && Some(*id) != exclude)
            .collect();
        if shortlist.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = shortlist.iter().map(|(id, _)| *id).collect();
        let records = self.store.get_many(&ids).await?;
        let by_id: HashMap<Uuid, _> = records.into_iter().map(|r| (r.id, r)).collect();

        let mut matches: Vec<SimilarityMatch> = shortlist
            .into_iter()
            .filter_map(|(id, distance)| {
                let record = by_id.get(&id)?;
                if !filters.matches(record.category.as_deref(), record.occurred_at) {
                    return None;
                }
                Some(SimilarityMatch {
                    id,
                    title: record.title.clone(),
                    description: record.description.clone(),
                    category: record.category.clone(),
                    occurred_at: record.occurred_at,
                    distance,
                })
            })
            .collect();

        // Index order is already ascending; re-sort defensively for
        // backends that only guarantee approximate ordering.
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }
}
