use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EmbeddingResult;
use crate::models::{EmbedField, FieldUpdate, IncidentRecord};

/// Persistence contract for incident records and their vector fields
///
/// The relational store owns the durable data; the pipeline consumes it
/// through this trait only. Per-record writes are atomic; no multi-record
/// transaction is assumed. `find_missing` and `embedded_vectors` must
/// iterate in the store's natural order so results are deterministic for a
/// fixed store state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a single record
    async fn get(&self, id: Uuid) -> EmbeddingResult<Option<IncidentRecord>>;

    /// Fetch records by id; unknown ids are skipped
    async fn get_many(&self, ids: &[Uuid]) -> EmbeddingResult<Vec<IncidentRecord>>;

    /// Ids of records whose field text is non-blank and vector is absent
    async fn find_missing(&self, field: EmbedField) -> EmbeddingResult<Vec<Uuid>>;

    /// Persist one validated field embedding
    async fn write_embedding(&self, update: FieldUpdate) -> EmbeddingResult<()>;

    /// Drop every stored vector for the field; returns how many were cleared
    async fn clear_embeddings(&self, field: EmbedField) -> EmbeddingResult<u64>;

    async fn count_all(&self) -> EmbeddingResult<u64>;

    async fn count_embedded(&self, field: EmbedField) -> EmbeddingResult<u64>;

    /// Every stored (id, vector) pair for the field, for index hydration
    async fn embedded_vectors(&self, field: EmbedField)
        -> EmbeddingResult<Vec<(Uuid, Vec<f32>)>>;
}
