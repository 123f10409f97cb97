use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::models::{EmbedField, FieldUpdate, IncidentRecord};
use crate::store::RecordStore;

#[derive(Default)]
struct Inner {
    order: Vec<Uuid>,
    records: HashMap<Uuid, IncidentRecord>,
}

/// Insertion-ordered in-memory record store
///
/// Backs the demo worker and the pipeline tests; iteration follows
/// insertion order so scans and ties are deterministic.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<IncidentRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record
    pub fn insert(&self, record: IncidentRecord) {
        let mut inner = self.inner.write().expect("record store lock poisoned");
        if !inner.records.contains_key(&record.id) {
            inner.order.push(record.id);
        }
        inner.records.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("record store lock poisoned")
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: Uuid) -> EmbeddingResult<Option<IncidentRecord>> {
        let inner = self.inner.read().expect("record store lock poisoned");
        Ok(inner.records.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> EmbeddingResult<Vec<IncidentRecord>> {
        let inner = self.inner.read().expect("record store lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect())
    }

    async fn find_missing(&self, field: EmbedField) -> EmbeddingResult<Vec<Uuid>> {
        let inner = self.inner.read().expect("record store lock poisoned");
        Ok(inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .records
                    .get(id)
                    .is_some_and(|record| record.needs_embedding(field))
            })
            .copied()
            .collect())
    }

    async fn write_embedding(&self, update: FieldUpdate) -> EmbeddingResult<()> {
        let mut inner = self.inner.write().expect("record store lock poisoned");
        let record = inner
            .records
            .get_mut(&update.record_id)
            .ok_or(EmbeddingError::RecordNotFound(update.record_id))?;
        match update.field {
            EmbedField::Title => record.title_embedding = Some(update.vector),
            EmbedField::Description => record.description_embedding = Some(update.vector),
        }
        Ok(())
    }

    async fn clear_embeddings(&self, field: EmbedField) -> EmbeddingResult<u64> {
        let mut inner = self.inner.write().expect("record store lock poisoned");
        let mut cleared = 0;
        for record in inner.records.values_mut() {
            let slot = match field {
                EmbedField::Title => &mut record.title_embedding,
                EmbedField::Description => &mut record.description_embedding,
            };
            if slot.take().is_some() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn count_all(&self) -> EmbeddingResult<u64> {
        Ok(self.len() as u64)
    }

    async fn count_embedded(&self, field: EmbedField) -> EmbeddingResult<u64> {
        let inner = self.inner.read().expect("record store lock poisoned");
        Ok(inner
            .records
            .values()
            .filter(|record| record.embedding_for(field).is_some())
            .count() as u64)
    }

    async fn embedded_vectors(
        &self,
        field: EmbedField,
    ) -> EmbeddingResult<Vec<(Uuid, Vec<f32>)>> {
        let inner = self.inner.read().expect("record store lock poisoned");
        Ok(inner
            .order
            .iter()
            .filter_map(|id| {
                let record = inner.records.get(id)?;
                record.embedding_for(field).map(|v| (*id, v.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(title: &str, description: &str) -> IncidentRecord {
        IncidentRecord::new(Uuid::new_v4(), title, description, Utc::now())
    }

    #[tokio::test]
    async fn test_find_missing_skips_blank_text() {
        let store = MemoryRecordStore::new();
        let with_text = record("Burglary in Camden", "Forced entry overnight");
        let blank_title = record("", "Pickpocketing report");
        let with_text_id = with_text.id;
        store.insert(with_text);
        store.insert(blank_title);

        let missing = store.find_missing(EmbedField::Title).await.unwrap();
        assert_eq!(missing, vec![with_text_id]);
    }

    #[tokio::test]
    async fn test_find_missing_preserves_insertion_order() {
        let store = MemoryRecordStore::new();
        let mut expected = Vec::new();
        for i in 0..5 {
            let r = record(&format!("Incident {i}"), "details");
            expected.push(r.id);
            store.insert(r);
        }
        let missing = store.find_missing(EmbedField::Title).await.unwrap();
        assert_eq!(missing, expected);
    }

    #[tokio::test]
    async fn test_write_then_not_missing() {
        let store = MemoryRecordStore::new();
        let r = record("Burglary", "details");
        let id = r.id;
        store.insert(r);

        let update = FieldUpdate::new(id, EmbedField::Title, vec![0.0; 4], 4).unwrap();
        store.write_embedding(update).await.unwrap();

        assert!(store.find_missing(EmbedField::Title).await.unwrap().is_empty());
        assert_eq!(store.count_embedded(EmbedField::Title).await.unwrap(), 1);

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.title_embedding.as_deref(), Some(&[0.0f32; 4][..]));
    }

    #[tokio::test]
    async fn test_write_unknown_record_fails() {
        let store = MemoryRecordStore::new();
        let update = FieldUpdate::new(Uuid::new_v4(), EmbedField::Title, vec![0.0; 4], 4).unwrap();
        let err = store.write_embedding(update).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_clear_embeddings_counts() {
        let store = MemoryRecordStore::new();
        for i in 0..3 {
            let mut r = record(&format!("Incident {i}"), "details");
            if i < 2 {
                r.title_embedding = Some(vec![0.0; 4]);
            }
            store.insert(r);
        }
        assert_eq!(store.clear_embeddings(EmbedField::Title).await.unwrap(), 2);
        assert_eq!(store.count_embedded(EmbedField::Title).await.unwrap(), 0);
        assert_eq!(store.find_missing(EmbedField::Title).await.unwrap().len(), 3);
    }
}
