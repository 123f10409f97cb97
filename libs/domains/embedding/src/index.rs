use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::models::EmbedField;

/// Cosine distance between two vectors: `1 - cosine_similarity`
///
/// Range [0, 2]; 0 means identical direction. Zero vectors are treated as
/// maximally dissimilar (distance 1.0) rather than an error.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - (dot / (norm_a * norm_b))
    }
}

/// Nearest-neighbor index capability consumed by the query engine
///
/// The engine only needs insert and k-nearest lookup; any backend
/// satisfying this trait plugs in without engine changes, from the exact
/// linear scan below to a production HNSW or IVFFlat index.
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector for an id
    fn insert(&self, id: Uuid, vector: Vec<f32>) -> EmbeddingResult<()>;

    /// Remove an id; unknown ids are ignored
    fn remove(&self, id: &Uuid);

    /// The k nearest candidates, ascending by cosine distance
    fn search(&self, vector: &[f32], k: usize) -> EmbeddingResult<Vec<(Uuid, f32)>>;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Construction parameters for graph-based (HNSW) indexes
///
/// Default for moderate corpora; higher `ef_construct` trades build time
/// for recall.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HnswParams {
    pub m: u32,
    pub ef_construct: u32,
    pub full_scan_threshold: Option<u32>,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 100,
            full_scan_threshold: None,
        }
    }
}

/// Construction parameters for partition-based (IVFFlat) indexes
///
/// Preferred once the corpus passes roughly a million vectors: faster
/// builds and updates for a small recall loss.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IvfFlatParams {
    pub lists: u32,
    pub probes: u32,
}

impl Default for IvfFlatParams {
    fn default() -> Self {
        Self {
            lists: 100,
            probes: 10,
        }
    }
}

/// Index strategy selection for production backends
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IndexParams {
    Hnsw(HnswParams),
    IvfFlat(IvfFlatParams),
}

/// Exact nearest-neighbor index backed by a linear scan
///
/// Correct for any corpus and fast enough for moderate ones; also the
/// reference implementation the engine tests run against. Entries keep
/// insertion order so equal distances rank deterministically.
pub struct BruteForceIndex {
    dimension: usize,
    entries: RwLock<Vec<(Uuid, Vec<f32>)>>,
}

impl BruteForceIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl VectorIndex for BruteForceIndex {
    fn insert(&self, id: Uuid, vector: Vec<f32>) -> EmbeddingResult<()> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::Validation(format!(
                "Vector for {} has {} components, index expects {}",
                id,
                vector.len(),
                self.dimension
            )));
        }

        let mut entries = self.entries.write().expect("vector index lock poisoned");
        match entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = vector,
            None => entries.push((id, vector)),
        }
        Ok(())
    }

    fn remove(&self, id: &Uuid) {
        self.entries
            .write()
            .expect("vector index lock poisoned")
            .retain(|(existing, _)| existing != id);
    }

    fn search(&self, vector: &[f32], k: usize) -> EmbeddingResult<Vec<(Uuid, f32)>> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::InvalidQuery(format!(
                "Query vector has {} components, index expects {}",
                vector.len(),
                self.dimension
            )));
        }

        let entries = self.entries.read().expect("vector index lock poisoned");
        let mut scored: Vec<(Uuid, f32)> = entries
            .iter()
            .map(|(id, stored)| (*id, cosine_distance(vector, stored)))
            .collect();
        // Stable sort keeps insertion order for ties
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn clear(&self) {
        self.entries
            .write()
            .expect("vector index lock poisoned")
            .clear();
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .expect("vector index lock poisoned")
            .len()
    }
}

/// One shared index per embeddable field
#[derive(Clone)]
pub struct FieldIndexes {
    title: Arc<dyn VectorIndex>,
    description: Arc<dyn VectorIndex>,
}

impl FieldIndexes {
    /// Brute-force indexes for every field; the default wiring
    pub fn brute_force(dimension: usize) -> Self {
        Self {
            title: Arc::new(BruteForceIndex::new(dimension)),
            description: Arc::new(BruteForceIndex::new(dimension)),
        }
    }

    pub fn new(title: Arc<dyn VectorIndex>, description: Arc<dyn VectorIndex>) -> Self {
        Self { title, description }
    }

    pub fn for_field(&self, field: EmbedField) -> &Arc<dyn VectorIndex> {
        match field {
            EmbedField::Title => &self.title,
            EmbedField::Description => &self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_known_values() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0];
        let c = [0.0, 1.0];
        let d = [-1.0, 0.0];

        assert!(cosine_distance(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &c) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&a, &d) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_zero_vector() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_search_orders_ascending() {
        let index = BruteForceIndex::new(2);
        let near = Uuid::new_v4();
        let mid = Uuid::new_v4();
        let far = Uuid::new_v4();

        index.insert(far, vec![-1.0, 0.0]).unwrap();
        index.insert(near, vec![1.0, 0.1]).unwrap();
        index.insert(mid, vec![0.5, 0.9]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![near, mid, far]);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn test_search_truncates_to_k() {
        let index = BruteForceIndex::new(2);
        for _ in 0..10 {
            index.insert(Uuid::new_v4(), vec![1.0, 0.0]).unwrap();
        }
        assert_eq!(index.search(&[1.0, 0.0], 3).unwrap().len(), 3);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let index = BruteForceIndex::new(2);
        let id = Uuid::new_v4();
        index.insert(id, vec![1.0, 0.0]).unwrap();
        index.insert(id, vec![0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&[0.0, 1.0], 1).unwrap();
        assert!(hits[0].1.abs() < 1e-6);
    }

    #[test]
    fn test_dimension_checks() {
        let index = BruteForceIndex::new(4);
        assert!(index.insert(Uuid::new_v4(), vec![0.0; 3]).is_err());
        assert!(index.search(&[0.0; 3], 1).is_err());
    }

    #[test]
    fn test_index_params_defaults() {
        let hnsw = HnswParams::default();
        assert_eq!(hnsw.m, 16);
        assert_eq!(hnsw.ef_construct, 100);

        let ivf = IvfFlatParams::default();
        assert_eq!(ivf.lists, 100);
        assert_eq!(ivf.probes, 10);
    }

    #[test]
    fn test_remove_and_clear() {
        let index = BruteForceIndex::new(2);
        let id = Uuid::new_v4();
        index.insert(id, vec![1.0, 0.0]).unwrap();
        index.remove(&id);
        assert!(index.is_empty());

        index.insert(Uuid::new_v4(), vec![1.0, 0.0]).unwrap();
        index.clear();
        assert!(index.is_empty());
    }
}
