use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::{DEFAULT_LIMIT, DEFAULT_THRESHOLD};
use crate::error::{EmbeddingError, EmbeddingResult};

/// Text fields of an incident record that carry an embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmbedField {
    #[default]
    Title,
    Description,
}

impl EmbedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedField::Title => "title",
            EmbedField::Description => "description",
        }
    }

    /// All embeddable fields, in processing order
    pub fn all() -> [EmbedField; 2] {
        [EmbedField::Title, EmbedField::Description]
    }

    pub fn parse_str(s: &str) -> EmbeddingResult<Self> {
        match s.to_lowercase().as_str() {
            "title" => Ok(EmbedField::Title),
            "description" => Ok(EmbedField::Description),
            _ => Err(EmbeddingError::Validation(format!(
                "Unknown embeddable field: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for EmbedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incident record as seen by the embedding pipeline
///
/// The relational store owns the full incident schema; this is the
/// projection the pipeline reads and writes. Invariant: a stored embedding
/// always has the pipeline's configured dimension, and a record whose text
/// field is blank never carries an embedding for that field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub title_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub description_embedding: Option<Vec<f32>>,
}

impl IncidentRecord {
    pub fn new(
        id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            category: None,
            occurred_at,
            title_embedding: None,
            description_embedding: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn text_for(&self, field: EmbedField) -> &str {
        match field {
            EmbedField::Title => &self.title,
            EmbedField::Description => &self.description,
        }
    }

    pub fn embedding_for(&self, field: EmbedField) -> Option<&Vec<f32>> {
        match field {
            EmbedField::Title => self.title_embedding.as_ref(),
            EmbedField::Description => self.description_embedding.as_ref(),
        }
    }

    /// Whether the field has text worth embedding but no stored vector yet
    pub fn needs_embedding(&self, field: EmbedField) -> bool {
        !self.text_for(field).trim().is_empty() && self.embedding_for(field).is_none()
    }
}

/// A validated single-field embedding update
///
/// Constructed, not assembled ad hoc: the dimension check happens here so a
/// malformed vector can never reach the store.
#[derive(Debug, Clone)]
pub struct FieldUpdate {
    pub record_id: Uuid,
    pub field: EmbedField,
    pub vector: Vec<f32>,
}

impl FieldUpdate {
    pub fn new(
        record_id: Uuid,
        field: EmbedField,
        vector: Vec<f32>,
        dimension: usize,
    ) -> EmbeddingResult<Self> {
        if vector.len() != dimension {
            return Err(EmbeddingError::Validation(format!(
                "Embedding for record {} field {} has {} components, expected {}",
                record_id,
                field,
                vector.len(),
                dimension
            )));
        }
        Ok(Self {
            record_id,
            field,
            vector,
        })
    }
}

/// Counters reported by every batch operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchOutcome {
    pub processed: usize,
    pub errors: usize,
}

impl BatchOutcome {
    pub fn merge(&mut self, other: BatchOutcome) {
        self.processed += other.processed;
        self.errors += other.errors;
    }
}

/// Per-field embedding coverage
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldCoverage {
    pub field: EmbedField,
    pub with_embedding: u64,
    pub missing: u64,
}

/// Store-wide embedding coverage, computed by scanning the record store
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmbeddingStats {
    pub total: u64,
    pub fields: Vec<FieldCoverage>,
}

/// Cache occupancy snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct CacheStats {
    pub count: usize,
    pub approx_bytes: usize,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// A similarity search request
///
/// `threshold` is a cosine DISTANCE bound: smaller means closer, and a
/// record is returned only when its distance is strictly below the
/// threshold. It is never a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct SimilarityQuery {
    pub text: String,
    #[serde(default)]
    pub field: EmbedField,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub occurred_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub occurred_before: Option<DateTime<Utc>>,
    #[serde(default = "default_threshold")]
    #[validate(range(exclusive_min = 0.0, max = 2.0))]
    pub threshold: f32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: usize,
}

impl SimilarityQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            field: EmbedField::default(),
            categories: None,
            occurred_after: None,
            occurred_before: None,
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_field(mut self, field: EmbedField) -> Self {
        self.field = field;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_window(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.occurred_after = after;
        self.occurred_before = before;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One ranked similarity hit, ascending by distance
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SimilarityMatch {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Cosine distance to the query vector; smaller = more similar
    pub distance: f32,
}

/// Diagnostic result of embedding a single text
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmbeddingProbe {
    pub vector: Vec<f32>,
    pub dimension: usize,
    pub latency_ms: u64,
}

/// Diagnostic result of embedding a batch of texts
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchProbe {
    pub count: usize,
    pub latency_ms: u64,
    pub avg_per_item_ms: f64,
}
