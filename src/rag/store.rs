//! Evidence storage: the item model, the backend seam, and the embedding
//! front that every backend sits behind.
//!
//! `EvidenceStore` owns the only path from text to stored or query vector, so
//! storage and query always go through the same embedder and the same L2
//! normalization. Backends only see unit vectors.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::GroundingError;
use crate::llm::Embedder;
use crate::vector_math::{l2_normalized, similarity_to_distance};

use super::memory::MemoryBackend;
use super::source::{DocumentSource, SourceDocument};

pub type Metadata = BTreeMap<String, String>;

/// Opaque handle of a stored item, assigned in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceId(u64);

impl EvidenceId {
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// A stored text chunk with its unit-normalized embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

impl EvidenceItem {
    /// The `source` metadata field, if present and non-blank.
    pub fn source(&self) -> Option<&str> {
        self.metadata
            .get("source")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// One search result. `score` is cosine similarity, never a distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub item: EvidenceItem,
    pub score: f32,
}

impl SearchHit {
    pub fn distance(&self) -> f32 {
        similarity_to_distance(self.score)
    }
}

/// An embedded, normalized item waiting to be appended.
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// Storage seam for evidence vectors.
///
/// Implementations must:
/// - append a batch atomically (readers see all of it or none of it)
/// - reject vectors whose length differs from the established dimension
/// - rank with `vector_math::rank_top_k` over items in insertion order
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// return the backend name (e.g. "memory", "sqlite")
    fn name(&self) -> &str;

    /// dimension fixed by the first stored batch, if any
    async fn dimension(&self) -> Result<Option<usize>, GroundingError>;

    async fn len(&self) -> Result<usize, GroundingError>;

    async fn append(&self, batch: Vec<NewEvidence>) -> Result<Vec<EvidenceId>, GroundingError>;

    /// `EmptyStore` when nothing is stored, `DimensionMismatch` on a foreign query.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, GroundingError>;
}

/// Checks that every vector in `batch` has one length, and that it matches
/// `established` when the store already has one. Returns the batch dimension.
pub(crate) fn validate_batch_dimension(
    batch: &[NewEvidence],
    established: Option<usize>,
) -> Result<Option<usize>, GroundingError> {
    let Some(first) = batch.first() else {
        return Ok(established);
    };
    let expected = established.unwrap_or(first.vector.len());
    for item in batch {
        if item.vector.len() != expected {
            return Err(GroundingError::DimensionMismatch {
                expected,
                got: item.vector.len(),
            });
        }
    }
    Ok(Some(expected))
}

const SEED_BATCH_SIZE: usize = 64;

/// Splits documents into runs of one `source`, capped at `SEED_BATCH_SIZE`.
fn seed_batches(documents: Vec<SourceDocument>) -> Vec<Vec<SourceDocument>> {
    let mut batches: Vec<Vec<SourceDocument>> = Vec::new();
    for doc in documents {
        let joins_last = batches.last().is_some_and(|batch| {
            batch.len() < SEED_BATCH_SIZE
                && batch.first().map(|first| first.metadata.get("source"))
                    == Some(doc.metadata.get("source"))
        });
        if !joins_last {
            batches.push(Vec::new());
        }
        if let Some(batch) = batches.last_mut() {
            batch.push(doc);
        }
    }
    batches
}

/// Embedding front over a `VectorBackend`.
#[derive(Clone)]
pub struct EvidenceStore {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
}

impl EvidenceStore {
    pub fn new(embedder: Arc<dyn Embedder>, backend: Arc<dyn VectorBackend>) -> Self {
        Self { embedder, backend }
    }

    /// The in-memory embedding cache.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(embedder, Arc::new(MemoryBackend::new()))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub async fn len(&self) -> Result<usize, GroundingError> {
        self.backend.len().await
    }

    pub async fn is_empty(&self) -> Result<bool, GroundingError> {
        Ok(self.len().await? == 0)
    }

    pub async fn dimension(&self) -> Result<Option<usize>, GroundingError> {
        self.backend.dimension().await
    }

    /// Embeds and appends `items` as one atomic batch.
    pub async fn add(
        &self,
        items: Vec<(String, Option<Metadata>)>,
    ) -> Result<Vec<EvidenceId>, GroundingError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = items.iter().map(|(text, _)| text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != items.len() {
            return Err(GroundingError::EmbeddingFailure(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                items.len()
            )));
        }

        let mut batch = Vec::with_capacity(items.len());
        for ((text, metadata), vector) in items.into_iter().zip(vectors) {
            batch.push(NewEvidence {
                text,
                metadata: metadata.unwrap_or_default(),
                vector: l2_normalized(&vector)?,
            });
        }

        let ids = self.backend.append(batch).await?;
        tracing::debug!(
            "Appended {} evidence items to {} store",
            ids.len(),
            self.backend.name()
        );
        Ok(ids)
    }

    /// Loads `source` into the store one batch per source file, at most
    /// `SEED_BATCH_SIZE` chunks each. A failing batch is logged and skipped.
    /// Returns the number of chunks stored.
    pub async fn seed_from(&self, source: &dyn DocumentSource) -> Result<usize, GroundingError> {
        let documents = source.load().await?;
        let mut stored = 0;
        let mut skipped = 0;

        for batch in seed_batches(documents) {
            let label = batch
                .first()
                .and_then(|doc| doc.metadata.get("source").cloned())
                .unwrap_or_default();
            let size = batch.len();
            let items = batch
                .into_iter()
                .map(|doc| (doc.text, Some(doc.metadata)))
                .collect();
            match self.add(items).await {
                Ok(ids) => stored += ids.len(),
                Err(err) => {
                    skipped += size;
                    tracing::warn!("Skipping {} chunks from {:?}: {}", size, label, err);
                }
            }
        }

        tracing::info!(
            "Seeded {} store with {} chunks from {} ({} skipped)",
            self.backend.name(),
            stored,
            source.name(),
            skipped
        );
        Ok(stored)
    }

    /// The `top_k` most similar items, best first, earliest-inserted on ties.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, GroundingError> {
        if top_k == 0 {
            return Err(GroundingError::InvalidRequest(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.backend.len().await? == 0 {
            return Err(GroundingError::EmptyStore);
        }

        let query_vector = l2_normalized(&self.embedder.embed(query).await?)?;
        self.backend.search(&query_vector, top_k).await
    }
}
