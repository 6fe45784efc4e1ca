//! In-memory embedding cache backend.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{
    validate_batch_dimension, EvidenceId, EvidenceItem, NewEvidence, SearchHit, VectorBackend,
};
use crate::core::errors::GroundingError;
use crate::vector_math::rank_top_k;

#[derive(Default)]
struct MemoryState {
    items: Vec<EvidenceItem>,
    dimension: Option<usize>,
}

/// Items live in one vector behind a `RwLock`. A batch is validated and
/// pushed under a single write guard, so searches never see half of it.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn dimension(&self) -> Result<Option<usize>, GroundingError> {
        Ok(self.state.read().await.dimension)
    }

    async fn len(&self) -> Result<usize, GroundingError> {
        Ok(self.state.read().await.items.len())
    }

    async fn append(&self, batch: Vec<NewEvidence>) -> Result<Vec<EvidenceId>, GroundingError> {
        let mut state = self.state.write().await;
        let dimension = validate_batch_dimension(&batch, state.dimension)?;

        let mut ids = Vec::with_capacity(batch.len());
        for evidence in batch {
            let id = EvidenceId::new(state.items.len() as u64);
            state.items.push(EvidenceItem {
                id,
                text: evidence.text,
                metadata: evidence.metadata,
                vector: evidence.vector,
            });
            ids.push(id);
        }
        state.dimension = dimension;
        Ok(ids)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, GroundingError> {
        let state = self.state.read().await;
        if state.items.is_empty() {
            return Err(GroundingError::EmptyStore);
        }

        let ranked = rank_top_k(
            query,
            state.items.iter().map(|item| item.vector.as_slice()),
            top_k,
        )?;

        Ok(ranked
            .into_iter()
            .map(|(idx, score)| SearchHit {
                item: state.items[idx].clone(),
                score,
            })
            .collect())
    }
}
