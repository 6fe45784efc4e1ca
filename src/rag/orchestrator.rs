//! One query, start to finish: search → filter → assemble → generate → compose.
//!
//! The orchestrator keeps no per-query state of its own, so a single
//! instance behind an `Arc` serves concurrent queries. The store is the only
//! shared resource and it handles its own locking.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::citation::CitationComposer;
use super::filter::RelevanceFilter;
use super::prompt::PromptAssembler;
use super::store::{EvidenceStore, SearchHit};
use crate::core::config::defaults::{
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_RELEVANCE_THRESHOLD, DEFAULT_TOP_K,
};
use crate::core::config::AppSettings;
use crate::core::errors::GroundingError;
use crate::llm::Generator;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub top_k: usize,
    /// Maximum accepted distance.
    pub relevance_threshold: f32,
    pub max_output_length: usize,
    pub generation_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD as f32,
            max_output_length: DEFAULT_MAX_NEW_TOKENS,
            generation_timeout: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            top_k: settings.retrieval.top_k,
            relevance_threshold: settings.retrieval.relevance_threshold,
            max_output_length: settings.generation.max_new_tokens,
            generation_timeout: settings.generation.timeout,
        }
    }
}

/// Per-call overrides of the configured retrieval defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedEvidence {
    pub text: String,
    pub score: f32,
    pub distance: f32,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedCandidate {
    pub preview: String,
    pub score: f32,
    pub distance: f32,
    pub accepted: bool,
}

/// Everything one query produced. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub accepted: Vec<AcceptedEvidence>,
    pub prompt: String,
    pub raw_generation: String,
    pub final_response: String,
    pub accepted_count: usize,
    pub used_threshold: f32,
    pub top_k: usize,
    pub retrieved: Vec<RetrievedCandidate>,
}

pub struct QueryOrchestrator {
    store: EvidenceStore,
    generator: Arc<dyn Generator>,
    filter: RelevanceFilter,
    assembler: PromptAssembler,
    composer: CitationComposer,
    config: OrchestratorConfig,
}

impl QueryOrchestrator {
    pub fn new(store: EvidenceStore, generator: Arc<dyn Generator>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            generator,
            filter: RelevanceFilter::new(),
            assembler: PromptAssembler::new(),
            composer: CitationComposer::new(),
            config,
        }
    }

    pub fn store(&self) -> &EvidenceStore {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub async fn answer(&self, query: &str) -> Result<QueryResult, GroundingError> {
        self.answer_with(query, QueryOptions::default()).await
    }

    pub async fn answer_with(
        &self,
        query: &str,
        options: QueryOptions,
    ) -> Result<QueryResult, GroundingError> {
        if query.trim().is_empty() {
            return Err(GroundingError::InvalidRequest("query must not be empty".to_string()));
        }
        let top_k = options.top_k.unwrap_or(self.config.top_k);
        let threshold = options.threshold.unwrap_or(self.config.relevance_threshold);
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(GroundingError::InvalidRequest(format!(
                "threshold must be a non-negative distance, got {threshold}"
            )));
        }

        let hits = match self.store.search(query, top_k).await {
            Ok(hits) => hits,
            Err(GroundingError::EmptyStore) => {
                tracing::warn!("Evidence store is empty; answering without context");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let accepted = self.filter.filter(&hits, threshold);
        tracing::debug!(
            "Query retrieved {} hits, accepted {} at distance <= {}",
            hits.len(),
            accepted.len(),
            threshold
        );

        let accepted_texts: Vec<&str> = accepted.iter().map(|hit| hit.item.text.as_str()).collect();
        let prompt = self.assembler.assemble(query, &accepted_texts);

        let raw_generation = self.generate(&prompt).await?;

        let had_no_evidence = accepted.is_empty();
        let final_response = self.composer.compose(&raw_generation, &accepted, had_no_evidence);

        Ok(QueryResult {
            query: query.to_string(),
            accepted_count: accepted.len(),
            accepted: accepted_evidence(&accepted),
            prompt,
            raw_generation,
            final_response,
            used_threshold: threshold,
            top_k,
            retrieved: retrieved_candidates(&hits, &self.filter, threshold),
        })
    }

    /// Any generator error, and a timeout, surface as `GenerationFailure`.
    async fn generate(&self, prompt: &str) -> Result<String, GroundingError> {
        let call = self.generator.generate(prompt, self.config.max_output_length);
        let result = match self.config.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                GroundingError::GenerationFailure(format!(
                    "generator timed out after {}s",
                    limit.as_secs_f32()
                ))
            })?,
            None => call.await,
        };

        result.map_err(|err| match err {
            GroundingError::GenerationFailure(_) => err,
            other => GroundingError::generation(other),
        })
    }
}

fn accepted_evidence(accepted: &[SearchHit]) -> Vec<AcceptedEvidence> {
    accepted
        .iter()
        .enumerate()
        .map(|(i, hit)| AcceptedEvidence {
            text: hit.item.text.clone(),
            score: hit.score,
            distance: hit.distance(),
            source: CitationComposer::source_label(hit, i + 1),
        })
        .collect()
}

fn retrieved_candidates(
    hits: &[SearchHit],
    filter: &RelevanceFilter,
    threshold: f32,
) -> Vec<RetrievedCandidate> {
    hits.iter()
        .map(|hit| {
            let text = &hit.item.text;
            let preview = if text.chars().count() > PREVIEW_CHARS {
                format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
            } else {
                text.clone()
            };
            RetrievedCandidate {
                preview,
                score: hit.score,
                distance: hit.distance(),
                accepted: filter.accepts(hit, threshold),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashingEmbedder;
    use crate::rag::citation::NO_EVIDENCE_ADVISORY;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records prompts and answers with a fixed string.
    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str, _max: usize) -> Result<String, GroundingError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("generated answer".to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str, _max: usize) -> Result<String, GroundingError> {
            Err(GroundingError::Storage("backend exploded".to_string()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str, _max: usize) -> Result<String, GroundingError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    fn store() -> EvidenceStore {
        EvidenceStore::in_memory(Arc::new(HashingEmbedder::new(512)))
    }

    #[tokio::test]
    async fn empty_store_still_answers_with_advisory() {
        let generator = Arc::new(RecordingGenerator::default());
        let orchestrator =
            QueryOrchestrator::new(store(), generator.clone(), OrchestratorConfig::default());

        let result = orchestrator.answer("What is a zero-day?").await.unwrap();

        assert_eq!(result.accepted_count, 0);
        assert!(result.retrieved.is_empty());
        assert_eq!(result.prompt, "<|user|>\nWhat is a zero-day?\n<|assistant|>");
        assert!(result.final_response.starts_with(NO_EVIDENCE_ADVISORY));
        assert!(result.final_response.ends_with("generated answer"));
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn accepted_evidence_flows_into_prompt_and_citations() {
        let store = store();
        let mut metadata = crate::rag::store::Metadata::new();
        metadata.insert("source".to_string(), "glossary.md".to_string());
        store
            .add(vec![
                ("buffer overflow corrupts memory".to_string(), Some(metadata)),
                ("banana bread recipe".to_string(), None),
            ])
            .await
            .unwrap();
        let orchestrator = QueryOrchestrator::new(
            store,
            Arc::new(RecordingGenerator::default()),
            OrchestratorConfig::default(),
        );

        let result = orchestrator
            .answer_with(
                "buffer overflow memory",
                QueryOptions {
                    top_k: Some(2),
                    threshold: Some(0.6),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.accepted_count, 1);
        assert_eq!(result.accepted[0].source, "glossary.md");
        assert!(result.prompt.contains("[1] buffer overflow corrupts memory\n"));
        assert!(result.final_response.contains("[1] Source: glossary.md (distance="));
        assert_eq!(result.retrieved.len(), 2);
        assert!(result.retrieved[0].accepted);
        assert_eq!(result.top_k, 2);
    }

    #[tokio::test]
    async fn generator_errors_become_generation_failure() {
        let orchestrator =
            QueryOrchestrator::new(store(), Arc::new(FailingGenerator), OrchestratorConfig::default());
        let err = orchestrator.answer("anything").await.unwrap_err();
        assert!(matches!(err, GroundingError::GenerationFailure(msg) if msg.contains("exploded")));
    }

    #[tokio::test]
    async fn generation_timeout_is_a_generation_failure() {
        let config = OrchestratorConfig {
            generation_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let orchestrator = QueryOrchestrator::new(store(), Arc::new(SlowGenerator), config);
        let err = orchestrator.answer("anything").await.unwrap_err();
        assert!(matches!(err, GroundingError::GenerationFailure(_)));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_search() {
        let orchestrator = QueryOrchestrator::new(
            store(),
            Arc::new(RecordingGenerator::default()),
            OrchestratorConfig::default(),
        );

        let blank = orchestrator.answer("   ").await.unwrap_err();
        assert!(matches!(blank, GroundingError::InvalidRequest(_)));

        let negative = orchestrator
            .answer_with("q", QueryOptions { top_k: None, threshold: Some(-0.1) })
            .await
            .unwrap_err();
        assert!(matches!(negative, GroundingError::InvalidRequest(_)));
    }

    #[test]
    fn long_texts_are_previewed() {
        let hit = SearchHit {
            item: crate::rag::store::EvidenceItem {
                id: crate::rag::store::EvidenceId::new(0),
                text: "y".repeat(150),
                metadata: Default::default(),
                vector: vec![],
            },
            score: 0.5,
        };
        let candidates = retrieved_candidates(&[hit], &RelevanceFilter::new(), 0.6);
        assert_eq!(candidates[0].preview.len(), 103);
        assert!(candidates[0].accepted);
    }
}
