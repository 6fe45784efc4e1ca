use std::sync::Arc;

use async_trait::async_trait;
use cyberbot_backend::core::errors::GroundingError;
use cyberbot_backend::llm::{Embedder, Generator, HashingEmbedder};
use cyberbot_backend::rag::{
    ChunkerConfig, EvidenceStore, Metadata, OrchestratorConfig, QueryOptions, QueryOrchestrator,
    SqliteBackend, TextDirectorySource, NO_EVIDENCE_ADVISORY,
};

const ZERO_DAY_CORPUS: [&str; 3] = [
    "A zero-day is an unknown flaw.",
    "CVE-2024-1 affects product X.",
    "Unrelated cooking recipe.",
];

struct CannedGenerator;

#[async_trait]
impl Generator for CannedGenerator {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _prompt: &str, _max: usize) -> Result<String, GroundingError> {
        Ok("Grounded answer.".to_string())
    }
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(1024))
}

fn orchestrator(store: EvidenceStore) -> QueryOrchestrator {
    QueryOrchestrator::new(store, Arc::new(CannedGenerator), OrchestratorConfig::default())
}

fn with_sources(texts: &[&str]) -> Vec<(String, Option<Metadata>)> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let mut metadata = Metadata::new();
            metadata.insert("source".to_string(), format!("doc-{i}.txt"));
            (text.to_string(), Some(metadata))
        })
        .collect()
}

fn security_corpus() -> Vec<&'static str> {
    vec![
        "A zero-day is an unknown flaw in software.",
        "Buffer overflow bugs corrupt adjacent memory.",
        "SQL injection abuses unsanitized query input.",
        "Phishing emails trick users into revealing passwords.",
        "Ransomware encrypts files and demands payment.",
        "Patch management closes known software flaws.",
        "Memory safety prevents buffer overflow bugs.",
    ]
}

async fn seeded_store(texts: &[&str]) -> EvidenceStore {
    let store = EvidenceStore::in_memory(embedder());
    store.add(with_sources(texts)).await.unwrap();
    store
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[tokio::test]
async fn zero_day_round_trip() {
    let store = EvidenceStore::in_memory(embedder());
    store
        .add(ZERO_DAY_CORPUS.iter().map(|t| (t.to_string(), None)).collect())
        .await
        .unwrap();

    let result = orchestrator(store)
        .answer_with(
            "What is a zero-day?",
            QueryOptions {
                top_k: Some(3),
                threshold: Some(0.6),
            },
        )
        .await
        .unwrap();

    assert_eq!(result.accepted_count, 1);
    assert_eq!(result.accepted[0].text, ZERO_DAY_CORPUS[0]);
    assert!(result.accepted.iter().all(|e| e.text != ZERO_DAY_CORPUS[2]));
    assert_eq!(count(&result.prompt, "[1] "), 1);
    assert_eq!(count(&result.prompt, "[2] "), 0);
    assert_eq!(count(&result.final_response, "[1] Source: Doc 1"), 1);
    assert_eq!(count(&result.final_response, "[2]"), 0);
    assert_eq!(result.retrieved.len(), 3);
}

#[tokio::test]
async fn ranking_is_deterministic() {
    let store = seeded_store(&security_corpus()).await;

    let first = store.search("buffer overflow memory", 5).await.unwrap();
    let second = store.search("buffer overflow memory", 5).await.unwrap();

    let ids = |hits: &[cyberbot_backend::rag::SearchHit]| -> Vec<_> {
        hits.iter().map(|h| (h.item.id, h.score)).collect()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn smaller_top_k_is_a_prefix_of_larger() {
    let corpus = security_corpus();
    let store = seeded_store(&corpus).await;
    let full = store.search("software flaws and memory bugs", corpus.len()).await.unwrap();
    assert_eq!(full.len(), corpus.len());

    for k in 1..=corpus.len() {
        let partial = store.search("software flaws and memory bugs", k).await.unwrap();
        assert_eq!(partial.len(), k);
        for (a, b) in partial.iter().zip(&full) {
            assert_eq!(a.item.id, b.item.id);
        }
    }
}

#[tokio::test]
async fn accepted_set_matches_distance_boundary() {
    let store = seeded_store(&security_corpus()).await;
    let orchestrator = orchestrator(store);

    for threshold in [0.0_f32, 0.3, 0.6, 0.9, 1.0, 2.0] {
        let result = orchestrator
            .answer_with(
                "buffer overflow memory safety",
                QueryOptions {
                    top_k: Some(7),
                    threshold: Some(threshold),
                },
            )
            .await
            .unwrap();

        let expected: Vec<f32> = result
            .retrieved
            .iter()
            .filter(|c| c.distance <= threshold)
            .map(|c| c.score)
            .collect();
        let accepted: Vec<f32> = result.accepted.iter().map(|e| e.score).collect();
        assert_eq!(accepted, expected, "threshold {threshold}");
        assert!(result.retrieved.iter().all(|c| c.accepted == (c.distance <= threshold)));
    }
}

#[tokio::test]
async fn exact_text_is_accepted_at_zero_threshold() {
    let corpus = security_corpus();
    let store = seeded_store(&corpus).await;

    let result = orchestrator(store)
        .answer_with(
            corpus[3],
            QueryOptions {
                top_k: Some(3),
                threshold: Some(0.0),
            },
        )
        .await
        .unwrap();

    assert!(result.accepted_count >= 1);
    assert_eq!(result.accepted[0].text, corpus[3]);
    assert_eq!(result.accepted[0].distance, 0.0);
}

#[tokio::test]
async fn context_markers_and_citations_name_the_same_evidence() {
    let corpus = security_corpus();
    let store = seeded_store(&corpus).await;

    let result = orchestrator(store)
        .answer_with(
            "buffer overflow memory bugs",
            QueryOptions {
                top_k: Some(7),
                threshold: Some(0.9),
            },
        )
        .await
        .unwrap();

    assert!(result.accepted_count >= 2);
    for (i, evidence) in result.accepted.iter().enumerate() {
        let marker = i + 1;
        assert!(result.prompt.contains(&format!("[{marker}] {}\n", evidence.text)));

        let index = corpus.iter().position(|t| *t == evidence.text).unwrap();
        assert_eq!(evidence.source, format!("doc-{index}.txt"));
        assert!(result
            .final_response
            .contains(&format!("[{marker}] Source: doc-{index}.txt (distance=")));
    }
}

#[tokio::test]
async fn empty_store_answers_without_evidence() {
    let orchestrator = orchestrator(EvidenceStore::in_memory(embedder()));

    for _ in 0..2 {
        let result = orchestrator.answer("What is a zero-day?").await.unwrap();
        assert_eq!(result.accepted_count, 0);
        assert!(result.final_response.contains(NO_EVIDENCE_ADVISORY));
        assert!(!result.prompt.contains("<|context|>"));
    }
}

async fn assert_batches_are_atomic(store: EvidenceStore) {
    const BATCH: usize = 5;
    const WRITERS: usize = 4;
    const BATCHES_PER_WRITER: usize = 10;

    let mut writers = Vec::new();
    for w in 0..WRITERS {
        let store = store.clone();
        writers.push(tokio::spawn(async move {
            for b in 0..BATCHES_PER_WRITER {
                let batch = (0..BATCH)
                    .map(|i| (format!("writer {w} batch {b} item {i} exploit"), None))
                    .collect();
                store.add(batch).await.unwrap();
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let committed_before = store.len().await.unwrap();
                match store.search("exploit", 1000).await {
                    Ok(hits) => {
                        assert!(hits.len() >= committed_before, "lost committed items");
                        assert_eq!(hits.len() % BATCH, 0, "saw a partial batch");
                    }
                    Err(GroundingError::EmptyStore) => assert_eq!(committed_before, 0),
                    Err(err) => panic!("unexpected error: {err}"),
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in writers.into_iter().chain(readers) {
        handle.await.unwrap();
    }
    assert_eq!(store.len().await.unwrap(), WRITERS * BATCH * BATCHES_PER_WRITER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_searches_never_observe_partial_batches() {
    assert_batches_are_atomic(EvidenceStore::in_memory(embedder())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_searches_never_observe_partial_batches() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SqliteBackend::open(dir.path().join("evidence.db")).await.unwrap();
    assert_batches_are_atomic(EvidenceStore::new(embedder(), Arc::new(backend))).await;
}

#[tokio::test]
async fn memory_and_sqlite_rank_identically() {
    let corpus = security_corpus();
    let dir = tempfile::tempdir().unwrap();

    let memory = seeded_store(&corpus).await;
    let sqlite = EvidenceStore::new(
        embedder(),
        Arc::new(SqliteBackend::open(dir.path().join("evidence.db")).await.unwrap()),
    );
    sqlite.add(with_sources(&corpus)).await.unwrap();

    for query in ["buffer overflow", "software flaws", "passwords and phishing"] {
        let a = memory.search(query, corpus.len()).await.unwrap();
        let b = sqlite.search(query, corpus.len()).await.unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.item.text, y.item.text, "query {query}");
            assert_eq!(x.item.id, y.item.id);
            assert!((x.score - y.score).abs() < 1e-6);
            assert_eq!(x.item.source(), y.item.source());
        }
    }
}

#[tokio::test]
async fn punctuation_only_query_gets_an_ungrounded_answer() {
    let store = EvidenceStore::in_memory(embedder());
    store
        .add(ZERO_DAY_CORPUS.iter().map(|t| (t.to_string(), None)).collect())
        .await
        .unwrap();

    let result = orchestrator(store)
        .answer_with(
            "???",
            QueryOptions {
                top_k: Some(3),
                threshold: Some(0.3),
            },
        )
        .await
        .unwrap();

    assert_eq!(result.accepted_count, 0);
    assert!(result.final_response.starts_with(NO_EVIDENCE_ADVISORY));
}

#[tokio::test]
async fn punctuation_only_file_does_not_block_seeding() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), ZERO_DAY_CORPUS[0]).unwrap();
    std::fs::write(dir.path().join("b.md"), "---").unwrap();
    std::fs::write(dir.path().join("c.txt"), ZERO_DAY_CORPUS[1]).unwrap();

    let store = EvidenceStore::in_memory(embedder());
    let source = TextDirectorySource::new(dir.path(), ChunkerConfig::default());
    assert_eq!(store.seed_from(&source).await.unwrap(), 3);

    let result = orchestrator(store)
        .answer_with(
            "What is a zero-day?",
            QueryOptions {
                top_k: Some(3),
                threshold: Some(0.6),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.accepted[0].text, ZERO_DAY_CORPUS[0]);
    assert_eq!(result.accepted[0].source, "a.txt");
}
