//! Typed view over the merged configuration document.

use std::time::Duration;

use serde_json::Value;

use super::defaults::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_RELEVANCE_THRESHOLD, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub relevance_threshold: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackendKind,
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub dimension: usize,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CorpusSettings {
    pub documents_dir: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub generator: GeneratorSettings,
    pub corpus: CorpusSettings,
}

impl AppSettings {
    /// Reads a validated config document; missing keys fall back to defaults.
    pub fn from_value(config: &Value) -> Self {
        let section = |name: &str| config.get(name).cloned().unwrap_or(Value::Null);
        let server = section("server");
        let retrieval = section("retrieval");
        let generation = section("generation");
        let store = section("store");
        let embedding = section("embedding");
        let generator = section("generator");
        let corpus = section("corpus");

        Self {
            server: ServerSettings {
                host: str_or(&server, "host", "127.0.0.1"),
                port: u64_or(&server, "port", 0).min(u16::MAX as u64) as u16,
            },
            retrieval: RetrievalSettings {
                top_k: u64_or(&retrieval, "top_k", DEFAULT_TOP_K as u64) as usize,
                relevance_threshold: retrieval
                    .get("relevance_threshold")
                    .and_then(Value::as_f64)
                    .unwrap_or(DEFAULT_RELEVANCE_THRESHOLD) as f32,
            },
            generation: GenerationSettings {
                max_new_tokens: u64_or(&generation, "max_new_tokens", DEFAULT_MAX_NEW_TOKENS as u64)
                    as usize,
                temperature: generation
                    .get("temperature")
                    .and_then(Value::as_f64)
                    .unwrap_or(DEFAULT_TEMPERATURE),
                timeout: generation
                    .get("timeout_secs")
                    .and_then(Value::as_u64)
                    .map(Duration::from_secs),
            },
            store: StoreSettings {
                backend: match store.get("backend").and_then(Value::as_str) {
                    Some("sqlite") => StoreBackendKind::Sqlite,
                    _ => StoreBackendKind::Memory,
                },
                sqlite_path: str_or(&store, "sqlite_path", "evidence.db"),
            },
            embedding: EmbeddingSettings {
                provider: match embedding.get("provider").and_then(Value::as_str) {
                    Some("openai") => EmbeddingProviderKind::OpenAi,
                    _ => EmbeddingProviderKind::Hashing,
                },
                dimension: u64_or(&embedding, "dimension", DEFAULT_EMBEDDING_DIMENSION as u64)
                    as usize,
                base_url: str_or(&embedding, "base_url", "http://127.0.0.1:8090"),
                model: str_or(&embedding, "model", "all-MiniLM-L6-v2"),
            },
            generator: GeneratorSettings {
                base_url: str_or(&generator, "base_url", "http://127.0.0.1:8088"),
                model: str_or(&generator, "model", "WhiteRabbitNeo-7B-v1.5a"),
                api_key: optional_str(&generator, "api_key"),
            },
            corpus: CorpusSettings {
                documents_dir: optional_str(&corpus, "documents_dir"),
                chunk_size: u64_or(&corpus, "chunk_size", DEFAULT_CHUNK_SIZE as u64) as usize,
                chunk_overlap: u64_or(&corpus, "chunk_overlap", DEFAULT_CHUNK_OVERLAP as u64)
                    as usize,
            },
        }
    }
}

fn u64_or(section: &Value, key: &str, default: u64) -> u64 {
    section.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn str_or(section: &Value, key: &str, default: &str) -> String {
    section
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn optional_str(section: &Value, key: &str) -> Option<String> {
    section
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
