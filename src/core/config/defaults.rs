use serde_json::{json, Value};

pub const DEFAULT_TOP_K: usize = 5;
/// Maximum accepted distance (`1 - cosine similarity`).
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.6;
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Built-in configuration; `config.yml` and `secrets.yaml` are merged on top.
pub fn default_config() -> Value {
    json!({
        "server": {
            "host": "127.0.0.1",
            "port": 0
        },
        "retrieval": {
            "top_k": DEFAULT_TOP_K,
            "relevance_threshold": DEFAULT_RELEVANCE_THRESHOLD
        },
        "generation": {
            "max_new_tokens": DEFAULT_MAX_NEW_TOKENS,
            "temperature": DEFAULT_TEMPERATURE,
            "timeout_secs": null
        },
        "store": {
            "backend": "memory",
            "sqlite_path": "evidence.db"
        },
        "embedding": {
            "provider": "hashing",
            "dimension": DEFAULT_EMBEDDING_DIMENSION,
            "base_url": "http://127.0.0.1:8090",
            "model": "all-MiniLM-L6-v2"
        },
        "generator": {
            "base_url": "http://127.0.0.1:8088",
            "model": "WhiteRabbitNeo-7B-v1.5a",
            "api_key": null
        },
        "corpus": {
            "documents_dir": null,
            "chunk_size": DEFAULT_CHUNK_SIZE,
            "chunk_overlap": DEFAULT_CHUNK_OVERLAP
        }
    })
}
