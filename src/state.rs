use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::core::config::{
    AppPaths, AppSettings, ConfigService, EmbeddingProviderKind, StoreBackendKind,
};
use crate::llm::{Embedder, Generator, HashingEmbedder, OpenAiCompatProvider};
use crate::rag::{
    ChunkerConfig, EvidenceStore, MemoryBackend, OrchestratorConfig, QueryOrchestrator,
    SqliteBackend, TextDirectorySource, VectorBackend,
};

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: AppSettings,
    pub store: EvidenceStore,
    pub orchestrator: Arc<QueryOrchestrator>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Loads config under `paths`, wires the configured collaborators and
    /// seeds an empty store from the corpus directory.
    pub async fn with_paths(paths: Arc<AppPaths>) -> anyhow::Result<Arc<Self>> {
        let config = ConfigService::new(paths.clone());
        let settings = config.load_settings().context("Failed to load configuration")?;

        let embedder = build_embedder(&settings);
        let backend = build_backend(&settings, &paths).await?;
        let store = EvidenceStore::new(embedder, backend);
        seed_store(&store, &settings, &paths).await;

        let generator: Arc<dyn Generator> = Arc::new(
            OpenAiCompatProvider::new(&settings.generator.base_url, &settings.generator.model)
                .with_api_key(settings.generator.api_key.clone())
                .with_temperature(settings.generation.temperature),
        );

        Ok(Self::from_parts(paths, config, settings, store, generator))
    }

    /// Assembles state around an existing store and generator.
    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: AppSettings,
        store: EvidenceStore,
        generator: Arc<dyn Generator>,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(QueryOrchestrator::new(
            store.clone(),
            generator,
            OrchestratorConfig::from_settings(&settings),
        ));

        Arc::new(AppState {
            paths,
            config,
            settings,
            store,
            orchestrator,
            started_at: Utc::now(),
        })
    }
}

fn build_embedder(settings: &AppSettings) -> Arc<dyn Embedder> {
    match settings.embedding.provider {
        EmbeddingProviderKind::Hashing => Arc::new(HashingEmbedder::new(settings.embedding.dimension)),
        EmbeddingProviderKind::OpenAi => Arc::new(
            OpenAiCompatProvider::new(&settings.embedding.base_url, &settings.embedding.model)
                .with_api_key(settings.generator.api_key.clone()),
        ),
    }
}

async fn build_backend(
    settings: &AppSettings,
    paths: &AppPaths,
) -> anyhow::Result<Arc<dyn VectorBackend>> {
    match settings.store.backend {
        StoreBackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        StoreBackendKind::Sqlite => {
            let db_path = paths.resolve(&settings.store.sqlite_path);
            let backend = SqliteBackend::open(&db_path)
                .await
                .with_context(|| format!("Failed to open evidence db {}", db_path.display()))?;
            tracing::info!("Evidence store at {}", db_path.display());
            Ok(Arc::new(backend))
        }
    }
}

/// Seeding failures are logged; the server still starts with what it has.
async fn seed_store(store: &EvidenceStore, settings: &AppSettings, paths: &AppPaths) {
    let Some(dir) = settings.corpus.documents_dir.as_deref() else {
        return;
    };

    match store.is_empty().await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!("Evidence store already populated; skipping corpus seeding");
            return;
        }
        Err(err) => {
            tracing::warn!("Failed to inspect evidence store: {}", err);
            return;
        }
    }

    let source = TextDirectorySource::new(
        paths.resolve(dir),
        ChunkerConfig {
            chunk_size: settings.corpus.chunk_size,
            chunk_overlap: settings.corpus.chunk_overlap,
        },
    );
    if let Err(err) = store.seed_from(&source).await {
        tracing::warn!("Failed to seed evidence store from {}: {}", dir, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_store_from_configured_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let corpus = data_dir.join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();
        std::fs::write(corpus.join("cve.txt"), "A CVE identifies a public vulnerability.").unwrap();
        std::fs::write(
            data_dir.join("config.yml"),
            "corpus:\n  documents_dir: corpus\nembedding:\n  dimension: 128\n",
        )
        .unwrap();

        let paths = Arc::new(AppPaths::with_data_dir(dir.path().to_path_buf(), data_dir));
        let state = AppState::with_paths(paths).await.unwrap();

        assert_eq!(state.store.len().await.unwrap(), 1);
        assert_eq!(state.store.backend_name(), "memory");
        assert_eq!(state.store.dimension().await.unwrap(), Some(128));
    }

    #[tokio::test]
    async fn sqlite_backend_is_created_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join("config.yml"), "store:\n  backend: sqlite\n").unwrap();

        let paths = Arc::new(AppPaths::with_data_dir(dir.path().to_path_buf(), data_dir.clone()));
        let state = AppState::with_paths(paths).await.unwrap();

        assert_eq!(state.store.backend_name(), "sqlite");
        assert!(data_dir.join("evidence.db").exists());
    }
}
