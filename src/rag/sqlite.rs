//! SQLite-backed persistent evidence store.
//!
//! In-process vector store using SQLite for text, metadata and embedding
//! blobs, with the same brute-force cosine ranking as the memory backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;

use super::store::{
    validate_batch_dimension, EvidenceId, EvidenceItem, Metadata, NewEvidence, SearchHit,
    VectorBackend,
};
use crate::core::errors::GroundingError;
use crate::vector_math::rank_top_k;

const DIMENSION_KEY: &str = "embedding_dimension";

pub struct SqliteBackend {
    pool: SqlitePool,
    db_path: PathBuf,
    /// Serializes appends so the dimension check and the inserts of one batch
    /// never interleave with another writer.
    write_lock: Mutex<()>,
}

impl SqliteBackend {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, GroundingError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(GroundingError::storage)?;

        let backend = Self {
            pool,
            db_path,
            write_lock: Mutex::new(()),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), GroundingError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS evidence (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(GroundingError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(GroundingError::storage)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Malformed metadata degrades to an empty map.
    fn parse_metadata(raw: &str) -> Metadata {
        serde_json::from_str::<Metadata>(raw).unwrap_or_else(|err| {
            tracing::warn!("Ignoring malformed evidence metadata: {}", err);
            Metadata::new()
        })
    }

    /// `seq` counts from 1 and rows are never deleted; ids count from 0.
    fn evidence_id(seq: i64) -> EvidenceId {
        EvidenceId::new((seq - 1).max(0) as u64)
    }

    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> EvidenceItem {
        let seq: i64 = row.get("seq");
        let metadata: String = row.get("metadata");
        let embedding: Vec<u8> = row.get("embedding");

        EvidenceItem {
            id: Self::evidence_id(seq),
            text: row.get("content"),
            metadata: Self::parse_metadata(&metadata),
            vector: Self::deserialize_embedding(&embedding),
        }
    }

    async fn read_dimension(
        tx: &mut Transaction<'_, Sqlite>,
    ) -> Result<Option<usize>, GroundingError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = ?1")
            .bind(DIMENSION_KEY)
            .fetch_optional(&mut **tx)
            .await
            .map_err(GroundingError::storage)?;

        value
            .map(|v| {
                v.parse::<usize>().map_err(|_| {
                    GroundingError::Storage(format!("corrupt stored dimension: {v}"))
                })
            })
            .transpose()
    }
}

#[async_trait]
impl VectorBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn dimension(&self) -> Result<Option<usize>, GroundingError> {
        let mut tx = self.pool.begin().await.map_err(GroundingError::storage)?;
        let dimension = Self::read_dimension(&mut tx).await?;
        tx.commit().await.map_err(GroundingError::storage)?;
        Ok(dimension)
    }

    async fn len(&self) -> Result<usize, GroundingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evidence")
            .fetch_one(&self.pool)
            .await
            .map_err(GroundingError::storage)?;
        Ok(count as usize)
    }

    async fn append(&self, batch: Vec<NewEvidence>) -> Result<Vec<EvidenceId>, GroundingError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(GroundingError::storage)?;

        let established = Self::read_dimension(&mut tx).await?;
        let dimension = validate_batch_dimension(&batch, established)?;
        if established.is_none() {
            if let Some(dimension) = dimension {
                sqlx::query(
                    "INSERT OR REPLACE INTO rag_meta (key, value, updated_at)
                     VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                )
                .bind(DIMENSION_KEY)
                .bind(dimension.to_string())
                .execute(&mut *tx)
                .await
                .map_err(GroundingError::storage)?;
            }
        }

        let mut ids = Vec::with_capacity(batch.len());
        for evidence in &batch {
            let blob = Self::serialize_embedding(&evidence.vector);
            let metadata = serde_json::to_string(&evidence.metadata).map_err(GroundingError::storage)?;

            let result = sqlx::query(
                "INSERT INTO evidence (content, metadata, embedding) VALUES (?1, ?2, ?3)",
            )
            .bind(&evidence.text)
            .bind(&metadata)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(GroundingError::storage)?;

            ids.push(Self::evidence_id(result.last_insert_rowid()));
        }

        tx.commit().await.map_err(GroundingError::storage)?;
        Ok(ids)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, GroundingError> {
        let rows = sqlx::query(
            "SELECT seq, content, metadata, embedding
             FROM evidence
             ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(GroundingError::storage)?;

        if rows.is_empty() {
            return Err(GroundingError::EmptyStore);
        }

        let items: Vec<EvidenceItem> = rows.iter().map(Self::row_to_item).collect();
        let ranked = rank_top_k(query, items.iter().map(|item| item.vector.as_slice()), top_k)?;

        Ok(ranked
            .into_iter()
            .map(|(idx, score)| SearchHit {
                item: items[idx].clone(),
                score,
            })
            .collect())
    }
}
