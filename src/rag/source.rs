//! Document sources for seeding the evidence store.
//!
//! A source yields already-chunked text with metadata; the store embeds it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::store::Metadata;
use crate::core::config::defaults::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::core::errors::GroundingError;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// One chunk ready for `EvidenceStore::add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    pub metadata: Metadata,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<SourceDocument>, GroundingError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Splits `text` into overlapping character windows, cutting each window
/// (except the last) after a sentence ending found in its final fifth.
/// Blank chunks are dropped.
pub fn split_into_chunks(text: &str, config: ChunkerConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();
    let chunk_size = config.chunk_size.max(1);
    let step = chunk_size.saturating_sub(config.chunk_overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total_chars {
        let end = (start + chunk_size).min(total_chars);
        let window = &chars[start..end];

        let cut = if end < total_chars {
            sentence_boundary(window).unwrap_or(window.len())
        } else {
            window.len()
        };

        let chunk: String = window[..cut].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end == total_chars {
            break;
        }
        start += step;
    }

    chunks
}

/// Position just past the last sentence ending in the final 20% of `window`.
fn sentence_boundary(window: &[char]) -> Option<usize> {
    let search_start = (window.len() * 80) / 100;
    (search_start..window.len().saturating_sub(1))
        .rev()
        .find(|&i| matches!(window[i], '.' | '!' | '?') && matches!(window[i + 1], ' ' | '\n'))
        .map(|i| i + 2)
}

/// Plain-text corpus directory: every `.txt` and `.md` file, in name order.
pub struct TextDirectorySource {
    dir: PathBuf,
    chunker: ChunkerConfig,
    name: String,
}

impl TextDirectorySource {
    pub fn new(dir: impl Into<PathBuf>, chunker: ChunkerConfig) -> Self {
        let dir = dir.into();
        let name = dir.display().to_string();
        Self { dir, chunker, name }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>, GroundingError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|err| {
            GroundingError::Storage(format!(
                "failed to read documents dir {}: {}",
                self.dir.display(),
                err
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(GroundingError::storage)? {
            let path = entry.path();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if supported && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl DocumentSource for TextDirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Vec<SourceDocument>, GroundingError> {
        let mut documents = Vec::new();

        for path in self.list_files().await? {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!("Skipping unreadable document {}: {}", path.display(), err);
                    continue;
                }
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let doc_type = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();

            for (index, text) in split_into_chunks(&content, self.chunker).into_iter().enumerate() {
                let mut metadata = Metadata::new();
                metadata.insert("source".to_string(), file_name.clone());
                metadata.insert("chunk".to_string(), index.to_string());
                metadata.insert("type".to_string(), doc_type.clone());
                documents.push(SourceDocument { text, metadata });
            }
        }

        tracing::debug!("Loaded {} chunks from {}", documents.len(), self.dir.display());
        Ok(documents)
    }
}
