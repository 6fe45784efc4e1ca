//! Offline feature-hashing embedder.
//!
//! Lowercased tokens (alphanumerics plus `-`) are counted into `dimension`
//! buckets chosen by SHA-256. Texts that share words get positive cosine
//! similarity, texts that share nothing score ~0. Deterministic across runs
//! and platforms, which makes it the reference embedder for tests and the
//! fallback when no embedding server is configured.
//!
//! Text without any token (`---`, `???`, emoji) lands in one fixed bucket,
//! so every input embeds to a non-zero vector.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::provider::Embedder;
use crate::core::errors::GroundingError;

/// Bucket key for token-less text. Not producible by `tokenize`.
const EMPTY_TEXT_KEY: &str = "\u{0}empty";

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimension as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            vector[self.bucket(&token)] += 1.0;
        }
        if vector.iter().all(|x| *x == 0.0) {
            vector[self.bucket(EMPTY_TEXT_KEY)] = 1.0;
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|token| token.trim_matches('-'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GroundingError> {
        Ok(self.vectorize(text))
    }
}
