use async_trait::async_trait;

use crate::core::errors::GroundingError;

/// Turns text into a fixed-length vector.
///
/// Implementations must be deterministic for a given model version. They do
/// not have to normalize; the evidence store normalizes every vector it keeps
/// or compares.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// return the embedder name (e.g. "hashing", "openai-compat")
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GroundingError>;

    /// one vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GroundingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Produces the answer text for an assembled prompt.
///
/// May be non-deterministic and is never assumed idempotent.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        max_output_length: usize,
    ) -> Result<String, GroundingError>;
}
