//! Client for OpenAI-compatible inference servers (llama.cpp server,
//! LM Studio, Ollama, vLLM).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::output::clean_model_output;
use super::provider::{Embedder, Generator};
use super::types::{CompletionRequest, EmbeddingRequest};
use crate::core::errors::GroundingError;

/// Stops the model from inventing the next user turn of the prompt template.
const STOP_SEQUENCES: [&str; 2] = ["<|user|>", "<|context|>"];

#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: None,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl Generator for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn generate(
        &self,
        prompt: &str,
        max_output_length: usize,
    ) -> Result<String, GroundingError> {
        let request = CompletionRequest::new(&self.model, prompt, max_output_length)
            .with_temperature(self.temperature)
            .with_stop(STOP_SEQUENCES.iter().map(|s| s.to_string()).collect());

        let res = self
            .post("/v1/completions")
            .json(&request)
            .send()
            .await
            .map_err(GroundingError::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(GroundingError::GenerationFailure(format!(
                "completion endpoint returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(GroundingError::generation)?;
        let text = payload["choices"][0]["text"].as_str().ok_or_else(|| {
            GroundingError::GenerationFailure("completion response has no text".to_string())
        })?;

        Ok(clean_model_output(text))
    }
}

#[async_trait]
impl Embedder for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GroundingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| GroundingError::EmbeddingFailure("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GroundingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let res = self
            .post("/v1/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(GroundingError::embedding)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(GroundingError::EmbeddingFailure(format!(
                "embedding endpoint returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(GroundingError::embedding)?;
        let data = payload["data"].as_array().ok_or_else(|| {
            GroundingError::EmbeddingFailure("embedding response has no data".to_string())
        })?;

        // Servers may reorder; `index` is authoritative when present.
        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for (position, item) in data.iter().enumerate() {
            let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(position);
            let values = item["embedding"].as_array().ok_or_else(|| {
                GroundingError::EmbeddingFailure("embedding item has no vector".to_string())
            })?;
            let vector: Vec<f32> = values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            indexed.push((index, vector));
        }
        indexed.sort_by_key(|(index, _)| *index);

        if indexed.len() != texts.len() {
            return Err(GroundingError::EmbeddingFailure(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                indexed.len()
            )));
        }

        Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
    }
}
