//! # Embedding Service Client
//!
//! ## Purpose
//! Fixed-dimension vector generation against the external embedding service,
//! with request batching, input truncation, per-request timeouts, and a
//! bounded exponential backoff on transient failures.
//!
//! ## Input/Output Specification
//! - **Input**: Batches of texts (each truncated to the configured cap)
//! - **Output**: One `dimension`-length vector per input, in request order
//! - **Failure**: after the retry budget is exhausted the case fails; a
//!   dimension mismatch fails immediately (misconfigured deployment)

use crate::config::EmbeddingConfig;
use crate::errors::{PipelineError, Result};
use crate::utils::truncate_chars;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Embedding service client
pub struct EmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    inputs: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    /// Vectors in request order
    #[serde(alias = "embeddings")]
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("caselaw-pipeline/1.0")
            .build()
            .map_err(|e| PipelineError::Config {
                message: format!("failed to build embedding client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Embed all texts, batching by the configured batch size. Vectors come
    /// back in input order.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let inputs: Vec<&str> = batch
                .iter()
                .map(|text| truncate_chars(text, self.config.truncate_chars))
                .collect();
            vectors.extend(self.embed_batch_with_retry(&inputs).await?);
        }
        Ok(vectors)
    }

    /// Embed one text (case-level embedding)
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_all(&texts).await?;
        vectors.pop().ok_or_else(|| PipelineError::EmbeddingFailed {
            attempts: self.config.retry_attempts,
            details: "service returned no vector".to_string(),
        })
    }

    async fn embed_batch_with_retry(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = String::new();
        for attempt in 0..self.config.retry_attempts {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1));
                warn!(
                    "Embedding request failed ({last_error}), retrying in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    self.config.retry_attempts
                );
                tokio::time::sleep(delay).await;
            }
            match self.embed_batch(inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(PipelineError::EmbeddingDimension { expected, actual }) => {
                    // A wrong dimension never heals with a retry
                    return Err(PipelineError::EmbeddingDimension { expected, actual });
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(PipelineError::EmbeddingFailed {
            attempts: self.config.retry_attempts,
            details: last_error,
        })
    }

    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.config.base_url.trim_end_matches('/'));
        debug!("Embedding batch of {} texts", inputs.len());

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.config.model,
                inputs: inputs.to_vec(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Internal {
                message: format!(
                    "embedding service HTTP {}: {}",
                    response.status(),
                    response.text().await.unwrap_or_default()
                ),
            });
        }

        let body: EmbedResponse = response.json().await?;
        if body.vectors.len() != inputs.len() {
            return Err(PipelineError::Internal {
                message: format!(
                    "embedding service returned {} vectors for {} inputs",
                    body.vectors.len(),
                    inputs.len()
                ),
            });
        }
        for vector in &body.vectors {
            if vector.len() != self.config.dimension {
                return Err(PipelineError::EmbeddingDimension {
                    expected: self.config.dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(body.vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_truncation_cap() {
        let config = EmbeddingConfig::default();
        let long: String = "x".repeat(10_000);
        let truncated = truncate_chars(&long, config.truncate_chars);
        assert_eq!(truncated.len(), 4_000);
    }

    #[test]
    fn test_embed_response_accepts_both_field_names() {
        let spec_form: EmbedResponse =
            serde_json::from_str(r#"{"vectors": [[0.1, 0.2]]}"#).unwrap();
        assert_eq!(spec_form.vectors.len(), 1);

        let legacy_form: EmbedResponse =
            serde_json::from_str(r#"{"embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#).unwrap();
        assert_eq!(legacy_form.vectors.len(), 2);
    }
}
