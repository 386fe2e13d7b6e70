//! Hugging Face Inference API feature-extraction embeddings.
//!
//! Used for the CLIP (text → image space) and CLAP (text → audio space) query
//! vectors. The API answers with either a flat vector or nested rows; both are
//! reduced to one unit-length `Vec<f32>` here.

use async_trait::async_trait;
use indexchat_core::config::EmbeddingModelConfig;
use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::traits::EmbeddingProvider;
use indexchat_knowledge::similarity::l2_normalize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::openai_compatible::http_client;

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction";
/// Upper bound on one "model is loading" wait.
const MAX_LOADING_WAIT: Duration = Duration::from_secs(10);

pub struct HuggingFaceEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HuggingFaceEmbeddingProvider {
    /// Key resolution: `api_key` in config > `HUGGINGFACE_API_KEY` > empty.
    pub fn from_config(config: &EmbeddingModelConfig, timeout: Duration, max_retries: u32) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("HUGGINGFACE_API_KEY").unwrap_or_default()
        };
        let base_url = if config.endpoint.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            base_url,
            model: config.model.clone(),
            dims: config.dimensions,
            max_retries,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }
}

/// If the response says the model is still loading, how long to wait.
fn loading_wait(status: reqwest::StatusCode, body: &str) -> Option<Duration> {
    if status != reqwest::StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }
    let err: Value = serde_json::from_str(body).ok()?;
    let message = err["error"].as_str()?;
    if !message.to_lowercase().contains("loading") {
        return None;
    }
    let secs = err["estimated_time"].as_f64().unwrap_or(20.0).max(0.0);
    Some(Duration::from_secs_f64(secs).min(MAX_LOADING_WAIT))
}

/// Reduce a feature-extraction payload to one vector.
///
/// `[f, ...]` is taken as is, `[[f, ...]]` is unwrapped, and several rows
/// (per-token features) are mean-pooled.
pub fn flatten_features(value: &Value) -> Result<Vec<f32>> {
    let rows = value
        .as_array()
        .ok_or_else(|| IndexChatError::Provider(format!("unexpected feature-extraction payload: {value}")))?;

    if rows.iter().all(Value::is_number) {
        return rows
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| IndexChatError::Provider("non-numeric feature".into()))
            })
            .collect();
    }

    let mut pooled: Vec<f64> = Vec::new();
    let mut count = 0usize;
    for row in rows {
        let v = flatten_features(row)?;
        if pooled.is_empty() {
            pooled = vec![0.0; v.len()];
        } else if v.len() != pooled.len() {
            return Err(IndexChatError::dimension_mismatch(pooled.len(), v.len()));
        }
        for (acc, x) in pooled.iter_mut().zip(&v) {
            *acc += f64::from(*x);
        }
        count += 1;
    }
    if count == 0 {
        return Err(IndexChatError::Provider("empty feature-extraction payload".into()));
    }
    Ok(pooled.into_iter().map(|x| (x / count as f64) as f32).collect())
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddingProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.is_configured() {
            return Err(IndexChatError::ProviderUnavailable(
                "HUGGINGFACE_API_KEY is not set".into(),
            ));
        }

        let url = self.url();
        let body = json!({ "inputs": text });
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| IndexChatError::ProviderUnavailable(format!("{}: {e}", self.model)))?;

            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| IndexChatError::Http(e.to_string()))?;

            if status.is_success() {
                let value: Value = serde_json::from_str(&text)?;
                let mut vector = flatten_features(&value)?;
                if vector.len() != self.dims {
                    return Err(IndexChatError::dimension_mismatch(self.dims, vector.len()));
                }
                l2_normalize(&mut vector);
                return Ok(vector);
            }

            match loading_wait(status, &text) {
                Some(wait) if attempt < self.max_retries => {
                    tracing::info!("{} is loading, retrying in {wait:?} ({attempt}/{})", self.model, self.max_retries);
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    return Err(IndexChatError::ProviderUnavailable(format!(
                        "{} error {status}: {text}",
                        self.model
                    )));
                }
            }
        }
    }
}
