/// OpenAI embeddings provider using the `/v1/embeddings` endpoint.
use async_trait::async_trait;
use indexchat_core::config::EmbeddingModelConfig;
use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::traits::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::openai_compatible::http_client;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Accepts `https://host`, `https://host/v1` or a full `/embeddings` URL.
fn embeddings_endpoint(base_url: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with("/embeddings") {
        return normalized.to_string();
    }
    if has_version_suffix(normalized) {
        return format!("{normalized}/embeddings");
    }
    format!("{normalized}/v1/embeddings")
}

impl OpenAiEmbeddingProvider {
    /// Key resolution: `api_key` in config > `OPENAI_API_KEY` > empty.
    pub fn from_config(config: &EmbeddingModelConfig, timeout: Duration) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
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
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    /// Only the text-embedding-3 family accepts a `dimensions` override.
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn parse_embedding_response(body: &str) -> Result<Vec<f32>> {
    let resp: EmbeddingResponse = serde_json::from_str(body)?;
    resp.data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| IndexChatError::Provider("empty embedding response".into()))
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.is_configured() {
            return Err(IndexChatError::ProviderUnavailable("OPENAI_API_KEY is not set".into()));
        }

        let req = EmbeddingRequest {
            model: &self.model,
            input: [text],
            dimensions: self.model.starts_with("text-embedding-3").then_some(self.dims),
        };

        let resp = self
            .client
            .post(embeddings_endpoint(&self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| IndexChatError::ProviderUnavailable(format!("openai embeddings: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| IndexChatError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(IndexChatError::ProviderUnavailable(format!(
                "openai embeddings error {status}: {body}"
            )));
        }

        let embedding = parse_embedding_response(&body)?;
        if embedding.len() != self.dims {
            return Err(IndexChatError::dimension_mismatch(self.dims, embedding.len()));
        }
        Ok(embedding)
    }
}
