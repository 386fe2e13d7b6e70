//! # IndexChat Providers
//!
//! Generative model and query embedding providers.
//!
//! All chat backends (OpenAI, OpenRouter, Groq, DeepSeek, Ollama, llama.cpp,
//! custom endpoints) go through a single `OpenAiCompatibleProvider`. Query
//! embeddings come from OpenAI (text) and the Hugging Face Inference API
//! (CLIP for images, CLAP for audio).

pub mod huggingface;
pub mod openai_compatible;
pub mod openai_embeddings;
pub mod provider_registry;

use indexchat_core::config::{EmbeddingModelConfig, IndexChatConfig};
use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::traits::{EmbeddingProvider, ModalityEmbedders, Provider};
use indexchat_core::types::Modality;
use std::sync::Arc;

/// Create the chat provider named by `[llm] provider`.
pub fn create_provider(config: &IndexChatConfig) -> Result<Box<dyn Provider>> {
    let provider_name = config.llm.provider.as_str();

    match provider_name {
        // Custom endpoint: "custom:https://my-server.com/v1"
        other if other.starts_with("custom:") => Ok(Box::new(
            openai_compatible::OpenAiCompatibleProvider::custom(other, config)?,
        )),

        _ => {
            let registry = provider_registry::get_provider_config(provider_name).ok_or_else(|| {
                IndexChatError::Config(format!("Unknown LLM provider: {provider_name}"))
            })?;
            Ok(Box::new(
                openai_compatible::OpenAiCompatibleProvider::from_registry(registry, config)?,
            ))
        }
    }
}

/// Create one query embedder per enabled modality.
///
/// The text embedder is mandatory; a disabled text modality is a config error.
pub fn create_embedders(config: &IndexChatConfig) -> Result<ModalityEmbedders> {
    let text = create_embedder(Modality::Text, config)?.ok_or_else(|| {
        IndexChatError::Config("embeddings.text cannot be disabled".into())
    })?;
    Ok(ModalityEmbedders {
        text,
        image: create_embedder(Modality::Image, config)?,
        audio: create_embedder(Modality::Audio, config)?,
    })
}

fn create_embedder(modality: Modality, config: &IndexChatConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    let model: &EmbeddingModelConfig = config.embeddings.for_modality(modality);
    if model.is_disabled() {
        tracing::debug!("{modality} embeddings disabled");
        return Ok(None);
    }

    let timeout = config.providers.timeout();
    let embedder: Arc<dyn EmbeddingProvider> = match model.provider.as_str() {
        "openai" => Arc::new(openai_embeddings::OpenAiEmbeddingProvider::from_config(model, timeout)?),
        "huggingface" | "hf" => Arc::new(huggingface::HuggingFaceEmbeddingProvider::from_config(
            model,
            timeout,
            config.providers.hf_max_retries,
        )?),
        other => {
            return Err(IndexChatError::Config(format!(
                "Unknown embedding provider for {modality}: {other}"
            )));
        }
    };

    if !embedder.is_configured() {
        tracing::warn!("{modality} embedder '{}' has no API key", embedder.name());
    }
    Ok(Some(embedder))
}

/// List all available chat provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("custom");
    names
}
