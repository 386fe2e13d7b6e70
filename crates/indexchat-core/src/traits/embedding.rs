//! Query-embedding provider trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::Modality;

/// Turns free text into a vector in one modality's embedding space.
///
/// Implementations return a flat vector; any provider-specific response shape
/// is resolved before `embed` returns.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Dimension of the vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// `false` when the provider has no credential and should not be called.
    fn is_configured(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A query vector, or the reason one could not be produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Ready(Vec<f32>),
    Unavailable { reason: String },
}

impl QueryVector {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// The query embedders of one deployment. Text is mandatory; image and audio
/// are absent when their modality is disabled.
#[derive(Clone)]
pub struct ModalityEmbedders {
    pub text: Arc<dyn EmbeddingProvider>,
    pub image: Option<Arc<dyn EmbeddingProvider>>,
    pub audio: Option<Arc<dyn EmbeddingProvider>>,
}

impl ModalityEmbedders {
    pub fn text_only(text: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            text,
            image: None,
            audio: None,
        }
    }

    pub fn get(&self, modality: Modality) -> Option<&Arc<dyn EmbeddingProvider>> {
        match modality {
            Modality::Text => Some(&self.text),
            Modality::Image => self.image.as_ref(),
            Modality::Audio => self.audio.as_ref(),
        }
    }
}
