//! IndexChat error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexChatError>;

#[derive(Debug, Error)]
pub enum IndexChatError {
    /// A stored or query vector could not be decoded.
    #[error("Malformed embedding: {0}")]
    MalformedEmbedding(String),

    /// Two vectors (or a vector and its configured modality) disagree on length.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An embedding or generation call failed, timed out, or has no credential.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Index error: {0}")]
    Index(String),

    /// The provider answered, but with something we could not use.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexChatError {
    /// Shorthand used by the codec and the similarity engine.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Whether this error belongs to a single stored chunk rather than the
    /// whole lookup.
    pub fn is_chunk_fault(&self) -> bool {
        matches!(
            self,
            Self::MalformedEmbedding(_) | Self::DimensionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = IndexChatError::dimension_mismatch(512, 3072);
        assert_eq!(err.to_string(), "Dimension mismatch: expected 512, got 3072");
        assert!(err.is_chunk_fault());
    }

    #[test]
    fn test_provider_errors_are_not_chunk_faults() {
        assert!(!IndexChatError::ProviderUnavailable("x".into()).is_chunk_fault());
        assert!(IndexChatError::MalformedEmbedding("7 bytes".into()).is_chunk_fault());
    }
}
