//! Seams between the core and its collaborators.

pub mod embedding;
pub mod provider;
pub mod tool;

pub use embedding::{EmbeddingProvider, ModalityEmbedders, QueryVector};
pub use provider::Provider;
pub use tool::Tool;
