//! # IndexChat Tools
//!
//! Tools the generative model may call during an answer.

pub mod registry;
pub mod search_sources;

use indexchat_core::config::IndexConfig;
use indexchat_core::traits::Tool;
use indexchat_knowledge::FanOutRetriever;
use std::sync::Arc;

pub use search_sources::SearchSourcesTool;

/// The tool set offered to the model.
pub fn default_tools(retriever: Arc<FanOutRetriever>, index: &IndexConfig) -> Vec<Box<dyn Tool>> {
    vec![Box::new(SearchSourcesTool::new(
        retriever,
        index.default_top_k,
        index.max_top_k,
    ))]
}
