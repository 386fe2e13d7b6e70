//! `search_pdfs` lets the model search every indexed source.
//!
//! The name is kept for compatibility with prompts written against the
//! PDF-only version; it covers images, audio and video frames too.

use async_trait::async_trait;
use indexchat_core::config::IndexConfig;
use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::traits::Tool;
use indexchat_core::types::{SearchResult, SourceRef, ToolDefinition, ToolResult};
use indexchat_knowledge::FanOutRetriever;
use serde::Deserialize;
use std::fmt::Write;
use std::sync::Arc;

use crate::registry::validate_args;

pub const TOOL_NAME: &str = "search_pdfs";

const DESCRIPTION: &str = "Search all indexed sources (documents, images, audio, video frames) \
and return relevant fragments with their source file names.";

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    top_k: Option<f64>,
}

pub struct SearchSourcesTool {
    retriever: Arc<FanOutRetriever>,
    default_top_k: usize,
    max_top_k: usize,
}

impl SearchSourcesTool {
    pub fn new(retriever: Arc<FanOutRetriever>, default_top_k: usize, max_top_k: usize) -> Self {
        Self {
            retriever,
            default_top_k,
            max_top_k: max_top_k.max(1),
        }
    }

    fn parse_args(&self, arguments: &str) -> Result<(String, usize)> {
        let value: serde_json::Value = serde_json::from_str(arguments)
            .map_err(|e| IndexChatError::ToolExecution(format!("Invalid arguments: {e}")))?;
        validate_args(&self.definition(), &value).map_err(IndexChatError::ToolExecution)?;
        let args: SearchArgs = serde_json::from_value(value)
            .map_err(|e| IndexChatError::ToolExecution(format!("Invalid arguments: {e}")))?;

        let top_k = IndexConfig::clamp_top_k(args.top_k, self.default_top_k, self.max_top_k);
        Ok((args.query, top_k))
    }
}

/// Render hits as numbered fragments the model can cite.
pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No relevant fragments found for: {query}");
    }

    let mut out = format!("Found {} fragment(s) for \"{query}\":\n", results.len());
    for (i, r) in results.iter().enumerate() {
        let _ = write!(
            out,
            "\n[{}] {} ({}, id {}, score {:.3})\n",
            i + 1,
            r.file_name,
            r.modality,
            r.chunk_id,
            r.rank_score
        );
        if let Some(meta) = r.metadata.as_deref().filter(|m| !m.is_empty()) {
            let _ = writeln!(out, "metadata: {meta}");
        }
        let _ = writeln!(out, "{}", r.payload_text.trim());
    }
    out
}

#[async_trait]
impl Tool for SearchSourcesTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.into(),
            description: DESCRIPTION.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to look for" },
                    "top_k": {
                        "type": "integer",
                        "description": format!("Fragments per source type (default {})", self.default_top_k)
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult> {
        let (query, top_k) = self.parse_args(arguments)?;
        tracing::debug!("search_pdfs: query={query:?} top_k={top_k}");

        let results = self.retriever.retrieve(&query, top_k).await?;

        Ok(ToolResult {
            output: format_results(&query, &results),
            sources: results.iter().map(SourceRef::from).collect(),
        })
    }
}
