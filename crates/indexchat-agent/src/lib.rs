//! # IndexChat Agent
//! The answer loop. It lets the model search the indexed sources through tools
//! and returns its answer together with every cited chunk.
//!
//! ## Features
//! - **Multi-round tool calling**: up to `agent.max_tool_rounds` rounds of
//!   model → tools → model, then one last call with no tools offered
//! - **Tool failures stay in the conversation**: bad arguments, unknown tools
//!   and retrieval errors become tool messages the model can react to
//! - **Deduplicated citations**: every chunk a tool returned, once, in the
//!   order it was first seen
//!
//! The agent keeps no per-request state; one instance serves concurrent
//! requests.

pub mod sources;

use indexchat_core::config::IndexChatConfig;
use indexchat_core::error::Result;
use indexchat_core::traits::provider::GenerateParams;
use indexchat_core::traits::{Provider, Tool};
use indexchat_core::types::{Answer, Message, ToolCall, ToolDefinition};
use indexchat_knowledge::FanOutRetriever;
use std::sync::Arc;

pub use sources::SourceSet;

/// Returned when the model never produced text, even with tools withdrawn.
pub const FALLBACK_ANSWER: &str =
    "I searched the indexed sources but could not put together a final answer. Please try rephrasing the question.";

/// Where one request currently is.
enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
}

/// Answers questions over the indexed sources.
pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: Vec<Box<dyn Tool>>,
    tool_defs: Vec<ToolDefinition>,
    params: GenerateParams,
    system_prompt: String,
    max_tool_rounds: usize,
    max_tool_output_chars: usize,
}

impl Agent {
    pub fn new(config: &IndexChatConfig, provider: Arc<dyn Provider>, tools: Vec<Box<dyn Tool>>) -> Self {
        let tool_defs = indexchat_tools::registry::list_definitions(&tools);
        Self {
            provider,
            tools,
            tool_defs,
            params: GenerateParams {
                model: config.llm.model.clone(),
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
            },
            system_prompt: config.agent.system_prompt.clone(),
            max_tool_rounds: config.agent.max_tool_rounds,
            max_tool_output_chars: config.agent.max_tool_output_chars,
        }
    }

    /// Agent with the configured chat provider and the default tool set.
    pub fn from_config(config: &IndexChatConfig, retriever: Arc<FanOutRetriever>) -> Result<Self> {
        let provider: Arc<dyn Provider> = Arc::from(indexchat_providers::create_provider(config)?);
        let tools = indexchat_tools::default_tools(retriever, &config.index);
        Ok(Self::new(config, provider, tools))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model_name(&self) -> &str {
        &self.params.model
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Answer one question.
    ///
    /// Generative-model errors propagate; tool errors do not.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let mut conversation = vec![Message::system(&self.system_prompt), Message::user(query)];
        let mut sources = SourceSet::new();
        let mut rounds = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let offer_tools = rounds < self.max_tool_rounds;
                    let tools: &[ToolDefinition] = if offer_tools { &self.tool_defs } else { &[] };
                    let response = self.provider.chat(&conversation, tools, &self.params).await?;
                    if let Some(usage) = response.usage {
                        tracing::debug!("Model usage: {} tokens", usage.total_tokens);
                    }

                    if offer_tools && !response.tool_calls.is_empty() {
                        conversation.push(Message::assistant_tool_calls(
                            response.content.unwrap_or_default(),
                            response.tool_calls.clone(),
                        ));
                        LoopState::ExecutingTools(response.tool_calls)
                    } else {
                        if !response.tool_calls.is_empty() {
                            tracing::warn!("Ignoring tool calls after the last tool round");
                        }
                        let text = response
                            .content
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty());
                        LoopState::Done(text.unwrap_or_else(|| FALLBACK_ANSWER.to_string()))
                    }
                }

                LoopState::ExecutingTools(calls) => {
                    rounds += 1;
                    tracing::info!(
                        "Tool round {}/{}: {} tool call(s)",
                        rounds,
                        self.max_tool_rounds,
                        calls.len()
                    );
                    for tc in &calls {
                        let output = self.run_tool(tc, &mut sources).await;
                        conversation.push(Message::tool(output, &tc.id));
                    }
                    LoopState::AwaitingModel
                }

                LoopState::Done(answer) => {
                    tracing::info!("Answered after {rounds} tool round(s) with {} source(s)", sources.len());
                    return Ok(Answer {
                        answer,
                        sources: sources.into_vec(),
                    });
                }
            };
        }
    }

    /// Execute one call and render its outcome as tool-message content.
    async fn run_tool(&self, tc: &ToolCall, sources: &mut SourceSet) -> String {
        tracing::info!(
            "  → {} ({})",
            tc.function.name,
            truncate_chars(&tc.function.arguments, 100)
        );

        let Some(tool) = indexchat_tools::registry::find_tool(&self.tools, &tc.function.name) else {
            tracing::warn!("Model called unknown tool '{}'", tc.function.name);
            return format!("Tool not found: {}", tc.function.name);
        };

        match tool.execute(&tc.function.arguments).await {
            Ok(result) => {
                sources.extend(result.sources);
                let total = result.output.chars().count();
                if total > self.max_tool_output_chars {
                    format!(
                        "{}...\n[truncated, {total} total chars]",
                        truncate_chars(&result.output, self.max_tool_output_chars)
                    )
                } else {
                    result.output
                }
            }
            Err(e) => {
                tracing::warn!("Tool {} failed: {e}", tc.function.name);
                format!("Tool error: {e}")
            }
        }
    }
}

/// The first `max` chars of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
