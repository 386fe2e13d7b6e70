//! Unified OpenAI-compatible chat provider.
//!
//! Handles chat completions with tool calling for every backend in the
//! registry. Backends differ only by endpoint URL, auth style and API key.

use async_trait::async_trait;
use indexchat_core::config::IndexChatConfig;
use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::traits::provider::{GenerateParams, Provider};
use indexchat_core::types::{FunctionCall, Message, ProviderResponse, ToolCall, ToolDefinition, Usage};
use serde_json::{Value, json};
use std::time::Duration;

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// Chat client for one OpenAI-dialect endpoint.
pub struct OpenAiCompatibleProvider {
    name: String,
    api_key: String,
    /// No trailing slash; `chat_path` is appended verbatim.
    base_url: String,
    chat_path: String,
    auth_style: AuthStyle,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Client for a registry entry.
    ///
    /// The key comes from `[llm] api_key`, then the entry's env vars. The URL
    /// comes from `[llm] endpoint`, then the entry's env override, then its
    /// built-in default.
    pub fn from_registry(registry: &ProviderConfig, config: &IndexChatConfig) -> Result<Self> {
        let api_key = if !config.llm.api_key.is_empty() {
            config.llm.api_key.clone()
        } else {
            registry
                .env_keys
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };

        let base_url = if !config.llm.endpoint.is_empty() {
            config.llm.endpoint.trim_end_matches('/').to_string()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| std::env::var(env_key).ok())
                .map(|val| with_v1_suffix(&val))
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        Ok(Self {
            name: registry.name.to_string(),
            api_key,
            base_url,
            chat_path: registry.chat_path.to_string(),
            auth_style: registry.auth_style,
            client: http_client(config.providers.timeout())?,
        })
    }

    /// Client for `custom:<url>`, keyed by `[llm] api_key` or `CUSTOM_API_KEY`.
    pub fn custom(endpoint: &str, config: &IndexChatConfig) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let api_key = if !config.llm.api_key.is_empty() {
            config.llm.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self {
            name: "custom".to_string(),
            api_key,
            base_url,
            chat_path: "/chat/completions".to_string(),
            auth_style,
            client: http_client(config.providers.timeout())?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => req.bearer_auth(&self.api_key),
            _ => req,
        }
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let req = self.client.post(url).json(body);
        self.apply_auth(req).send().await.map_err(|e| {
            if e.is_timeout() {
                IndexChatError::ProviderUnavailable(format!("{} timed out ({url})", self.name))
            } else {
                IndexChatError::Http(format!("{} connection failed ({url}): {e}", self.name))
            }
        })
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| IndexChatError::Http(format!("Failed to build HTTP client: {e}")))
}

/// OLLAMA_HOST style overrides usually omit the `/v1` suffix.
fn with_v1_suffix(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.ends_with("/v1") {
        url.to_string()
    } else {
        format!("{url}/v1")
    }
}

/// Chat-completions request body in OpenAI wire format.
pub fn build_request_body(messages: &[Message], tools: &[ToolDefinition], params: &GenerateParams) -> Result<Value> {
    let mut body = json!({
        "model": params.model,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "messages": serde_json::to_value(messages)?,
    });

    if !tools.is_empty() {
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tool_defs);
    }
    Ok(body)
}

/// Parse a chat-completions response into a [`ProviderResponse`].
pub fn parse_chat_response(json: &Value) -> Result<ProviderResponse> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| IndexChatError::Provider("No choices in response".into()))?;

    let content = choice["message"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from);

    let tool_calls = choice["message"]["tool_calls"]
        .as_array()
        .map(|tc| {
            tc.iter()
                .filter_map(|t| {
                    Some(ToolCall {
                        id: t["id"].as_str().unwrap_or("").to_string(),
                        r#type: "function".to_string(),
                        function: FunctionCall {
                            name: t["function"]["name"].as_str()?.to_string(),
                            arguments: t["function"]["arguments"].as_str().unwrap_or("{}").to_string(),
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = json["usage"].as_object().map(|u| {
        let field = |k: &str| u.get(k).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        Usage {
            prompt_tokens: field("prompt_tokens"),
            completion_tokens: field("completion_tokens"),
            total_tokens: field("total_tokens"),
        }
    });

    Ok(ProviderResponse {
        content,
        tool_calls,
        finish_reason: choice["finish_reason"].as_str().map(String::from),
        usage,
    })
}

/// Some local models reject the `tools` field outright.
fn rejects_tools(status: reqwest::StatusCode, text: &str) -> bool {
    status.as_u16() == 400
        && (text.contains("does not support tools")
            || text.contains("tool_use is not supported")
            || text.contains("does not support function"))
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &GenerateParams,
    ) -> Result<ProviderResponse> {
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(IndexChatError::ProviderUnavailable(format!(
                "{} API key is not set",
                self.name
            )));
        }

        let mut body = build_request_body(messages, tools, params)?;
        let url = format!("{}{}", self.base_url, self.chat_path);
        let mut resp = self.post(&url, &body).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();

            if !tools.is_empty() && rejects_tools(status, &text) {
                tracing::warn!(
                    "Model '{}' doesn't support tools, retrying without tools",
                    params.model
                );
                if let Some(m) = body.as_object_mut() {
                    m.remove("tools");
                }
                resp = self.post(&url, &body).await?;
                if !resp.status().is_success() {
                    let rs = resp.status();
                    let rt = resp.text().await.unwrap_or_default();
                    return Err(IndexChatError::Provider(format!(
                        "{} API error {rs} (retry without tools): {rt}",
                        self.name
                    )));
                }
            } else {
                return Err(IndexChatError::Provider(format!(
                    "{} API error {status}: {text}",
                    self.name
                )));
            }
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| IndexChatError::Http(e.to_string()))?;
        let parsed = parse_chat_response(&json)?;
        tracing::debug!(
            "{} replied: {} tool call(s), finish_reason={:?}",
            self.name,
            parsed.tool_calls.len(),
            parsed.finish_reason
        );
        Ok(parsed)
    }

    async fn health_check(&self) -> Result<bool> {
        if self.auth_style != AuthStyle::None {
            // Cloud providers: a key is the best signal without spending tokens.
            return Ok(!self.api_key.is_empty());
        }

        let url = format!("{}/models", self.base_url);
        Ok(self.client.get(&url).send().await.is_ok())
    }
}
