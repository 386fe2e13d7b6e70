//! API route handlers.

use axum::body::Bytes;
use axum::{Json, extract::State, http::StatusCode};
use indexchat_core::error::IndexChatError;
use indexchat_core::types::Modality;
use serde_json::{Value, json};
use std::sync::Arc;

use super::server::AppState;

type ApiResponse = (StatusCode, Json<Value>);

/// Map an error onto the service contract: `{error}` for bad input,
/// `{error, details}` for everything that failed behind it.
fn error_response(e: &IndexChatError) -> ApiResponse {
    match e {
        IndexChatError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Failed to process the request",
                "details": e.to_string(),
            })),
        ),
    }
}

/// Pull the string `query` out of a JSON request body.
fn parse_query(body: &[u8]) -> Result<(String, Value), IndexChatError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| IndexChatError::InvalidRequest(format!("Body must be JSON: {e}")))?;
    let query = value
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| IndexChatError::InvalidRequest("Missing or invalid 'query' (expected a string)".into()))?;
    Ok((query.to_string(), value))
}

/// Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "indexchat-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// System information endpoint. Never exposes API keys.
pub async fn system_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cfg = &state.config;
    let store = state.retriever.store();
    let active = state.retriever.modalities();
    let chunks: serde_json::Map<String, Value> = match store.stats() {
        Ok(counts) => counts
            .into_iter()
            .map(|(m, n)| (m.as_str().to_string(), json!(n)))
            .collect(),
        Err(e) => {
            tracing::warn!("Could not read chunk counts: {e}");
            serde_json::Map::new()
        }
    };
    let modalities: Vec<Value> = Modality::ALL
        .iter()
        .map(|m| {
            let emb = cfg.embeddings.for_modality(*m);
            json!({
                "modality": m.as_str(),
                "enabled": active.contains(m),
                "provider": emb.provider,
                "model": emb.model,
                "dimensions": emb.dimensions,
            })
        })
        .collect();

    Json(json!({
        "name": "IndexChat",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "llm": {
            "provider": state.agent.provider_name(),
            "model": state.agent.model_name(),
        },
        "modalities": modalities,
        "index": {
            "db_path": store.path().display().to_string(),
            "exists": store.exists(),
            "chunks": chunks,
            "default_top_k": cfg.index.default_top_k,
        },
        "agent": {
            "max_tool_rounds": cfg.agent.max_tool_rounds,
        },
    }))
}

/// `POST /api/chat {query}` → `{answer, sources: [{id, file_name}]}`.
pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResponse {
    let (query, _) = match parse_query(&body) {
        Ok(q) => q,
        Err(e) => return error_response(&e),
    };

    match state.agent.answer(&query).await {
        Ok(answer) => (StatusCode::OK, Json(json!(answer))),
        Err(e) => {
            tracing::error!("Chat failed: {e}");
            error_response(&e)
        }
    }
}

/// `POST /api/search {query, top_k?}` → raw retrieval hits, for inspecting
/// what the model would see.
pub async fn search(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResponse {
    let (query, value) = match parse_query(&body) {
        Ok(q) => q,
        Err(e) => return error_response(&e),
    };
    let top_k = state.config.index.top_k(value["top_k"].as_f64());

    match state.retriever.retrieve(&query, top_k).await {
        Ok(results) => (
            StatusCode::OK,
            Json(json!({
                "query": query,
                "top_k": top_k,
                "count": results.len(),
                "results": results,
            })),
        ),
        Err(e) => {
            tracing::warn!("Search failed: {e}");
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use indexchat_agent::Agent;
    use indexchat_core::config::IndexChatConfig;
    use indexchat_core::error::Result;
    use indexchat_core::traits::provider::GenerateParams;
    use indexchat_core::traits::{EmbeddingProvider, Provider};
    use indexchat_core::types::{Message, ProviderResponse, ToolCall, ToolDefinition};
    use indexchat_knowledge::codec::serialize_embedding;
    use indexchat_knowledge::store::SCHEMA_SQL;
    use indexchat_knowledge::{ChunkStore, FanOutRetriever};

    /// Searches once, then answers from the tool output.
    struct SearchThenAnswer;

    #[async_trait]
    impl Provider for SearchThenAnswer {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, messages: &[Message], _: &[ToolDefinition], _: &GenerateParams) -> Result<ProviderResponse> {
            if messages.iter().any(|m| m.tool_call_id.is_some()) {
                return Ok(ProviderResponse {
                    content: Some("Q3 revenue grew 12%.".into()),
                    ..Default::default()
                });
            }
            Ok(ProviderResponse {
                tool_calls: vec![ToolCall::function("call_1", "search_pdfs", r#"{"query":"revenue"}"#)],
                ..Default::default()
            })
        }
    }

    struct DownProvider;

    #[async_trait]
    impl Provider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn chat(&self, _: &[Message], _: &[ToolDefinition], _: &GenerateParams) -> Result<ProviderResponse> {
            Err(IndexChatError::Provider("openai API error 503: overloaded".into()))
        }
    }

    struct Fixed;

    #[async_trait]
    impl EmbeddingProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn dimensions(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn test_state(dir: &tempfile::TempDir, provider: Arc<dyn Provider>) -> State<Arc<AppState>> {
        let path = dir.path().join("database.sqlite");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute(
            "INSERT INTO documents (id, file_name, content_type, chunk_text, embedding, embedding_dimensions)
             VALUES (1, 'report.pdf', 'text', 'Q3 revenue grew 12%.', ?1, 2)",
            [serialize_embedding(&[1.0, 0.0])],
        )
        .unwrap();

        let mut config = IndexChatConfig::default();
        config.index.db_path = path.display().to_string();
        let retriever = Arc::new(FanOutRetriever::new(ChunkStore::new(path), Arc::new(Fixed)));
        let tools = indexchat_tools::default_tools(retriever.clone(), &config.index);
        let agent = Arc::new(Agent::new(&config, provider, tools));

        State(Arc::new(AppState {
            config: Arc::new(config),
            start_time: std::time::Instant::now(),
            agent,
            retriever,
        }))
    }

    #[tokio::test]
    async fn test_health_check() {
        let json = health_check().await.0;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_system_info() {
        let dir = tempfile::tempdir().unwrap();
        let json = system_info(test_state(&dir, Arc::new(SearchThenAnswer))).await.0;
        assert_eq!(json["name"], "IndexChat");
        assert_eq!(json["llm"]["provider"], "stub");
        assert_eq!(json["modalities"][0]["modality"], "text");
        assert_eq!(json["modalities"][0]["enabled"], true);
        assert_eq!(json["modalities"][1]["enabled"], false);
        assert_eq!(json["index"]["exists"], true);
        assert_eq!(json["index"]["chunks"], json!({ "text": 1 }));
        assert!(json.to_string().find("api_key").is_none());
    }

    #[tokio::test]
    async fn test_chat_answers_with_sources() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(SearchThenAnswer));
        let (status, Json(json)) = chat(state, Bytes::from_static(br#"{"query":"How did revenue change?"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "Q3 revenue grew 12%.");
        assert_eq!(json["sources"], json!([{ "id": 1, "file_name": "report.pdf" }]));
    }

    #[tokio::test]
    async fn test_chat_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(SearchThenAnswer));
        for body in [&br#"{}"#[..], br#"{"query": 5}"#, b"not json"] {
            let (status, Json(json)) = chat(state.clone(), Bytes::copy_from_slice(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["error"].is_string());
            assert!(json.get("details").is_none());
        }
    }

    #[tokio::test]
    async fn test_chat_model_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(DownProvider));
        let (status, Json(json)) = chat(state, Bytes::from_static(br#"{"query":"hi"}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].is_string());
        assert!(json["details"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_search_returns_hits() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(SearchThenAnswer));
        let (status, Json(json)) = search(state, Bytes::from_static(br#"{"query":"revenue","top_k":500}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["top_k"], 20);
        assert_eq!(json["count"], 1);
        assert_eq!(json["results"][0]["file_name"], "report.pdf");
        assert_eq!(json["results"][0]["modality"], "text");
    }

    #[tokio::test]
    async fn test_search_clamps_non_integer_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(SearchThenAnswer));
        let (status, Json(json)) = search(state.clone(), Bytes::from_static(br#"{"query":"revenue","top_k":-3}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["top_k"], 1);
        let (_, Json(json)) = search(state, Bytes::from_static(br#"{"query":"revenue","top_k":2.0}"#)).await;
        assert_eq!(json["top_k"], 2);
    }

    #[tokio::test]
    async fn test_empty_search_query_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(SearchThenAnswer));
        let (status, _) = search(state, Bytes::from_static(br#"{"query":"  "}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
