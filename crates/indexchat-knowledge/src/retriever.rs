//! Fan-out retrieval across text, image and audio.
//!
//! The text lane is mandatory. Image and audio lanes are best-effort: a missing
//! credential, a provider error, a timeout or an index error drops the lane
//! and the request carries on with what is left.

use futures::future::join_all;
use indexchat_core::config::IndexChatConfig;
use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::traits::{EmbeddingProvider, ModalityEmbedders, QueryVector};
use indexchat_core::types::{Modality, SearchResult};
use std::sync::Arc;
use std::time::Duration;

use crate::index::ModalityIndex;
use crate::store::ChunkStore;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Embedder plus index for one modality.
struct Lane {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<ModalityIndex>,
}

pub struct FanOutRetriever {
    store: ChunkStore,
    text: Lane,
    image: Option<Lane>,
    audio: Option<Lane>,
    timeout: Duration,
}

impl FanOutRetriever {
    /// Text-only retriever. Index dimensions follow the embedder.
    pub fn new(store: ChunkStore, text: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            text: lane(Modality::Text, &store, text),
            store,
            image: None,
            audio: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_image(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.image = Some(lane(Modality::Image, &self.store, embedder));
        self
    }

    pub fn with_audio(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.audio = Some(lane(Modality::Audio, &self.store, embedder));
        self
    }

    /// Per-call bound on each query embedding.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the retriever for a deployment. Index dimensions come from
    /// `[embeddings.*]`, so a misconfigured embedder surfaces as a dimension
    /// mismatch instead of silently searching the wrong space.
    pub fn from_config(config: &IndexChatConfig, embedders: ModalityEmbedders) -> Self {
        let store = ChunkStore::from_config(&config.index);
        let make = |modality: Modality| {
            embedders.get(modality).map(|embedder| Lane {
                index: Arc::new(ModalityIndex::new(
                    modality,
                    config.embeddings.for_modality(modality).dimensions,
                    store.clone(),
                )),
                embedder: Arc::clone(embedder),
            })
        };
        let image = make(Modality::Image);
        let audio = make(Modality::Audio);
        let text = Lane {
            index: Arc::new(ModalityIndex::new(
                Modality::Text,
                config.embeddings.text.dimensions,
                store.clone(),
            )),
            embedder: embedders.text,
        };

        Self {
            store,
            text,
            image,
            audio,
            timeout: config.providers.timeout(),
        }
    }

    /// The store every lane searches.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Modalities this retriever can search, in merge order.
    pub fn modalities(&self) -> Vec<Modality> {
        Modality::ALL
            .into_iter()
            .filter(|m| self.lane(*m).is_some())
            .collect()
    }

    fn lane(&self, modality: Modality) -> Option<&Lane> {
        match modality {
            Modality::Text => Some(&self.text),
            Modality::Image => self.image.as_ref(),
            Modality::Audio => self.audio.as_ref(),
        }
    }

    /// Top hits for `query` from every available modality.
    ///
    /// Each modality keeps its own ranking; the result is text hits, then
    /// image hits, then audio hits, capped at `top_k` per active modality.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(IndexChatError::RetrievalFailed("empty query".into()));
        }

        let (text, image, audio) = tokio::join!(
            self.query_vector(Some(&self.text), query),
            self.query_vector(self.image.as_ref(), query),
            self.query_vector(self.audio.as_ref(), query),
        );

        let mut jobs = Vec::with_capacity(3);
        for (modality, vector) in [
            (Modality::Text, text),
            (Modality::Image, image),
            (Modality::Audio, audio),
        ] {
            match vector {
                QueryVector::Ready(v) => jobs.push((modality, v)),
                QueryVector::Unavailable { reason } if modality == Modality::Text => {
                    return Err(IndexChatError::RetrievalFailed(format!(
                        "text query embedding unavailable: {reason}"
                    )));
                }
                QueryVector::Unavailable { reason } => {
                    tracing::debug!("Skipping {modality} retrieval: {reason}");
                }
            }
        }

        let searches = jobs.into_iter().filter_map(|(modality, vector)| {
            let index = Arc::clone(&self.lane(modality)?.index);
            Some(async move {
                let res = tokio::task::spawn_blocking(move || index.search(&vector, top_k))
                    .await
                    .map_err(|e| IndexChatError::Index(format!("search task failed: {e}")))
                    .and_then(|r| r);
                (modality, res)
            })
        });

        let mut per_modality = Vec::with_capacity(3);
        for (modality, res) in join_all(searches).await {
            match res {
                Ok(hits) => {
                    tracing::debug!("{modality}: {} hits", hits.len());
                    per_modality.push((modality, hits));
                }
                Err(e) if modality == Modality::Text => {
                    return Err(IndexChatError::RetrievalFailed(format!("text search: {e}")));
                }
                Err(e) => tracing::warn!("{modality} search failed, skipping: {e}"),
            }
        }

        Ok(merge(per_modality, top_k))
    }

    async fn query_vector(&self, lane: Option<&Lane>, query: &str) -> QueryVector {
        let Some(lane) = lane else {
            return QueryVector::unavailable("no embedder configured");
        };
        embed_query(lane.embedder.as_ref(), query, self.timeout).await
    }
}

fn lane(modality: Modality, store: &ChunkStore, embedder: Arc<dyn EmbeddingProvider>) -> Lane {
    Lane {
        index: Arc::new(ModalityIndex::new(modality, embedder.dimensions(), store.clone())),
        embedder,
    }
}

/// Run one embedder under a timeout and fold every outcome into a
/// [`QueryVector`].
pub async fn embed_query(embedder: &dyn EmbeddingProvider, query: &str, timeout: Duration) -> QueryVector {
    if !embedder.is_configured() {
        return QueryVector::unavailable(format!("{} has no credential", embedder.name()));
    }
    match tokio::time::timeout(timeout, embedder.embed(query)).await {
        Ok(Ok(vector)) => QueryVector::Ready(vector),
        Ok(Err(e)) => {
            tracing::warn!("{} embedding failed: {e}", embedder.name());
            QueryVector::unavailable(e.to_string())
        }
        Err(_) => {
            tracing::warn!("{} embedding timed out after {timeout:?}", embedder.name());
            QueryVector::unavailable(format!("timed out after {timeout:?}"))
        }
    }
}

/// Concatenate per-modality hit lists in text, image, audio order and cap the
/// total at `top_k` per contributing modality.
pub fn merge(mut per_modality: Vec<(Modality, Vec<SearchResult>)>, top_k: usize) -> Vec<SearchResult> {
    per_modality.sort_by_key(|(m, _)| Modality::ALL.iter().position(|x| x == m));
    let cap = top_k.saturating_mul(per_modality.len());
    let mut merged: Vec<SearchResult> = per_modality.into_iter().flat_map(|(_, hits)| hits).collect();
    merged.truncate(cap);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::Fixture;
    use async_trait::async_trait;

    struct FixedEmbedder {
        name: &'static str,
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn name(&self) -> &str {
            self.name
        }
        fn dimensions(&self) -> usize {
            self.vector.len()
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }
    }

    struct UnconfiguredEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnconfiguredEmbedder {
        fn name(&self) -> &str {
            "huggingface"
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn is_configured(&self) -> bool {
            false
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            panic!("unconfigured embedder must not be called")
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn name(&self) -> &str {
            "openai"
        }
        fn dimensions(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(IndexChatError::ProviderUnavailable("401 Unauthorized".into()))
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn name(&self) -> &str {
            "slow"
        }
        fn dimensions(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn fixed(vector: &[f32]) -> Arc<dyn EmbeddingProvider> {
        Arc::new(FixedEmbedder {
            name: "fixed",
            vector: vector.to_vec(),
        })
    }

    fn mixed_store() -> Fixture {
        let fx = Fixture::new();
        fx.insert(1, "report.pdf", Modality::Text, "Q3 revenue grew 12%.", &[1.0, 0.0]);
        fx.insert(2, "notes.pdf", Modality::Text, "Hiring plan", &[0.0, 1.0]);
        fx.insert(3, "chart.png", Modality::Image, "Image: chart.png", &[1.0, 0.0, 0.0]);
        fx.insert(4, "call.mp3", Modality::Audio, "Audio File: call.mp3", &[0.0, 0.0, 1.0]);
        fx
    }

    fn hit(id: i64, modality: Modality) -> SearchResult {
        SearchResult {
            chunk_id: id,
            file_name: format!("{id}.bin"),
            modality,
            payload_text: String::new(),
            metadata: None,
            rank_score: 0.5,
        }
    }

    #[tokio::test]
    async fn test_all_modalities_in_fixed_order() {
        let fx = mixed_store();
        let retriever = FanOutRetriever::new(fx.store.clone(), fixed(&[1.0, 0.0]))
            .with_image(fixed(&[1.0, 0.0, 0.0]))
            .with_audio(fixed(&[0.0, 0.0, 1.0]));

        let hits = retriever.retrieve("revenue chart", 5).await.unwrap();
        let order: Vec<(Modality, i64)> = hits.iter().map(|h| (h.modality, h.chunk_id)).collect();
        assert_eq!(
            order,
            vec![
                (Modality::Text, 1),
                (Modality::Text, 2),
                (Modality::Image, 3),
                (Modality::Audio, 4),
            ]
        );
        assert_eq!(retriever.modalities(), Modality::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_unconfigured_image_degrades_gracefully() {
        let fx = mixed_store();
        let retriever = FanOutRetriever::new(fx.store.clone(), fixed(&[1.0, 0.0]))
            .with_image(Arc::new(UnconfiguredEmbedder));

        let hits = retriever.retrieve("revenue", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "report.pdf");
        assert!(hits.iter().all(|h| h.modality == Modality::Text));
    }

    #[tokio::test]
    async fn test_slow_audio_is_dropped_on_timeout() {
        let fx = mixed_store();
        let retriever = FanOutRetriever::new(fx.store.clone(), fixed(&[1.0, 0.0]))
            .with_audio(Arc::new(SlowEmbedder))
            .with_timeout(Duration::from_millis(50));

        let hits = retriever.retrieve("revenue", 5).await.unwrap();
        assert!(hits.iter().all(|h| h.modality == Modality::Text));
    }

    #[tokio::test]
    async fn test_image_dimension_mismatch_degrades() {
        let fx = mixed_store();
        // Query space is 4-d, stored image vectors are 3-d.
        let retriever = FanOutRetriever::new(fx.store.clone(), fixed(&[1.0, 0.0]))
            .with_image(fixed(&[1.0, 0.0, 0.0, 0.0]));

        let hits = retriever.retrieve("chart", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.modality == Modality::Text));
    }

    #[tokio::test]
    async fn test_text_failure_is_fatal() {
        let fx = mixed_store();
        let retriever = FanOutRetriever::new(fx.store.clone(), Arc::new(FailingEmbedder))
            .with_image(fixed(&[1.0, 0.0, 0.0]));

        let err = retriever.retrieve("revenue", 5).await.unwrap_err();
        assert!(matches!(err, IndexChatError::RetrievalFailed(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let fx = mixed_store();
        let retriever = FanOutRetriever::new(fx.store.clone(), fixed(&[1.0, 0.0]));
        assert!(matches!(
            retriever.retrieve("   ", 5).await,
            Err(IndexChatError::RetrievalFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_store_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path().join("database.sqlite"));
        let retriever = FanOutRetriever::new(store, fixed(&[1.0, 0.0]));
        assert!(retriever.retrieve("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_query_reports_missing_credential() {
        let v = embed_query(&UnconfiguredEmbedder, "q", Duration::from_secs(1)).await;
        assert!(matches!(v, QueryVector::Unavailable { reason } if reason.contains("no credential")));
    }

    #[test]
    fn test_merge_keeps_modality_order_and_caps() {
        let merged = merge(
            vec![
                (Modality::Audio, vec![hit(30, Modality::Audio)]),
                (Modality::Text, vec![hit(1, Modality::Text), hit(2, Modality::Text), hit(3, Modality::Text)]),
            ],
            2,
        );
        let ids: Vec<i64> = merged.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 30]);

        let capped = merge(
            vec![(Modality::Text, vec![hit(1, Modality::Text), hit(2, Modality::Text), hit(3, Modality::Text)])],
            2,
        );
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_from_config_uses_configured_dimensions() {
        let config = IndexChatConfig::default();
        let retriever = FanOutRetriever::from_config(&config, ModalityEmbedders::text_only(fixed(&[1.0, 0.0])));
        assert_eq!(retriever.text.index.dimensions(), 3072);
        assert_eq!(retriever.modalities(), vec![Modality::Text]);
        assert_eq!(retriever.timeout, Duration::from_secs(30));
        assert_eq!(retriever.store().path(), config.index.db_path().as_path());
    }

    #[tokio::test]
    async fn test_lanes_share_the_retriever_store() {
        let fx = mixed_store();
        let retriever = FanOutRetriever::new(fx.store.clone(), fixed(&[1.0, 0.0]))
            .with_image(fixed(&[1.0, 0.0, 0.0]))
            .with_audio(fixed(&[0.0, 0.0, 1.0]));

        assert_eq!(retriever.store().path(), fx.store.path());
        let hits = retriever.retrieve("chart", 1).await.unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }
}
