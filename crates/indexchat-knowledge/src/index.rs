//! Per-modality top-K search: sqlite-vss first, exact cosine as fallback.

use indexchat_core::error::{IndexChatError, Result};
use indexchat_core::types::{Modality, SearchResult};

use crate::codec;
use crate::similarity::cosine_similarity;
use crate::store::{ChunkStore, StoreConnection, vss_table};

/// One lookup against one modality.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub modality: Modality,
    pub dimensions: usize,
    pub query: &'a [f32],
    pub top_k: usize,
}

/// A stored chunk that could not take part in ranking.
#[derive(Debug)]
pub struct ChunkFault {
    pub chunk_id: i64,
    pub error: IndexChatError,
}

#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    /// Chunks skipped because their embedding was unusable.
    pub faults: Vec<ChunkFault>,
    /// Which strategy produced `results`.
    pub strategy: &'static str,
}

pub enum StrategyOutcome {
    /// The strategy cannot run against this connection at all.
    Unavailable(String),
    Ranked(SearchOutcome),
}

/// A way of producing ranked hits from an open store.
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn search(&self, conn: &StoreConnection, req: &SearchRequest<'_>) -> Result<StrategyOutcome>;
}

/// Sort by score descending, ties by ascending chunk id, then cut to `top_k`.
pub fn rank(results: &mut Vec<SearchResult>, top_k: usize) {
    results.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(top_k);
}

/// Nearest-neighbour lookup through the modality's `vss_*` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexedSearch;

impl SearchStrategy for IndexedSearch {
    fn name(&self) -> &'static str {
        "sqlite-vss"
    }

    fn search(&self, conn: &StoreConnection, req: &SearchRequest<'_>) -> Result<StrategyOutcome> {
        if !conn.vss_loaded() {
            return Ok(StrategyOutcome::Unavailable("vss extension not loaded".into()));
        }
        let table = vss_table(req.modality);
        if !conn.has_table(table)? {
            return Ok(StrategyOutcome::Unavailable(format!("{table} does not exist")));
        }

        let mut results = conn.vss_search(req.modality, req.query, req.top_k)?;
        results.retain(|r| r.rank_score.is_finite());
        rank(&mut results, req.top_k);
        Ok(StrategyOutcome::Ranked(SearchOutcome {
            results,
            faults: vec![],
            strategy: self.name(),
        }))
    }
}

/// Cosine similarity against every stored vector of the modality.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactSearch;

impl SearchStrategy for ExactSearch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn search(&self, conn: &StoreConnection, req: &SearchRequest<'_>) -> Result<StrategyOutcome> {
        let candidates = conn.chunks(req.modality)?;
        let total = candidates.len();

        let mut results = Vec::with_capacity(total);
        let mut faults = Vec::new();
        for stored in candidates {
            let chunk_id = stored.id;
            let scored = stored
                .decode(req.dimensions)
                .and_then(|chunk| cosine_similarity(req.query, &chunk.embedding).map(|s| (chunk, s)));
            match scored {
                Ok((chunk, score)) => results.push(SearchResult {
                    chunk_id: chunk.id,
                    file_name: chunk.file_name,
                    modality: chunk.modality,
                    payload_text: chunk.payload_text,
                    metadata: chunk.metadata,
                    rank_score: score,
                }),
                Err(e) if e.is_chunk_fault() => {
                    tracing::warn!("Skipping {} chunk {chunk_id}: {e}", req.modality);
                    faults.push(ChunkFault { chunk_id, error: e });
                }
                Err(e) => return Err(e),
            }
        }

        // Nothing usable at all: surface the first fault instead of "no hits".
        if total > 0 && results.is_empty() && !faults.is_empty() {
            return Err(faults.swap_remove(0).error);
        }

        rank(&mut results, req.top_k);
        Ok(StrategyOutcome::Ranked(SearchOutcome {
            results,
            faults,
            strategy: self.name(),
        }))
    }
}

/// Search over one modality's embedding space.
pub struct ModalityIndex {
    modality: Modality,
    dimensions: usize,
    store: ChunkStore,
    indexed: Box<dyn SearchStrategy>,
    exact: Box<dyn SearchStrategy>,
}

impl ModalityIndex {
    pub fn new(modality: Modality, dimensions: usize, store: ChunkStore) -> Self {
        Self {
            modality,
            dimensions,
            store,
            indexed: Box::new(IndexedSearch),
            exact: Box::new(ExactSearch),
        }
    }

    /// Replace the indexed strategy.
    pub fn with_indexed(mut self, strategy: Box<dyn SearchStrategy>) -> Self {
        self.indexed = strategy;
        self
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Top-K hits for `query`, best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.search_detailed(query, top_k).map(|o| o.results)
    }

    /// Like [`search`](Self::search), also reporting skipped chunks and the
    /// strategy used.
    pub fn search_detailed(&self, query: &[f32], top_k: usize) -> Result<SearchOutcome> {
        if query.len() != self.dimensions {
            return Err(IndexChatError::dimension_mismatch(self.dimensions, query.len()));
        }
        codec::ensure_finite(query)?;
        if top_k == 0 {
            return Ok(SearchOutcome::default());
        }

        let Some(conn) = self.store.open_read_only()? else {
            return Ok(SearchOutcome::default());
        };

        let req = SearchRequest {
            modality: self.modality,
            dimensions: self.dimensions,
            query,
            top_k,
        };

        match self.indexed.search(&conn, &req) {
            Ok(StrategyOutcome::Ranked(outcome)) if !outcome.results.is_empty() => {
                tracing::debug!(
                    "{} search via {}: {} hits",
                    self.modality,
                    outcome.strategy,
                    outcome.results.len()
                );
                return Ok(outcome);
            }
            Ok(StrategyOutcome::Ranked(_)) => {
                tracing::debug!("{} indexed search returned nothing, using exact", self.modality);
            }
            Ok(StrategyOutcome::Unavailable(reason)) => {
                tracing::debug!("{} indexed search unavailable ({reason}), using exact", self.modality);
            }
            Err(e) => {
                tracing::warn!("{} indexed search failed, using exact: {e}", self.modality);
            }
        }

        match self.exact.search(&conn, &req)? {
            StrategyOutcome::Ranked(outcome) => Ok(outcome),
            StrategyOutcome::Unavailable(reason) => Err(IndexChatError::Index(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::Fixture;

    struct FailingIndex;

    impl SearchStrategy for FailingIndex {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn search(&self, _: &StoreConnection, _: &SearchRequest<'_>) -> Result<StrategyOutcome> {
            Err(IndexChatError::Index("no such function: vss_search".into()))
        }
    }

    struct EmptyIndex;

    impl SearchStrategy for EmptyIndex {
        fn name(&self) -> &'static str {
            "empty"
        }
        fn search(&self, _: &StoreConnection, _: &SearchRequest<'_>) -> Result<StrategyOutcome> {
            Ok(StrategyOutcome::Ranked(SearchOutcome::default()))
        }
    }

    struct CannedIndex;

    impl SearchStrategy for CannedIndex {
        fn name(&self) -> &'static str {
            "canned"
        }
        fn search(&self, _: &StoreConnection, req: &SearchRequest<'_>) -> Result<StrategyOutcome> {
            Ok(StrategyOutcome::Ranked(SearchOutcome {
                results: vec![SearchResult {
                    chunk_id: 99,
                    file_name: "indexed.pdf".into(),
                    modality: req.modality,
                    payload_text: "from vss".into(),
                    metadata: None,
                    rank_score: 0.5,
                }],
                faults: vec![],
                strategy: "canned",
            }))
        }
    }

    fn three_text_chunks() -> Fixture {
        let fx = Fixture::new();
        fx.insert(1, "a.pdf", Modality::Text, "east", &[1.0, 0.0]);
        fx.insert(2, "b.pdf", Modality::Text, "north", &[0.0, 1.0]);
        fx.insert(3, "c.pdf", Modality::Text, "north-east", &[0.7, 0.7]);
        fx
    }

    fn ids(results: &[SearchResult]) -> Vec<i64> {
        results.iter().map(|r| r.chunk_id).collect()
    }

    #[test]
    fn test_exact_top_k() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());

        let out = index.search_detailed(&[1.0, 0.0], 2).unwrap();
        assert_eq!(out.strategy, "exact");
        assert_eq!(ids(&out.results), vec![1, 3]);
        assert!((out.results[0].rank_score - 1.0).abs() < 1e-6);
        assert!(out.results[0].rank_score >= out.results[1].rank_score);
    }

    #[test]
    fn test_top_k_larger_than_candidates() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());
        assert_eq!(index.search(&[0.0, 1.0], 50).unwrap().len(), 3);
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let fx = Fixture::new();
        fx.insert(9, "z.pdf", Modality::Text, "same", &[1.0, 1.0]);
        fx.insert(4, "y.pdf", Modality::Text, "same", &[2.0, 2.0]);
        fx.insert(6, "x.pdf", Modality::Text, "same", &[3.0, 3.0]);
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());
        assert_eq!(ids(&index.search(&[1.0, 1.0], 3).unwrap()), vec![4, 6, 9]);
    }

    #[test]
    fn test_top_k_zero_is_empty() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = ModalityIndex::new(Modality::Text, 2, ChunkStore::new(dir.path().join("none.sqlite")));
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 5),
            Err(IndexChatError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_faulty_chunks_are_skipped_and_reported() {
        let fx = three_text_chunks();
        fx.insert(4, "wrong.pdf", Modality::Text, "bad dims", &[1.0, 0.0, 0.0]);
        fx.insert_raw(5, "torn.pdf", Modality::Text, "bad bytes", &[0u8; 7], None);
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());

        let out = index.search_detailed(&[1.0, 0.0], 10).unwrap();
        assert_eq!(ids(&out.results), vec![1, 3, 2]);
        let faulted: Vec<i64> = out.faults.iter().map(|f| f.chunk_id).collect();
        assert_eq!(faulted, vec![4, 5]);
        assert!(matches!(out.faults[0].error, IndexChatError::DimensionMismatch { .. }));
        assert!(matches!(out.faults[1].error, IndexChatError::MalformedEmbedding(_)));
    }

    #[test]
    fn test_non_finite_stored_vector_is_skipped_not_ranked() {
        let fx = Fixture::new();
        fx.insert(1, "real.pdf", Modality::Text, "real hit", &[1.0, 0.0]);
        fx.insert(2, "nan.pdf", Modality::Text, "corrupt", &[f32::NAN, 0.0]);
        fx.insert(3, "inf.pdf", Modality::Text, "corrupt", &[f32::INFINITY, 1.0]);
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());

        let out = index.search_detailed(&[1.0, 0.0], 1).unwrap();
        assert_eq!(ids(&out.results), vec![1]);
        assert!(out.results[0].rank_score.is_finite());
        let faulted: Vec<i64> = out.faults.iter().map(|f| f.chunk_id).collect();
        assert_eq!(faulted, vec![2, 3]);
        assert!(out.faults.iter().all(|f| matches!(f.error, IndexChatError::MalformedEmbedding(_))));
    }

    #[test]
    fn test_non_finite_query_is_rejected() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());
        assert!(matches!(
            index.search(&[f32::NAN, 1.0], 3),
            Err(IndexChatError::MalformedEmbedding(_))
        ));
    }

    #[test]
    fn test_all_chunks_faulty_is_an_error() {
        let fx = Fixture::new();
        fx.insert(1, "a.png", Modality::Image, "Image: a.png", &[1.0; 3]);
        let index = ModalityIndex::new(Modality::Image, 512, fx.store.clone());
        assert!(matches!(
            index.search(&vec![0.1; 512], 5),
            Err(IndexChatError::DimensionMismatch { expected: 512, actual: 3 })
        ));
    }

    #[test]
    fn test_all_faulty_reports_the_first_fault_in_id_order() {
        let fx = Fixture::new();
        fx.insert(2, "nan.pdf", Modality::Text, "corrupt", &[f32::NAN, 0.0]);
        fx.insert(1, "wide.pdf", Modality::Text, "bad dims", &[1.0, 0.0, 0.0]);
        fx.insert_raw(3, "torn.pdf", Modality::Text, "bad bytes", &[0u8; 5], None);
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone());
        assert!(matches!(
            index.search_detailed(&[1.0, 0.0], 3),
            Err(IndexChatError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_other_modalities_are_not_compared() {
        let fx = three_text_chunks();
        fx.insert(10, "cat.png", Modality::Image, "Image: cat.png", &[1.0, 0.0]);
        let index = ModalityIndex::new(Modality::Image, 2, fx.store.clone());
        assert_eq!(ids(&index.search(&[1.0, 0.0], 5).unwrap()), vec![10]);
    }

    #[test]
    fn test_indexed_failure_falls_back() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone()).with_indexed(Box::new(FailingIndex));
        let out = index.search_detailed(&[0.0, 1.0], 1).unwrap();
        assert_eq!(out.strategy, "exact");
        assert_eq!(ids(&out.results), vec![2]);
    }

    #[test]
    fn test_indexed_empty_falls_back() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone()).with_indexed(Box::new(EmptyIndex));
        let out = index.search_detailed(&[0.0, 1.0], 1).unwrap();
        assert_eq!(out.strategy, "exact");
    }

    #[test]
    fn test_indexed_hits_win() {
        let fx = three_text_chunks();
        let index = ModalityIndex::new(Modality::Text, 2, fx.store.clone()).with_indexed(Box::new(CannedIndex));
        let out = index.search_detailed(&[0.0, 1.0], 1).unwrap();
        assert_eq!(out.strategy, "canned");
        assert_eq!(ids(&out.results), vec![99]);
    }

    #[test]
    fn test_default_indexed_unavailable_without_extension() {
        let fx = three_text_chunks();
        let conn = fx.store.open_read_only().unwrap().unwrap();
        let req = SearchRequest {
            modality: Modality::Text,
            dimensions: 2,
            query: &[1.0, 0.0],
            top_k: 3,
        };
        assert!(matches!(
            IndexedSearch.search(&conn, &req).unwrap(),
            StrategyOutcome::Unavailable(_)
        ));
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let mk = |id, score| SearchResult {
            chunk_id: id,
            file_name: String::new(),
            modality: Modality::Audio,
            payload_text: String::new(),
            metadata: None,
            rank_score: score,
        };
        let mut v = vec![mk(5, 0.1), mk(2, 0.9), mk(1, 0.9), mk(3, -0.4)];
        rank(&mut v, 3);
        assert_eq!(ids(&v), vec![1, 2, 5]);
    }
}
