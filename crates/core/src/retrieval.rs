use crate::traits::SimilarityIndex;
use crate::{ScoredCandidate, SearchError};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_FETCH_K: usize = 20;

#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn SimilarityIndex>,
}

impl Retriever {
    pub fn new(index: Arc<dyn SimilarityIndex>) -> Self {
        Self { index }
    }

    /// Over-fetches up to `k` candidates in the index's own order. Errors are not retried.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredCandidate>, SearchError> {
        let mut candidates = self.index.search(query, k).await?;
        candidates.truncate(k);
        debug!(requested = k, returned = candidates.len(), "retrieved candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, DocumentMetadata};
    use async_trait::async_trait;

    struct OverfullIndex;

    #[async_trait]
    impl SimilarityIndex for OverfullIndex {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<ScoredCandidate>, SearchError> {
            Ok((0..10)
                .map(|index| {
                    ScoredCandidate::new(
                        Document::new(format!("doc {index}"), DocumentMetadata::default()),
                        1.0 - index as f64 / 10.0,
                    )
                })
                .collect())
        }
    }

    struct DownIndex;

    #[async_trait]
    impl SimilarityIndex for DownIndex {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<ScoredCandidate>, SearchError> {
            Err(SearchError::NotReady("index offline".to_string()))
        }
    }

    #[tokio::test]
    async fn results_never_exceed_k() {
        let retriever = Retriever::new(Arc::new(OverfullIndex));
        let candidates = retriever.retrieve("q", 3).await.expect("retrieve");
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].document.content, "doc 0");
    }

    #[tokio::test]
    async fn index_failures_propagate() {
        let retriever = Retriever::new(Arc::new(DownIndex));
        assert!(matches!(
            retriever.retrieve("q", DEFAULT_FETCH_K).await,
            Err(SearchError::NotReady(_))
        ));
    }
}
