use crate::embeddings::Embedder;
use crate::traits::SimilarityIndex;
use crate::{Document, ScoredCandidate, SearchError};
use async_trait::async_trait;
use std::sync::Arc;

/// Brute-force cosine index held in memory.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<(Document, Vec<f32>)>,
}

impl InMemoryIndex {
    pub async fn build(
        documents: Vec<Document>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let texts: Vec<String> = documents.iter().map(|doc| doc.content.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        if vectors.len() != documents.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match document count {}",
                vectors.len(),
                documents.len()
            )));
        }

        Ok(Self {
            embedder,
            entries: documents.into_iter().zip(vectors).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredCandidate>, SearchError> {
        let query_vector = self.embedder.embed(query).await?;

        let mut scored: Vec<(f64, &Document)> = self
            .entries
            .iter()
            .map(|(document, vector)| (cosine(&query_vector, vector), document))
            .collect();

        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, document)| ScoredCandidate::new(document.clone(), score))
            .collect())
    }
}

fn cosine(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() {
        return 0.0;
    }

    let (mut dot, mut left_norm, mut right_norm) = (0f64, 0f64, 0f64);
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (*a as f64, *b as f64);
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm.sqrt() * right_norm.sqrt())
    }
}
