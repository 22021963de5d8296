use crate::embeddings::Embedder;
use crate::traits::SimilarityIndex;
use crate::{Document, ScoredCandidate, SearchError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPSERT_BATCH: usize = 64;

pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    client: Client,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            embedder,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Fails unless the collection exists and answers.
    pub async fn ready(&self) -> Result<(), SearchError> {
        let response = self.client.get(self.collection_url()).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SearchError::NotReady(format!(
                "qdrant collection '{}' does not exist",
                self.collection
            ))),
            status => Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: status.to_string(),
            }),
        }
    }

    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "qdrant collection setup failed with {}",
                response.status()
            )));
        }

        info!(collection = %self.collection, "created qdrant collection");
        Ok(())
    }

    pub async fn upsert(&self, documents: &[Document]) -> Result<usize, SearchError> {
        let mut written = 0;

        for (batch_index, batch) in documents.chunks(UPSERT_BATCH).enumerate() {
            let texts: Vec<String> = batch.iter().map(|doc| doc.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            if embeddings.len() != batch.len() {
                return Err(SearchError::Request(format!(
                    "embedding count {} doesn't match document count {}",
                    embeddings.len(),
                    batch.len()
                )));
            }

            let points = batch
                .iter()
                .zip(embeddings)
                .enumerate()
                .map(|(offset, (document, embedding))| {
                    let position = batch_index * UPSERT_BATCH + offset;
                    Ok(json!({
                        "id": point_id(document, position).to_string(),
                        "vector": embedding,
                        "payload": serde_json::to_value(document)?,
                    }))
                })
                .collect::<Result<Vec<_>, SearchError>>()?;

            let response = self
                .client
                .put(format!("{}/points?wait=true", self.collection_url()))
                .json(&json!({ "points": points }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(SearchError::BackendResponse {
                    backend: "qdrant".to_string(),
                    details: response.status().to_string(),
                });
            }

            written += batch.len();
            debug!(written, total = documents.len(), "upserted qdrant batch");
        }

        Ok(written)
    }
}

#[async_trait]
impl SimilarityIndex for QdrantIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredCandidate>, SearchError> {
        let query_vector = self.embedder.embed(query).await?;
        if query_vector.len() != self.embedder.dimensions() {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.embedder.dimensions()
            )));
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let mut candidates = parse_search_response(&parsed)?;
        candidates.truncate(k);
        Ok(candidates)
    }
}

fn parse_search_response(parsed: &Value) -> Result<Vec<ScoredCandidate>, SearchError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "search response has no result array".to_string(),
        })?;

    let mut candidates = Vec::with_capacity(hits.len());
    for hit in hits {
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        let payload = hit.pointer("/payload").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<Document>(payload) {
            Ok(document) => candidates.push(ScoredCandidate::new(document, score)),
            Err(error) => {
                let id = hit.pointer("/id").cloned().unwrap_or(Value::Null);
                warn!(%id, %error, "skipping qdrant hit with unreadable payload");
            }
        }
    }
    Ok(candidates)
}

/// Stable id so re-indexing the same passage overwrites its point.
fn point_id(document: &Document, position: usize) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update((position as u64).to_le_bytes());
    hasher.update(document.metadata.page_number.unwrap_or(-1).to_le_bytes());
    hasher.update(document.title().as_bytes());
    hasher.update(document.content.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}
