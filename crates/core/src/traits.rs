use crate::llm::Prompt;
use crate::{GenerationError, ScoredCandidate, SearchError, TableError};
use async_trait::async_trait;

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// At most `k` candidates, most relevant first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredCandidate>, SearchError>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Raw delimited text of the table at `csv_path`, or `None` when it does not exist.
    async fn load(&self, csv_path: &str) -> Result<Option<String>, TableError>;
}
