use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid source json in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid splitter config: {0}")]
    InvalidSplitterConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("store not available yet: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("generation backend returned {status}: {details}")]
    BackendResponse { status: u16, details: String },

    #[error("generation backend returned no completion")]
    EmptyCompletion,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("io error reading table: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("table has no columns: {0}")]
    Empty(String),

    #[error("table row {row} has {found} fields, header has {expected}")]
    Ragged {
        row: usize,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] SearchError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Retrieval(_) => "retrieval_failure",
            PipelineError::Generation(_) => "generation_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_kinds_are_stable() {
        let retrieval = PipelineError::from(SearchError::Request("boom".to_string()));
        let generation = PipelineError::from(GenerationError::EmptyCompletion);

        assert_eq!(retrieval.kind(), "retrieval_failure");
        assert_eq!(generation.kind(), "generation_failure");
        assert!(retrieval.to_string().contains("boom"));
    }
}
