pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rerank;
pub mod retrieval;
pub mod stores;
pub mod tables;
pub mod tokenize;
pub mod traits;

pub use chunking::{RecursiveSplitter, SplitterConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{GenerationError, IngestError, PipelineError, SearchError, TableError};
pub use ingest::{load_manual_folder, load_source_file, IngestionReport, SkippedSource};
pub use llm::{build_prompt, ChatCompletionsClient, Prompt, SYSTEM_INSTRUCTION};
pub use models::{
    referenced_pages, AskRequest, AskResponse, Document, DocumentKind, DocumentMetadata,
    PipelineOptions, PipelineOutput, ScoredCandidate,
};
pub use orchestrator::{AskPipeline, StatsSnapshot};
pub use rerank::{combine_scores, rerank, BoostNormalization, RankedDocument, RerankOptions};
pub use retrieval::{Retriever, DEFAULT_FETCH_K};
pub use stores::{InMemoryIndex, QdrantIndex};
pub use tables::{render_html_table, EnrichmentReport, FsTableStore, TableRenderer, TABLE_MARKER};
pub use tokenize::{count_matches, tokenize};
pub use traits::{Generator, SimilarityIndex, TableStore};
