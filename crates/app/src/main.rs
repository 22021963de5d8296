mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use manual_qa_core::{
    load_manual_folder, AskPipeline, AskResponse, BoostNormalization, CharacterNgramEmbedder,
    ChatCompletionsClient, Embedder, FsTableStore, InMemoryIndex, OpenAiEmbedder,
    PipelineOptions, QdrantIndex, RerankOptions, SimilarityIndex, SplitterConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const READY_ATTEMPTS: u32 = 30;
const READY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "manual-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    Ngram,
    Openai,
}

#[derive(Args, Clone)]
struct Settings {
    /// Where passages are searched.
    #[arg(long, env = "MANUAL_QA_BACKEND", value_enum, default_value_t = Backend::Qdrant)]
    backend: Backend,

    /// Folder holding texts.json, tables.json and diagrams.json.
    #[arg(long, env = "MANUAL_QA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Root for relative table csv paths. Defaults to the data dir, then the working dir.
    #[arg(long, env = "MANUAL_QA_TABLES_DIR")]
    tables_dir: Option<PathBuf>,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "manual_passages")]
    qdrant_collection: String,

    #[arg(long, env = "MANUAL_QA_EMBEDDER", value_enum, default_value_t = EmbedderKind::Ngram)]
    embedder: EmbedderKind,

    /// OpenAI-compatible embeddings base URL
    #[arg(long, env = "EMBEDDING_BASE_URL", default_value = "https://api.openai.com/v1")]
    embedding_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "128")]
    embedding_dimensions: usize,

    /// OpenAI-compatible chat completion base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.deepseek.com")]
    llm_url: String,

    #[arg(long, env = "DEEP_SEEK_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    #[arg(long, env = "LLM_MODEL", default_value = "deepseek-chat")]
    llm_model: String,

    #[arg(long, env = "LLM_TEMPERATURE", default_value = "0.0")]
    llm_temperature: f32,

    /// Candidates fetched from the index before reranking.
    #[arg(long, env = "MANUAL_QA_FETCH_K", default_value = "20")]
    fetch_k: usize,

    /// Weight of the title keyword boost.
    #[arg(long, env = "MANUAL_QA_TITLE_WEIGHT", default_value = "10.0")]
    title_weight: f64,

    /// Passages kept after reranking.
    #[arg(long, env = "MANUAL_QA_TOP_N", default_value = "5")]
    top_n: usize,

    /// Title boost scaling: query-chars, query-tokens or raw.
    #[arg(long, env = "MANUAL_QA_NORMALIZATION", default_value = "query-chars")]
    normalization: BoostNormalization,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the question answering API.
    Serve {
        #[arg(long, env = "MANUAL_QA_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
    },
    /// Answer one question and print the referenced pages.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Load the manual sources and upsert them into Qdrant.
    Index,
}

impl Settings {
    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            fetch_k: self.fetch_k,
            rerank: RerankOptions {
                weight: self.title_weight,
                top_n: self.top_n,
                normalization: self.normalization,
            },
        }
    }

    fn tables_root(&self) -> PathBuf {
        self.tables_dir
            .clone()
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn require_data_dir(&self) -> anyhow::Result<&Path> {
        self.data_dir
            .as_deref()
            .context("--data-dir is required for this command")
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder {
                dimensions: self.embedding_dimensions,
            }),
            EmbedderKind::Openai => Arc::new(OpenAiEmbedder::new(
                &self.embedding_url,
                self.embedding_model.clone(),
                self.embedding_api_key.clone(),
                self.embedding_dimensions,
            )?),
        };
        Ok(embedder)
    }

    fn qdrant(&self, embedder: Arc<dyn Embedder>) -> QdrantIndex {
        QdrantIndex::new(&self.qdrant_url, &self.qdrant_collection, embedder)
    }
}

async fn build_index(settings: &Settings) -> anyhow::Result<Arc<dyn SimilarityIndex>> {
    let embedder = settings.embedder()?;

    match settings.backend {
        Backend::Qdrant => {
            let index = settings.qdrant(embedder);
            wait_until_ready(&index).await?;
            let index: Arc<dyn SimilarityIndex> = Arc::new(index);
            Ok(index)
        }
        Backend::Memory => {
            let folder = settings.require_data_dir()?;
            let report = load_manual_folder(folder, SplitterConfig::default())?;
            log_skipped(&report.skipped_files);
            let index = InMemoryIndex::build(report.documents, embedder).await?;
            info!(documents = index.len(), "in-memory index built");
            let index: Arc<dyn SimilarityIndex> = Arc::new(index);
            Ok(index)
        }
    }
}

async fn wait_until_ready(index: &QdrantIndex) -> anyhow::Result<()> {
    let mut attempt = 1;
    loop {
        match index.ready().await {
            Ok(()) => return Ok(()),
            Err(error) if attempt < READY_ATTEMPTS => {
                warn!(attempt, %error, "qdrant not ready, retrying");
                attempt += 1;
                tokio::time::sleep(READY_INTERVAL).await;
            }
            Err(error) => return Err(error).context("qdrant never became ready"),
        }
    }
}

async fn build_pipeline(settings: &Settings) -> anyhow::Result<AskPipeline> {
    let index = build_index(settings).await?;
    let generator = ChatCompletionsClient::new(
        &settings.llm_url,
        settings.llm_api_key.clone(),
        settings.llm_model.clone(),
    )?
    .with_temperature(settings.llm_temperature);
    let tables = FsTableStore::new(settings.tables_root());

    Ok(AskPipeline::new(
        index,
        Arc::new(tables),
        Arc::new(generator),
        settings.pipeline_options(),
    ))
}

fn log_skipped(skipped: &[manual_qa_core::SkippedSource]) {
    for source in skipped {
        warn!(path = %source.path.display(), reason = %source.reason, "skipped source file");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let Cli { command, settings } = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        backend = ?settings.backend,
        "manual-qa boot"
    );

    match command {
        Command::Serve { bind } => {
            let state = server::AppState::default();
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!(%bind, "listening");

            let serving = axum::serve(listener, server::router(state.clone()))
                .with_graceful_shutdown(server::shutdown_signal());
            let serving = async { serving.await.map_err(anyhow::Error::from) };
            tokio::pin!(serving);

            tokio::select! {
                result = &mut serving => result?,
                pipeline = build_pipeline(&settings) => {
                    state.publish(pipeline.context("pipeline initialization failed")?);
                    info!("pipeline ready");
                    serving.await?;
                }
            }
        }
        Command::Ask { question } => {
            let pipeline = build_pipeline(&settings).await?;
            let response = AskResponse::from(pipeline.ask(&question).await?);

            println!("{}", response.answer);
            println!("referenced_pages: {:?}", response.referenced_pages);
        }
        Command::Index => {
            if settings.backend != Backend::Qdrant {
                anyhow::bail!("the index command writes to qdrant; use --backend qdrant");
            }

            let folder = settings.require_data_dir()?;
            let report = load_manual_folder(folder, SplitterConfig::default())?;
            log_skipped(&report.skipped_files);

            info!(
                folder = %folder.display(),
                documents = report.documents.len(),
                "indexing passages"
            );

            let index = settings.qdrant(settings.embedder()?);
            index.ensure_collection().await?;
            let written = index.upsert(&report.documents).await?;

            println!("{} passages indexed at {}", written, Utc::now().to_rfc3339());
        }
    }

    Ok(())
}
