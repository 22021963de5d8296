use crate::llm::build_prompt;
use crate::rerank::rerank;
use crate::retrieval::Retriever;
use crate::tables::{EnrichmentReport, TableRenderer};
use crate::traits::{Generator, SimilarityIndex, TableStore};
use crate::{PipelineError, PipelineOptions, PipelineOutput};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Retrieve, rerank, enrich, then generate. Holds only read-only collaborators,
/// so one instance serves concurrent requests.
pub struct AskPipeline {
    retriever: Retriever,
    tables: TableRenderer,
    generator: Arc<dyn Generator>,
    options: PipelineOptions,
    stats: PipelineStats,
}

impl AskPipeline {
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        tables: Arc<dyn TableStore>,
        generator: Arc<dyn Generator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            retriever: Retriever::new(index),
            tables: TableRenderer::new(tables),
            generator,
            options,
            stats: PipelineStats::default(),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn ask(&self, question: &str) -> Result<PipelineOutput, PipelineError> {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let result = self.run(question).await;
        if result.is_err() {
            self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn run(&self, question: &str) -> Result<PipelineOutput, PipelineError> {
        let candidates = self
            .retriever
            .retrieve(question, self.options.fetch_k)
            .await?;
        let retrieved = candidates.len();

        let ranked = rerank(candidates, question, &self.options.rerank);
        let (sources, report) = self.tables.enrich(ranked).await;
        self.stats.record_enrichment(&report);

        debug!(
            retrieved,
            kept = sources.len(),
            tables_rendered = report.rendered,
            table_failures = report.failures.len(),
            "context assembled"
        );

        let prompt = build_prompt(question, &sources);
        let answer = self.generator.complete(&prompt).await?;

        info!(sources = sources.len(), "answer generated");
        Ok(PipelineOutput { answer, sources })
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    requests: AtomicU64,
    failed_requests: AtomicU64,
    tables_rendered: AtomicU64,
    tables_missing: AtomicU64,
    table_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub failed_requests: u64,
    pub tables_rendered: u64,
    pub tables_missing: u64,
    pub table_failures: u64,
}

impl PipelineStats {
    fn record_enrichment(&self, report: &EnrichmentReport) {
        self.tables_rendered
            .fetch_add(report.rendered as u64, Ordering::Relaxed);
        self.tables_missing
            .fetch_add(report.missing as u64, Ordering::Relaxed);
        self.table_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            tables_rendered: self.tables_rendered.load(Ordering::Relaxed),
            tables_missing: self.tables_missing.load(Ordering::Relaxed),
            table_failures: self.table_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Prompt;
    use crate::{
        Document, DocumentKind, DocumentMetadata, GenerationError, ScoredCandidate, SearchError,
        TableError,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeIndex {
        hits: Vec<ScoredCandidate>,
        requested_k: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl SimilarityIndex for FakeIndex {
        async fn search(
            &self,
            _query: &str,
            k: usize,
        ) -> Result<Vec<ScoredCandidate>, SearchError> {
            if let Ok(mut slot) = self.requested_k.lock() {
                *slot = Some(k);
            }
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl SimilarityIndex for FailingIndex {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<ScoredCandidate>, SearchError> {
            Err(SearchError::Request("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeTables {
        tables: HashMap<String, String>,
    }

    #[async_trait]
    impl TableStore for FakeTables {
        async fn load(&self, csv_path: &str) -> Result<Option<String>, TableError> {
            Ok(self.tables.get(csv_path).cloned())
        }
    }

    #[derive(Default)]
    struct EchoGenerator {
        seen: Mutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(prompt.clone());
            }
            Ok(format!("answer to {}", prompt.question))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
            Err(GenerationError::BackendResponse {
                status: 502,
                details: "bad gateway".to_string(),
            })
        }
    }

    fn candidate(title: &str, kind: DocumentKind, page: i64, score: f64) -> ScoredCandidate {
        ScoredCandidate::new(
            Document::new(
                format!("{title} body"),
                DocumentMetadata {
                    kind: Some(kind),
                    page_number: Some(page),
                    title: Some(title.to_string()),
                    csv_path: (kind == DocumentKind::Table).then(|| format!("{page}.csv")),
                    ..Default::default()
                },
            ),
            score,
        )
    }

    fn fake_index(hits: Vec<ScoredCandidate>) -> Arc<FakeIndex> {
        Arc::new(FakeIndex {
            hits,
            requested_k: Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn pipeline_reranks_enriches_and_generates() {
        let index = fake_index(vec![
            candidate("Cabin lighting", DocumentKind::Text, 3, 0.90),
            candidate("Fuel Capacity Limits", DocumentKind::Table, 12, 0.80),
            candidate("Engine start", DocumentKind::Diagram, 7, 0.70),
        ]);
        let tables = FakeTables {
            tables: HashMap::from([("12.csv".to_string(), "Tank,Gal\nMain,6875\n".to_string())]),
        };
        let generator = Arc::new(EchoGenerator::default());

        let pipeline = AskPipeline::new(
            index.clone(),
            Arc::new(tables),
            generator.clone(),
            PipelineOptions::default(),
        );
        let output = pipeline
            .ask("What is the maximum fuel capacity?")
            .await
            .expect("pipeline should answer");

        assert_eq!(output.answer, "answer to What is the maximum fuel capacity?");
        assert_eq!(output.sources.len(), 3);
        assert_eq!(output.sources[0].title(), "Fuel Capacity Limits");
        assert!(output.sources[0].content.contains("<td>6875</td>"));
        assert_eq!(*index.requested_k.lock().expect("lock"), Some(20));

        let seen = generator.seen.lock().expect("lock");
        assert!(seen[0].system.contains("[TABLE_HTML]"));
        let fuel = seen[0].system.find("Fuel Capacity Limits body");
        let cabin = seen[0].system.find("Cabin lighting body");
        assert!(fuel < cabin);

        let stats = pipeline.stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.tables_rendered, 1);
        assert_eq!(stats.failed_requests, 0);
    }

    #[tokio::test]
    async fn only_top_five_sources_are_used() {
        let hits = (0..20)
            .map(|page| {
                let score = 1.0 - page as f64 / 100.0;
                candidate(&format!("Section {page}"), DocumentKind::Text, page, score)
            })
            .collect();
        let pipeline = AskPipeline::new(
            fake_index(hits),
            Arc::new(FakeTables::default()),
            Arc::new(EchoGenerator::default()),
            PipelineOptions::default(),
        );

        let output = pipeline.ask("unrelated").await.expect("answer");
        let pages: Vec<_> = output
            .sources
            .iter()
            .filter_map(|doc| doc.metadata.page_number)
            .collect();
        assert_eq!(pages, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn missing_tables_are_counted_not_fatal() {
        let pipeline = AskPipeline::new(
            fake_index(vec![candidate("Limits", DocumentKind::Table, 5, 0.5)]),
            Arc::new(FakeTables::default()),
            Arc::new(EchoGenerator::default()),
            PipelineOptions::default(),
        );

        let output = pipeline.ask("limits").await.expect("answer");
        assert_eq!(output.sources[0].content, "Limits body");
        assert_eq!(pipeline.stats().tables_missing, 1);
    }

    #[tokio::test]
    async fn retrieval_failure_is_surfaced() {
        let pipeline = AskPipeline::new(
            Arc::new(FailingIndex),
            Arc::new(FakeTables::default()),
            Arc::new(EchoGenerator::default()),
            PipelineOptions::default(),
        );

        let error = pipeline.ask("anything").await.expect_err("should fail");
        assert_eq!(error.kind(), "retrieval_failure");
        assert_eq!(pipeline.stats().failed_requests, 1);
    }

    #[tokio::test]
    async fn generation_failure_is_surfaced() {
        let pipeline = AskPipeline::new(
            fake_index(vec![candidate("Limits", DocumentKind::Text, 5, 0.5)]),
            Arc::new(FakeTables::default()),
            Arc::new(FailingGenerator),
            PipelineOptions::default(),
        );

        let error = pipeline.ask("limits").await.expect_err("should fail");
        assert!(matches!(error, PipelineError::Generation(_)));
    }
}
