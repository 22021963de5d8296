use crate::traits::TableStore;
use crate::{Document, TableError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const TABLE_MARKER: &str = "[TABLE_HTML]";

/// Reads tables from disk; relative paths resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsTableStore {
    root: PathBuf,
}

impl FsTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, csv_path: &str) -> PathBuf {
        let path = Path::new(csv_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl TableStore for FsTableStore {
    async fn load(&self, csv_path: &str) -> Result<Option<String>, TableError> {
        match tokio::fs::read_to_string(self.resolve(csv_path)).await {
            Ok(text) => Ok(Some(text)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(TableError::Io(error)),
        }
    }
}

/// Renders delimited text with a header row as an HTML table. Short rows are
/// padded with empty cells; rows wider than the header are an error.
pub fn render_html_table(csv_text: &str) -> Result<String, TableError> {
    let csv_text = csv_text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(TableError::Empty("missing header row".to_string()));
    }

    let mut html = String::from("<table border=\"1\" class=\"dataframe\">\n");
    html.push_str("  <thead>\n    <tr style=\"text-align: right;\">\n");
    for header in headers.iter() {
        html.push_str(&format!("      <th>{}</th>\n", html_escape::encode_text(header)));
    }
    html.push_str("    </tr>\n  </thead>\n  <tbody>\n");

    let width = headers.len();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > width {
            return Err(TableError::Ragged {
                row: row + 1,
                found: record.len(),
                expected: width,
            });
        }

        html.push_str("    <tr>\n");
        for column in 0..width {
            let cell = record.get(column).unwrap_or_default();
            html.push_str(&format!("      <td>{}</td>\n", html_escape::encode_text(cell)));
        }
        html.push_str("    </tr>\n");
    }

    html.push_str("  </tbody>\n</table>");
    Ok(html)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub csv_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub rendered: usize,
    pub missing: usize,
    pub failures: Vec<TableFailure>,
}

pub struct TableRenderer {
    store: Arc<dyn TableStore>,
}

impl TableRenderer {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Enriches table documents in place. Failures leave the document untouched
    /// and are reported, never returned.
    pub async fn enrich(&self, documents: Vec<Document>) -> (Vec<Document>, EnrichmentReport) {
        let mut report = EnrichmentReport::default();
        let mut enriched = Vec::with_capacity(documents.len());

        for mut document in documents {
            let csv_path = match document.metadata.csv_path.clone() {
                Some(path) if document.is_table() && !path.is_empty() => path,
                _ => {
                    enriched.push(document);
                    continue;
                }
            };

            match self.render(&csv_path).await {
                Ok(Some(html)) => {
                    document.content.push_str(&format!("\n\n{TABLE_MARKER}\n{html}"));
                    report.rendered += 1;
                }
                Ok(None) => {
                    debug!(csv_path = %csv_path, "table resource not found");
                    report.missing += 1;
                }
                Err(error) => {
                    warn!(csv_path = %csv_path, reason = %error, "table enrichment failed");
                    report.failures.push(TableFailure {
                        csv_path,
                        reason: error.to_string(),
                    });
                }
            }

            enriched.push(document);
        }

        (enriched, report)
    }

    async fn render(&self, csv_path: &str) -> Result<Option<String>, TableError> {
        match self.store.load(csv_path).await? {
            Some(text) => render_html_table(&text).map(Some),
            None => Ok(None),
        }
    }
}
