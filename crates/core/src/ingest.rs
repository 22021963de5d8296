use crate::chunking::{RecursiveSplitter, SplitterConfig};
use crate::models::coerce_page_number;
use crate::{Document, DocumentKind, DocumentMetadata, IngestError};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SOURCE_FILES: [(&str, DocumentKind); 3] = [
    ("texts.json", DocumentKind::Text),
    ("tables.json", DocumentKind::Table),
    ("diagrams.json", DocumentKind::Diagram),
];

#[derive(Debug, Deserialize)]
struct SourceRecord {
    #[serde(rename = "type", default)]
    kind: Option<DocumentKind>,
    #[serde(default)]
    page_number: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    csv_path: Option<String>,
}

impl SourceRecord {
    fn into_metadata(self, default_kind: DocumentKind) -> DocumentMetadata {
        DocumentMetadata {
            kind: Some(self.kind.unwrap_or(default_kind)),
            page_number: self.page_number.as_ref().and_then(coerce_page_number),
            title: self.title,
            description: self.description,
            section: self.section,
            csv_path: self.csv_path,
        }
    }
}

/// Loads one JSON array of passages. Each passage's title, description, section and
/// table text form its content, which is split into chunks sharing its metadata.
pub fn load_source_file(
    path: &Path,
    default_kind: DocumentKind,
    splitter: &RecursiveSplitter,
) -> Result<Vec<Document>, IngestError> {
    let raw = fs::read_to_string(path)?;
    let records: Vec<SourceRecord> =
        serde_json::from_str(&raw).map_err(|source| IngestError::Json {
            path: path.display().to_string(),
            source,
        })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut documents = Vec::new();
    for record in records {
        let table_text = record
            .csv_path
            .as_deref()
            .map(|csv_path| read_table_text(&base.join(csv_path)))
            .unwrap_or_default();

        let content = [
            record.title.as_deref(),
            record.description.as_deref(),
            record.section.as_deref(),
            Some(table_text.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

        let metadata = record.into_metadata(default_kind);
        documents.extend(
            splitter
                .split(&content)
                .into_iter()
                .map(|chunk| Document::new(chunk, metadata.clone())),
        );
    }

    Ok(documents)
}

fn read_table_text(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => {
            debug!(path = %path.display(), reason = %error, "table text unavailable");
            String::new()
        }
    }
}

pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedSource>,
}

pub fn load_manual_folder(
    folder: &Path,
    config: SplitterConfig,
) -> Result<IngestionReport, IngestError> {
    let splitter = RecursiveSplitter::new(config)?;
    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();
    let mut loaded_any = false;

    for (name, kind) in SOURCE_FILES {
        let path = folder.join(name);
        match load_source_file(&path, kind, &splitter) {
            Ok(file_documents) => {
                loaded_any = true;
                documents.extend(file_documents);
            }
            Err(error) => skipped_files.push(SkippedSource {
                path,
                reason: error.to_string(),
            }),
        }
    }

    if !loaded_any {
        return Err(IngestError::InvalidArgument(format!(
            "no readable source files in {}",
            folder.display()
        )));
    }

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}
