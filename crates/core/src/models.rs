use crate::rerank::RerankOptions;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Table,
    Diagram,
}

/// Known metadata keys of a manual passage. Unknown keys in source data are ignored.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    #[serde(rename = "type")]
    pub kind: Option<DocumentKind>,
    #[serde(default, deserialize_with = "lenient_page_number")]
    pub page_number: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub section: Option<String>,
    pub csv_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or_default()
    }

    pub fn is_table(&self) -> bool {
        self.metadata.kind == Some(DocumentKind::Table)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub document: Document,
    pub base_score: f64,
}

impl ScoredCandidate {
    pub fn new(document: Document, base_score: f64) -> Self {
        Self {
            document,
            base_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub answer: String,
    pub referenced_pages: Vec<i64>,
}

impl From<PipelineOutput> for AskResponse {
    fn from(output: PipelineOutput) -> Self {
        Self {
            referenced_pages: referenced_pages(&output.sources),
            answer: output.answer,
        }
    }
}

/// Answer plus the enriched documents that were used as its context.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub answer: String,
    pub sources: Vec<Document>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Candidates requested from the similarity index before reranking.
    pub fetch_k: usize,
    pub rerank: RerankOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch_k: 20,
            rerank: RerankOptions::default(),
        }
    }
}

pub fn referenced_pages(sources: &[Document]) -> Vec<i64> {
    sources
        .iter()
        .filter_map(|document| document.metadata.page_number)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Integers pass, floats truncate, numeric strings parse; anything else is dropped.
pub fn coerce_page_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn lenient_page_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_page_number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(number: Option<i64>) -> Document {
        Document::new(
            "body",
            DocumentMetadata {
                page_number: number,
                ..Default::default()
            },
        )
    }

    #[test]
    fn metadata_coerces_page_numbers_leniently() {
        let parsed: Vec<DocumentMetadata> = serde_json::from_value(json!([
            {"type": "table", "page_number": 12, "csv_path": "t.csv"},
            {"type": "text", "page_number": "7"},
            {"type": "diagram", "page_number": 3.9},
            {"type": "text", "page_number": "n/a"},
            {"type": "text", "page_number": null, "bbox": [1, 2]},
        ]))
        .expect("metadata should deserialize");

        let pages: Vec<_> = parsed.iter().map(|meta| meta.page_number).collect();
        assert_eq!(pages, vec![Some(12), Some(7), Some(3), None, None]);
        assert_eq!(parsed[0].kind, Some(DocumentKind::Table));
        assert_eq!(parsed[0].csv_path.as_deref(), Some("t.csv"));
    }

    #[test]
    fn referenced_pages_are_unique_and_ascending() {
        let sources = vec![page(Some(9)), page(None), page(Some(2)), page(Some(9))];
        assert_eq!(referenced_pages(&sources), vec![2, 9]);
    }

    #[test]
    fn response_is_derived_from_pipeline_output() {
        let output = PipelineOutput {
            answer: "42 gallons".to_string(),
            sources: vec![page(Some(4)), page(Some(1))],
        };

        let response = AskResponse::from(output);
        assert_eq!(response.answer, "42 gallons");
        assert_eq!(response.referenced_pages, vec![1, 4]);
    }

    #[test]
    fn absent_metadata_fields_are_not_serialized() {
        let meta = DocumentMetadata {
            kind: Some(DocumentKind::Text),
            ..Default::default()
        };
        let value = serde_json::to_value(&meta).expect("metadata should serialize");
        assert_eq!(value, json!({"type": "text"}));
    }
}
