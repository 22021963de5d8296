use crate::models::{Document, ScoredCandidate};
use crate::tokenize::{count_matches, tokenize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How the raw title-match count is scaled before the weight is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoostNormalization {
    /// Divide by the query length in characters. Matches existing rankings.
    #[default]
    QueryChars,
    /// Divide by the number of distinct query tokens.
    QueryTokens,
    /// Use the raw match count.
    Raw,
}

impl BoostNormalization {
    fn divisor(self, query: &str) -> usize {
        match self {
            BoostNormalization::QueryChars => query.chars().count(),
            BoostNormalization::QueryTokens => tokenize(query).len(),
            BoostNormalization::Raw => 1,
        }
    }

    /// Scaled match count; zero when the divisor is zero.
    pub fn normalize(self, matches: usize, query: &str) -> f64 {
        match self.divisor(query) {
            0 => 0.0,
            divisor => matches as f64 / divisor as f64,
        }
    }
}

impl FromStr for BoostNormalization {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "query-chars" | "chars" => Ok(BoostNormalization::QueryChars),
            "query-tokens" | "tokens" => Ok(BoostNormalization::QueryTokens),
            "raw" | "none" => Ok(BoostNormalization::Raw),
            other => Err(format!(
                "unknown normalization '{other}', expected query-chars, query-tokens or raw"
            )),
        }
    }
}

impl fmt::Display for BoostNormalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoostNormalization::QueryChars => "query-chars",
            BoostNormalization::QueryTokens => "query-tokens",
            BoostNormalization::Raw => "raw",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankOptions {
    pub weight: f64,
    pub top_n: usize,
    pub normalization: BoostNormalization,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            weight: 10.0,
            top_n: 5,
            normalization: BoostNormalization::QueryChars,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub document: Document,
    pub title_matches: usize,
    pub final_score: f64,
}

pub fn combine_scores(base_score: f64, boost: f64) -> f64 {
    base_score + boost
}

pub fn title_boost(query: &str, title: &str, options: &RerankOptions) -> (usize, f64) {
    let matches = count_matches(query, title);
    let boost = options.normalization.normalize(matches, query) * options.weight;
    (matches, boost)
}

/// Scores every candidate and returns the best `top_n`, highest first.
/// Equal scores keep their input order.
pub fn rank_candidates(
    candidates: Vec<ScoredCandidate>,
    query: &str,
    options: &RerankOptions,
) -> Vec<RankedDocument> {
    let mut ranked: Vec<RankedDocument> = candidates
        .into_iter()
        .map(|candidate| {
            let (title_matches, boost) = title_boost(query, candidate.document.title(), options);
            RankedDocument {
                final_score: combine_scores(candidate.base_score, boost),
                title_matches,
                document: candidate.document,
            }
        })
        .collect();

    ranked.sort_by(|left, right| right.final_score.total_cmp(&left.final_score));
    ranked.truncate(options.top_n);

    debug!(
        kept = ranked.len(),
        normalization = %options.normalization,
        weight = options.weight,
        "reranked candidates"
    );

    ranked
}

pub fn rerank(
    candidates: Vec<ScoredCandidate>,
    query: &str,
    options: &RerankOptions,
) -> Vec<Document> {
    rank_candidates(candidates, query, options)
        .into_iter()
        .map(|ranked| ranked.document)
        .collect()
}
