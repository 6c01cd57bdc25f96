use std::collections::{HashMap, HashSet};
use std::future::Future;

use agent_primitives::SearchResult;
use async_trait::async_trait;

use crate::error::{ResearchError, ResearchResult};

/// Reorders a deduplicated result set for a query.
///
/// The orchestrator trusts the returned ordering as-is.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns `results` in their new order.
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
    ) -> ResearchResult<Vec<SearchResult>>;
}

#[async_trait]
impl<F, Fut> Reranker for F
where
    F: Send + Sync + Fn(String, Vec<SearchResult>) -> Fut,
    Fut: Future<Output = ResearchResult<Vec<SearchResult>>> + Send,
{
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
    ) -> ResearchResult<Vec<SearchResult>> {
        (self)(query.to_owned(), results).await
    }
}

/// Okapi BM25 over each result's title and snippet.
///
/// Results are sorted by descending score; ties keep their incoming order.
/// The score, divided by the best score in the set, is written into
/// [`SearchResult::relevance_score`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bm25Reranker {
    k1: f64,
    b: f64,
}

impl Default for Bm25Reranker {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Reranker {
    /// Creates a reranker with custom term-saturation (`k1`) and
    /// length-normalisation (`b`) parameters.
    #[must_use]
    pub const fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }

    /// Raw BM25 scores for `documents`, in input order.
    #[allow(clippy::cast_precision_loss)]
    fn scores(&self, query: &[String], documents: &[Vec<String>]) -> Vec<f64> {
        let count = documents.len() as f64;
        let total_len: usize = documents.iter().map(Vec::len).sum();
        let avg_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / count
        };

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for document in documents {
            let unique: HashSet<&str> = document.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        documents
            .iter()
            .map(|document| {
                let mut frequencies: HashMap<&str, usize> = HashMap::new();
                for term in document {
                    *frequencies.entry(term.as_str()).or_default() += 1;
                }
                let length_ratio = if avg_len > 0.0 {
                    document.len() as f64 / avg_len
                } else {
                    0.0
                };

                query
                    .iter()
                    .map(|term| {
                        let Some(&occurrences) = frequencies.get(term.as_str()) else {
                            return 0.0;
                        };
                        let tf = occurrences as f64;
                        let df = document_frequency.get(term.as_str()).copied().unwrap_or(0) as f64;
                        let idf = ((count - df + 0.5) / (df + 0.5) + 1.0).ln();
                        idf * (tf * (self.k1 + 1.0))
                            / (tf + self.k1 * (1.0 - self.b + self.b * length_ratio))
                    })
                    .sum()
            })
            .collect()
    }
}

#[async_trait]
impl Reranker for Bm25Reranker {
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
    ) -> ResearchResult<Vec<SearchResult>> {
        let mut terms = tokenize(query);
        let mut seen = HashSet::new();
        terms.retain(|term| seen.insert(term.clone()));
        if terms.is_empty() || results.is_empty() {
            return Ok(results);
        }

        let documents: Vec<Vec<String>> = results
            .iter()
            .map(|result| tokenize(&format!("{} {}", result.title(), result.snippet())))
            .collect();
        let scores = self.scores(&terms, &documents);
        let best = scores.iter().copied().fold(0.0_f64, f64::max);

        let mut scored: Vec<(f64, SearchResult)> = scores.into_iter().zip(results).collect();
        scored.sort_by(|(left, _), (right, _)| right.total_cmp(left));

        scored
            .into_iter()
            .map(|(score, result)| {
                let normalised = if best > 0.0 { (score / best).clamp(0.0, 1.0) } else { 0.0 };
                result
                    .with_relevance_score(normalised)
                    .map_err(|err| ResearchError::rerank(err.to_string()))
            })
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}
