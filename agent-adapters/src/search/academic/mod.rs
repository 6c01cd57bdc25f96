//! Multi-provider academic search.
//!
//! [`AcademicSearchConnector`] queries each configured [`AcademicIndex`]
//! concurrently, isolates provider failures, applies year and venue filters,
//! and deduplicates by URL before slicing to the result budget.

mod arxiv;
mod crossref;
mod semantic_scholar;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agent_config::ResearchSettings;
use agent_primitives::{AcademicProvider, SearchResult, SourceType};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::text::year_of;
use crate::traits::{AdapterError, AdapterResult, SearchRequest, SourceConnector};

pub use arxiv::ArxivIndex;
pub use crossref::CrossrefIndex;
pub use semantic_scholar::SemanticScholarIndex;

/// Query forwarded to every academic index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcademicQuery {
    /// Free-text query.
    pub query: String,
    /// Maximum results wanted from this index.
    pub limit: usize,
    /// Earliest publication year, inclusive.
    pub year_from: Option<i32>,
    /// Latest publication year, inclusive.
    pub year_to: Option<i32>,
    /// Venue names to restrict to; empty means any.
    pub venues: Vec<String>,
}

impl AcademicQuery {
    /// Returns `true` when `result` satisfies the year and venue filters.
    ///
    /// Results without a date pass the year filter; results without a venue
    /// fail a non-empty venue filter.
    #[must_use]
    pub fn accepts(&self, result: &SearchResult) -> bool {
        if let Some(year) = result.published_at().and_then(year_of) {
            if self.year_from.is_some_and(|from| year < from)
                || self.year_to.is_some_and(|to| year > to)
            {
                return false;
            }
        }

        if self.venues.is_empty() {
            return true;
        }
        let Some(venue) = result.venue().map(str::to_lowercase) else {
            return false;
        };
        self.venues
            .iter()
            .any(|wanted| venue.contains(&wanted.to_lowercase()))
    }
}

/// One scholarly index.
#[async_trait]
pub trait AcademicIndex: Send + Sync {
    /// Provider this index talks to.
    fn provider(&self) -> AcademicProvider;

    /// Runs the query, returning at most `query.limit` normalised results.
    async fn search(&self, query: &AcademicQuery) -> AdapterResult<Vec<SearchResult>>;
}

/// Configuration for the [`AcademicSearchConnector`].
#[derive(Clone)]
pub struct AcademicSearchConfig {
    providers: Vec<AcademicProvider>,
    max_results: usize,
    year_from: Option<i32>,
    year_to: Option<i32>,
    venues: Vec<String>,
    semantic_scholar_api_key: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for AcademicSearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcademicSearchConfig")
            .field("providers", &self.providers)
            .field("max_results", &self.max_results)
            .field("year_from", &self.year_from)
            .field("year_to", &self.year_to)
            .field("venues", &self.venues)
            .finish_non_exhaustive()
    }
}

impl Default for AcademicSearchConfig {
    fn default() -> Self {
        Self {
            providers: vec![AcademicProvider::SemanticScholar, AcademicProvider::Arxiv],
            max_results: 10,
            year_from: None,
            year_to: None,
            venues: Vec::new(),
            semantic_scholar_api_key: None,
            timeout: Duration::from_secs(20),
        }
    }
}

impl AcademicSearchConfig {
    /// Builds a configuration from host research settings. The academic
    /// budget becomes the connector's result cap.
    #[must_use]
    pub fn from_settings(settings: &ResearchSettings) -> Self {
        let mut config = Self::default()
            .with_providers(settings.academic_providers.iter().copied())
            .with_max_results(settings.academic_budget)
            .with_year_range(settings.year_from, settings.year_to)
            .with_venues(settings.venues.iter().cloned());
        config.semantic_scholar_api_key = settings.semantic_scholar_api_key.clone();
        config
    }

    /// Replaces the provider list. Duplicates are ignored.
    #[must_use]
    pub fn with_providers(mut self, providers: impl IntoIterator<Item = AcademicProvider>) -> Self {
        let mut seen = HashSet::new();
        self.providers = providers
            .into_iter()
            .filter(|provider| seen.insert(*provider))
            .collect();
        self
    }

    /// Sets the result cap applied after deduplication.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Restricts publication years, inclusive.
    #[must_use]
    pub fn with_year_range(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.year_from = from;
        self.year_to = to;
        self
    }

    /// Restricts venues.
    #[must_use]
    pub fn with_venues(mut self, venues: impl IntoIterator<Item = String>) -> Self {
        self.venues = venues.into_iter().collect();
        self
    }

    /// Sets the Semantic Scholar API key.
    #[must_use]
    pub fn with_semantic_scholar_api_key(mut self, key: impl Into<String>) -> Self {
        self.semantic_scholar_api_key = Some(key.into());
        self
    }

    /// Sets the per-provider HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured providers, in query order.
    #[must_use]
    pub fn providers(&self) -> &[AcademicProvider] {
        &self.providers
    }

    /// Result cap.
    #[must_use]
    pub const fn max_results(&self) -> usize {
        self.max_results
    }
}

/// Academic connector aggregating several [`AcademicIndex`] providers.
pub struct AcademicSearchConnector {
    config: AcademicSearchConfig,
    indices: Vec<Arc<dyn AcademicIndex>>,
}

impl fmt::Debug for AcademicSearchConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcademicSearchConnector")
            .field(
                "providers",
                &self.indices.iter().map(|index| index.provider()).collect::<Vec<_>>(),
            )
            .field("max_results", &self.config.max_results)
            .finish()
    }
}

impl AcademicSearchConnector {
    /// Creates a connector with one HTTP-backed index per configured
    /// provider.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if an HTTP client cannot be
    /// constructed.
    pub fn new(config: AcademicSearchConfig) -> AdapterResult<Self> {
        let mut indices: Vec<Arc<dyn AcademicIndex>> = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            let index: Arc<dyn AcademicIndex> = match provider {
                AcademicProvider::SemanticScholar => {
                    let mut index = SemanticScholarIndex::new()?.with_timeout(config.timeout);
                    if let Some(key) = &config.semantic_scholar_api_key {
                        index = index.with_api_key(key.clone());
                    }
                    Arc::new(index)
                }
                AcademicProvider::Arxiv => Arc::new(ArxivIndex::new()?.with_timeout(config.timeout)),
                AcademicProvider::Crossref => {
                    Arc::new(CrossrefIndex::new()?.with_timeout(config.timeout))
                }
            };
            indices.push(index);
        }

        Ok(Self { config, indices })
    }

    /// Creates a connector over caller-supplied indices, queried in the
    /// order given.
    #[must_use]
    pub fn with_indices(
        config: AcademicSearchConfig,
        indices: Vec<Arc<dyn AcademicIndex>>,
    ) -> Self {
        Self { config, indices }
    }

    fn query(&self, request: &SearchRequest) -> AcademicQuery {
        AcademicQuery {
            query: request.query().to_owned(),
            limit: request.max_results().unwrap_or(self.config.max_results),
            year_from: self.config.year_from,
            year_to: self.config.year_to,
            venues: self.config.venues.clone(),
        }
    }
}

#[async_trait]
impl SourceConnector for AcademicSearchConnector {
    fn name(&self) -> &str {
        "academic"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Academic
    }

    fn default_budget(&self) -> usize {
        self.config.max_results
    }

    async fn search(&self, request: &SearchRequest) -> AdapterResult<Vec<SearchResult>> {
        if self.indices.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.query(request);
        let outcomes = join_all(self.indices.iter().map(|index| {
            let query = &query;
            async move { (index.provider(), index.search(query).await) }
        }))
        .await;

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for (provider, outcome) in outcomes {
            match outcome {
                Ok(results) => {
                    debug!(%provider, results = results.len(), "academic provider answered");
                    merged.extend(results);
                }
                Err(err) => {
                    warn!(%provider, error = %err, "academic provider failed");
                    failures.push(format!("{provider}: {err}"));
                }
            }
        }

        if failures.len() == self.indices.len() {
            return Err(AdapterError::response(format!(
                "all academic providers failed ({})",
                failures.join("; ")
            )));
        }

        let mut seen = HashSet::new();
        let results: Vec<_> = merged
            .into_iter()
            .filter(|result| query.accepts(result))
            .filter(|result| seen.insert(result.url().to_owned()))
            .take(query.limit)
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FakeIndex {
        provider: AcademicProvider,
        results: AdapterResult<Vec<(&'static str, Option<&'static str>, Option<&'static str>)>>,
        calls: AtomicUsize,
    }

    impl FakeIndex {
        fn ok(
            provider: AcademicProvider,
            results: Vec<(&'static str, Option<&'static str>, Option<&'static str>)>,
        ) -> Arc<dyn AcademicIndex> {
            Arc::new(Self {
                provider,
                results: Ok(results),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(provider: AcademicProvider) -> Arc<Self> {
            Arc::new(Self {
                provider,
                results: Err(AdapterError::transport("unreachable")),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AcademicIndex for FakeIndex {
        fn provider(&self) -> AcademicProvider {
            self.provider
        }

        async fn search(&self, query: &AcademicQuery) -> AdapterResult<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.results {
                Ok(rows) => Ok(rows
                    .iter()
                    .take(query.limit)
                    .map(|(url, date, venue)| {
                        let mut builder = SearchResult::builder(*url, *url, SourceType::Academic);
                        if let Some(date) = date {
                            builder = builder.published_at(*date);
                        }
                        if let Some(venue) = venue {
                            builder = builder.venue(*venue);
                        }
                        builder.build().unwrap()
                    })
                    .collect()),
                Err(_) => Err(AdapterError::transport("unreachable")),
            }
        }
    }

    fn urls(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(SearchResult::url).collect()
    }

    fn request() -> SearchRequest {
        SearchRequest::new("graph neural networks").unwrap()
    }

    #[tokio::test]
    async fn merges_in_provider_order_and_dedupes() {
        let connector = AcademicSearchConnector::with_indices(
            AcademicSearchConfig::default(),
            vec![
                FakeIndex::ok(
                    AcademicProvider::SemanticScholar,
                    vec![("a", None, None), ("b", None, None)],
                ),
                FakeIndex::ok(AcademicProvider::Arxiv, vec![("b", None, None), ("c", None, None)]),
            ],
        );

        let results = connector.search(&request()).await.unwrap();
        assert_eq!(urls(&results), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn isolates_provider_failures() {
        let connector = AcademicSearchConnector::with_indices(
            AcademicSearchConfig::default(),
            vec![
                FakeIndex::failing(AcademicProvider::SemanticScholar) as Arc<dyn AcademicIndex>,
                FakeIndex::ok(AcademicProvider::Arxiv, vec![("x", None, None)]),
            ],
        );

        let results = connector.search(&request()).await.unwrap();
        assert_eq!(urls(&results), ["x"]);
    }

    #[tokio::test]
    async fn fails_only_when_every_provider_fails() {
        let first = FakeIndex::failing(AcademicProvider::SemanticScholar);
        let second = FakeIndex::failing(AcademicProvider::Crossref);
        let connector = AcademicSearchConnector::with_indices(
            AcademicSearchConfig::default(),
            vec![
                Arc::clone(&first) as Arc<dyn AcademicIndex>,
                Arc::clone(&second) as Arc<dyn AcademicIndex>,
            ],
        );

        let err = connector.search(&request()).await.expect_err("all failed");
        assert!(matches!(err, AdapterError::Response { .. }));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_providers_is_empty() {
        let connector =
            AcademicSearchConnector::with_indices(AcademicSearchConfig::default(), Vec::new());
        assert!(connector.search(&request()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn slices_after_dedupe() {
        let connector = AcademicSearchConnector::with_indices(
            AcademicSearchConfig::default().with_max_results(2),
            vec![
                FakeIndex::ok(
                    AcademicProvider::SemanticScholar,
                    vec![("a", None, None), ("a", None, None)],
                ),
                FakeIndex::ok(AcademicProvider::Arxiv, vec![("b", None, None), ("c", None, None)]),
            ],
        );

        let results = connector.search(&request()).await.unwrap();
        assert_eq!(urls(&results), ["a", "b"]);
        assert_eq!(connector.default_budget(), 2);
    }

    #[tokio::test]
    async fn applies_year_and_venue_filters() {
        let connector = AcademicSearchConnector::with_indices(
            AcademicSearchConfig::default()
                .with_year_range(Some(2018), Some(2022))
                .with_venues(["NeurIPS".to_owned()]),
            vec![FakeIndex::ok(
                AcademicProvider::Crossref,
                vec![
                    ("old", Some("2010-01-01"), Some("NeurIPS")),
                    ("ok", Some("2020"), Some("Advances in NeurIPS 33")),
                    ("wrong-venue", Some("2020"), Some("ICML")),
                    ("undated", None, Some("neurips")),
                    ("no-venue", Some("2019"), None),
                ],
            )],
        );

        let results = connector.search(&request()).await.unwrap();
        assert_eq!(urls(&results), ["ok", "undated"]);
    }

    #[test]
    fn settings_map_to_config() {
        let settings = ResearchSettings {
            academic_providers: vec![
                AcademicProvider::Crossref,
                AcademicProvider::Crossref,
                AcademicProvider::Arxiv,
            ],
            academic_budget: 20,
            ..ResearchSettings::default()
        };
        let config = AcademicSearchConfig::from_settings(&settings);
        assert_eq!(
            config.providers(),
            [AcademicProvider::Crossref, AcademicProvider::Arxiv]
        );
        assert_eq!(config.max_results(), 20);

        let connector = AcademicSearchConnector::new(config).unwrap();
        assert_eq!(connector.indices.len(), 2);
        assert_eq!(connector.source_type(), SourceType::Academic);
    }

    #[test]
    fn default_providers() {
        assert_eq!(
            AcademicSearchConfig::default().providers(),
            [AcademicProvider::SemanticScholar, AcademicProvider::Arxiv]
        );
    }
}
