//! Fan-out research over independent source connectors.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use agent_adapters::search::{
    AcademicSearchConfig, AcademicSearchConnector, WebSearchConfig, WebSearchConnector,
};
use agent_adapters::traits::{AdapterResult, SearchRequest, SourceConnector};
use agent_config::ResearchSettings;
use agent_primitives::{SearchResult, SourceType};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dedup::dedup_by_url;
use crate::error::ResearchResult;
use crate::rerank::Reranker;

/// Result budget applied when the caller does not pick one.
pub const DEFAULT_MAX_SOURCES: usize = 15;

/// Per-call research options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResearchOptions {
    /// Skip connectors that produce web results.
    pub academic_only: bool,
    /// Final result budget, applied after merge, dedupe and rerank.
    pub max_sources: usize,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            academic_only: false,
            max_sources: DEFAULT_MAX_SOURCES,
        }
    }
}

impl ResearchOptions {
    /// Options whose budget comes from host settings.
    #[must_use]
    pub fn from_settings(settings: &ResearchSettings) -> Self {
        Self {
            academic_only: false,
            max_sources: settings.max_sources,
        }
    }

    /// Restricts the call to non-web connectors.
    #[must_use]
    pub const fn academic_only(mut self, academic_only: bool) -> Self {
        self.academic_only = academic_only;
        self
    }

    /// Sets the final result budget.
    #[must_use]
    pub const fn max_sources(mut self, max_sources: usize) -> Self {
        self.max_sources = max_sources;
        self
    }
}

/// What happened to one connector during a research call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SourceOutcome {
    /// The connector answered.
    Succeeded {
        /// Results it contributed before deduplication.
        results: usize,
    },
    /// The connector failed and contributed nothing.
    Failed {
        /// Failure description.
        reason: String,
    },
}

/// Auxiliary per-source metadata attached to a [`ResearchReport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    /// Connector name.
    pub connector: String,
    /// Category of results the connector produces.
    pub source_type: SourceType,
    /// Working budget the connector searched with.
    pub budget: usize,
    /// Outcome of the call.
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

impl SourceStatus {
    fn new(connector: &Arc<dyn SourceConnector>, outcome: SourceOutcome) -> Self {
        Self {
            connector: connector.name().to_owned(),
            source_type: connector.source_type(),
            budget: connector.default_budget(),
            outcome,
        }
    }

    /// Returns `true` when the connector answered.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Succeeded { .. })
    }
}

/// Results of a research call together with per-source outcomes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResearchReport {
    /// Final, bounded result list.
    pub results: Vec<SearchResult>,
    /// One entry per dispatched connector, in invocation order.
    pub sources: Vec<SourceStatus>,
}

/// Builder for [`ResearchOrchestrator`].
#[derive(Default)]
pub struct ResearchOrchestratorBuilder {
    connectors: Vec<Arc<dyn SourceConnector>>,
    reranker: Option<Arc<dyn Reranker>>,
    max_concurrency: Option<NonZeroUsize>,
}

impl ResearchOrchestratorBuilder {
    /// Appends a connector. Connectors are invoked, and their results
    /// merged, in the order they are added.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn SourceConnector>) -> Self {
        self.connectors.push(connector);
        self
    }

    /// Installs a reranker applied to the deduplicated set.
    #[must_use]
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Caps how many connectors run at once. Unset dispatches every
    /// enabled connector together.
    #[must_use]
    pub const fn max_concurrency(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Finalises the orchestrator.
    #[must_use]
    pub fn build(self) -> ResearchOrchestrator {
        ResearchOrchestrator {
            connectors: self.connectors,
            reranker: self.reranker,
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Stateless per-call coordinator over a fixed set of connectors.
pub struct ResearchOrchestrator {
    connectors: Vec<Arc<dyn SourceConnector>>,
    reranker: Option<Arc<dyn Reranker>>,
    max_concurrency: Option<NonZeroUsize>,
}

impl fmt::Debug for ResearchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchOrchestrator")
            .field(
                "connectors",
                &self.connectors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("reranker", &self.reranker.is_some())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl ResearchOrchestrator {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> ResearchOrchestratorBuilder {
        ResearchOrchestratorBuilder::default()
    }

    /// Wires the standard connectors from host settings: web search first
    /// (only when an API key is configured), then academic search.
    ///
    /// # Errors
    ///
    /// Returns an adapter configuration error if a connector cannot be
    /// constructed.
    pub fn from_settings(settings: &ResearchSettings) -> AdapterResult<Self> {
        let mut builder = Self::builder();
        if settings.web_api_key.is_some() {
            let web = WebSearchConnector::new(WebSearchConfig::from_settings(settings)?)?;
            builder = builder.connector(Arc::new(web));
        } else {
            info!("web search disabled: no API key configured");
        }
        let academic = AcademicSearchConnector::new(AcademicSearchConfig::from_settings(settings))?;
        Ok(builder.connector(Arc::new(academic)).build())
    }

    /// Number of configured connectors.
    #[must_use]
    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    /// Runs a research call and returns the bounded result list.
    ///
    /// Source failures only shrink the result list. A blank query reaches no
    /// source and yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::Rerank`](crate::ResearchError::Rerank) if the
    /// reranker faults.
    pub async fn research(
        &self,
        query: &str,
        options: ResearchOptions,
    ) -> ResearchResult<Vec<SearchResult>> {
        Ok(self.research_with_report(query, options).await?.results)
    }

    /// Like [`research`](Self::research), also reporting each source's
    /// outcome.
    ///
    /// # Errors
    ///
    /// Same as [`research`](Self::research).
    pub async fn research_with_report(
        &self,
        query: &str,
        options: ResearchOptions,
    ) -> ResearchResult<ResearchReport> {
        let enabled: Vec<&Arc<dyn SourceConnector>> = self
            .connectors
            .iter()
            .filter(|connector| !options.academic_only || connector.source_type() != SourceType::Web)
            .collect();

        let request = match SearchRequest::new(query) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "query rejected before fan-out");
                let sources = enabled
                    .iter()
                    .map(|connector| {
                        let reason = err.to_string();
                        SourceStatus::new(connector, SourceOutcome::Failed { reason })
                    })
                    .collect();
                return Ok(ResearchReport {
                    results: Vec::new(),
                    sources,
                });
            }
        };

        if enabled.is_empty() {
            debug!("no enabled connectors");
            return Ok(ResearchReport {
                results: Vec::new(),
                sources: Vec::new(),
            });
        }

        let limit = self
            .max_concurrency
            .map_or(enabled.len(), NonZeroUsize::get);
        let request = &request;
        // `buffered` yields in submission order whatever the completion order.
        let searches: Vec<_> = enabled
            .into_iter()
            .map(|connector| search_one(connector, request))
            .collect();
        let outcomes: Vec<_> = stream::iter(searches)
            .buffered(limit)
            .collect()
            .await;

        let mut merged = Vec::new();
        let mut sources = Vec::with_capacity(outcomes.len());
        for (connector, outcome) in outcomes {
            let outcome = match outcome {
                Ok(results) => {
                    debug!(
                        connector = connector.name(),
                        budget = connector.default_budget(),
                        results = results.len(),
                        "source answered"
                    );
                    let count = results.len();
                    merged.extend(results);
                    SourceOutcome::Succeeded { results: count }
                }
                Err(err) => {
                    warn!(connector = connector.name(), error = %err, "source failed");
                    SourceOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            sources.push(SourceStatus::new(connector, outcome));
        }

        let mut results = dedup_by_url(merged);
        if let Some(reranker) = &self.reranker {
            results = reranker.rerank(request.query(), results).await?;
        }
        results.truncate(options.max_sources);

        info!(
            query = request.query(),
            results = results.len(),
            failed = sources.iter().filter(|s| !s.succeeded()).count(),
            "research complete"
        );
        Ok(ResearchReport { results, sources })
    }
}

async fn search_one<'a>(
    connector: &'a Arc<dyn SourceConnector>,
    request: &SearchRequest,
) -> (
    &'a Arc<dyn SourceConnector>,
    AdapterResult<Vec<SearchResult>>,
) {
    (connector, connector.search(request).await)
}
