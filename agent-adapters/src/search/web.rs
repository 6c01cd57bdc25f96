//! Web search connector backed by the Brave Search API.

use std::fmt;
use std::time::Duration;

use agent_config::ResearchSettings;
use agent_primitives::{SearchResult, SourceType};
use async_trait::async_trait;
use hyper::header::ACCEPT;
use hyper::{Body, Request, Uri};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::text::{plain_text, rank_score};
use crate::http_client::{HyperClient, USER_AGENT, build_https_client, decode_json, fetch};
use crate::traits::{AdapterError, AdapterResult, SearchRequest, SourceConnector};

const DEFAULT_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const TOKEN_HEADER: &str = "X-Subscription-Token";
const MAX_COUNT: usize = 20;

/// Configuration for the [`WebSearchConnector`].
#[derive(Clone)]
pub struct WebSearchConfig {
    endpoint: String,
    api_key: String,
    num_results: usize,
    domain_filters: Vec<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("endpoint", &self.endpoint)
            .field("num_results", &self.num_results)
            .field("domain_filters", &self.domain_filters)
            .field("date_from", &self.date_from)
            .field("date_to", &self.date_to)
            .finish_non_exhaustive()
    }
}

impl WebSearchConfig {
    /// Creates a configuration using the supplied API key and defaults.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            api_key: api_key.into(),
            num_results: 10,
            domain_filters: Vec::new(),
            date_from: None,
            date_to: None,
            timeout: Duration::from_secs(15),
        }
    }

    /// Builds a configuration from host research settings.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when no web API key is set.
    pub fn from_settings(settings: &ResearchSettings) -> AdapterResult<Self> {
        let api_key = settings
            .web_api_key
            .clone()
            .ok_or_else(|| AdapterError::configuration("web search API key is not set"))?;

        Ok(Self::new(api_key)
            .with_num_results(settings.web_budget)
            .with_domain_filters(settings.domain_filters.iter().cloned()))
    }

    /// Overrides the search endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the URL is invalid.
    pub fn with_endpoint(mut self, endpoint: impl AsRef<str>) -> AdapterResult<Self> {
        let url = Url::parse(endpoint.as_ref())
            .map_err(|err| AdapterError::configuration(format!("invalid web endpoint: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AdapterError::configuration(
                "web endpoint must use http or https",
            ));
        }
        self.endpoint = url.into();
        Ok(self)
    }

    /// Sets the default number of results per query.
    #[must_use]
    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results.max(1);
        self
    }

    /// Restricts results to the given domains.
    #[must_use]
    pub fn with_domain_filters(mut self, domains: impl IntoIterator<Item = String>) -> Self {
        self.domain_filters = domains
            .into_iter()
            .map(|domain| domain.trim().to_owned())
            .filter(|domain| !domain.is_empty())
            .collect();
        self
    }

    /// Restricts results to pages dated within `[from, to]` (`YYYY-MM-DD`).
    #[must_use]
    pub fn with_date_range(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Sets the HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Web search connector.
///
/// Domain filters are sent as `site:` operators. A complete date range is
/// sent as the provider's freshness window; either bound is also applied to
/// the returned page dates, so one-sided ranges work too. Relevance is
/// derived from the provider's rank.
pub struct WebSearchConnector {
    client: HyperClient,
    endpoint: Url,
    config: WebSearchConfig,
}

impl fmt::Debug for WebSearchConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSearchConnector")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl WebSearchConnector {
    /// Constructs a connector from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is blank, the
    /// endpoint is invalid, or the HTTP client cannot be constructed.
    pub fn new(config: WebSearchConfig) -> AdapterResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AdapterError::configuration("web search API key is empty"));
        }
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|err| AdapterError::configuration(format!("invalid web endpoint: {err}")))?;
        let client = build_https_client()?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    fn query_text(&self, query: &str) -> String {
        match self.config.domain_filters.as_slice() {
            [] => query.to_owned(),
            [domain] => format!("{query} site:{domain}"),
            domains => {
                let sites = domains
                    .iter()
                    .map(|domain| format!("site:{domain}"))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                format!("{query} ({sites})")
            }
        }
    }

    fn request_uri(&self, query: &str, count: usize) -> AdapterResult<Uri> {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", &self.query_text(query))
                .append_pair("count", &count.clamp(1, MAX_COUNT).to_string());
            if let (Some(from), Some(to)) = (&self.config.date_from, &self.config.date_to) {
                pairs.append_pair("freshness", &format!("{from}to{to}"));
            }
        }

        url.as_str()
            .parse::<Uri>()
            .map_err(|err| AdapterError::invalid_request(format!("invalid search URI: {err}")))
    }

    fn within_dates(&self, published: Option<&str>) -> bool {
        let Some(date) = published.and_then(|date| date.get(..10)) else {
            return true;
        };
        let after_start = self
            .config
            .date_from
            .as_deref()
            .is_none_or(|from| date >= from);
        let before_end = self.config.date_to.as_deref().is_none_or(|to| date <= to);
        after_start && before_end
    }

    fn normalise(&self, response: BraveResponse, limit: usize) -> Vec<SearchResult> {
        let items: Vec<_> = response
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .filter(|item| !item.url.trim().is_empty())
            .filter(|item| self.within_dates(item.page_age.as_deref()))
            .take(limit)
            .collect();
        let total = items.len();

        let mut results = Vec::with_capacity(total);
        for (rank, item) in items.into_iter().enumerate() {
            let venue = item
                .profile
                .map(|profile| profile.name)
                .or(item.meta_url.map(|meta| meta.hostname))
                .filter(|venue| !venue.is_empty());

            let mut builder =
                SearchResult::builder(format!("web:{}", item.url), &item.url, SourceType::Web)
                    .title(plain_text(&item.title))
                    .snippet(plain_text(&item.description))
                    .relevance_score(rank_score(rank, total));
            if let Some(published) = item.page_age {
                builder = builder.published_at(published);
            }
            if let Some(venue) = venue {
                builder = builder.venue(venue);
            }

            match builder.build() {
                Ok(result) => results.push(result),
                Err(err) => debug!(url = %item.url, error = %err, "web result dropped"),
            }
        }
        results
    }
}

#[async_trait]
impl SourceConnector for WebSearchConnector {
    fn name(&self) -> &str {
        "web"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Web
    }

    fn default_budget(&self) -> usize {
        self.config.num_results
    }

    async fn search(&self, request: &SearchRequest) -> AdapterResult<Vec<SearchResult>> {
        let limit = request.max_results().unwrap_or(self.config.num_results);
        let uri = self.request_uri(request.query(), limit)?;

        let http_request = Request::get(uri)
            .header(ACCEPT, "application/json")
            .header(hyper::header::USER_AGENT, USER_AGENT)
            .header(TOKEN_HEADER, &self.config.api_key)
            .body(Body::empty())
            .map_err(|err| AdapterError::transport(format!("failed to build web request: {err}")))?;

        let bytes = fetch(&self.client, http_request, self.config.timeout, "web search").await?;
        let response: BraveResponse = decode_json(&bytes, "web search")?;
        let results = self.normalise(response, limit);
        debug!(connector = "web", results = results.len(), "web search completed");
        Ok(results)
    }
}

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    page_age: Option<String>,
    #[serde(default)]
    profile: Option<BraveProfile>,
    #[serde(default)]
    meta_url: Option<BraveMetaUrl>,
}

#[derive(Debug, Deserialize)]
struct BraveProfile {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct BraveMetaUrl {
    #[serde(default)]
    hostname: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn connector(config: WebSearchConfig) -> WebSearchConnector {
        WebSearchConnector::new(config).expect("valid config")
    }

    fn sample() -> BraveResponse {
        serde_json::from_value(json!({
            "web": { "results": [
                {
                    "title": "The <strong>GDPR</strong> explained",
                    "url": "https://example.eu/gdpr",
                    "description": "A guide to <strong>data</strong> protection",
                    "page_age": "2023-05-01T08:00:00",
                    "profile": { "name": "Example EU" }
                },
                { "title": "No url", "url": "" },
                {
                    "title": "Old news",
                    "url": "https://news.example.com/old",
                    "description": "",
                    "page_age": "2015-01-01T00:00:00",
                    "meta_url": { "hostname": "news.example.com" }
                }
            ]}
        }))
        .unwrap()
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = WebSearchConnector::new(WebSearchConfig::new(" ")).expect_err("blank key");
        assert!(matches!(err, AdapterError::Configuration { .. }));

        let err = WebSearchConfig::from_settings(&ResearchSettings::default())
            .expect_err("no key in settings");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn builds_query_with_site_filters_and_freshness() {
        let connector = connector(
            WebSearchConfig::new("key")
                .with_domain_filters(["europa.eu".to_owned(), "gov.uk".to_owned()])
                .with_date_range(Some("2022-01-01".into()), Some("2023-12-31".into())),
        );

        let uri = connector.request_uri("data retention", 50).unwrap();
        let url = Url::parse(&uri.to_string()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            [
                ("q".to_owned(), "data retention (site:europa.eu OR site:gov.uk)".to_owned()),
                ("count".to_owned(), "20".to_owned()),
                ("freshness".to_owned(), "2022-01-01to2023-12-31".to_owned()),
            ]
        );
    }

    #[test]
    fn single_domain_filter() {
        let connector =
            connector(WebSearchConfig::new("key").with_domain_filters(["arxiv.org".to_owned()]));
        assert_eq!(connector.query_text("llm"), "llm site:arxiv.org");
    }

    #[test]
    fn normalises_results() {
        let connector = connector(WebSearchConfig::new("key"));
        let results = connector.normalise(sample(), 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title(), "The GDPR explained");
        assert_eq!(results[0].snippet(), "A guide to data protection");
        assert_eq!(results[0].venue(), Some("Example EU"));
        assert_eq!(results[0].relevance_score(), Some(1.0));
        assert_eq!(results[1].venue(), Some("news.example.com"));
        assert_eq!(results[1].relevance_score(), Some(0.5));
        assert!(results.iter().all(|r| r.source_type() == SourceType::Web));
    }

    #[test]
    fn one_sided_date_range_filters_results() {
        let connector = connector(
            WebSearchConfig::new("key").with_date_range(Some("2020-01-01".into()), None),
        );
        let results = connector.normalise(sample(), 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url(), "https://example.eu/gdpr");
    }

    #[test]
    fn respects_limit() {
        let connector = connector(WebSearchConfig::new("key"));
        assert_eq!(connector.normalise(sample(), 1).len(), 1);
    }

    #[test]
    fn settings_map_to_config() {
        let settings = ResearchSettings {
            web_api_key: Some("k".into()),
            web_budget: 7,
            domain_filters: vec!["example.org".into()],
            ..ResearchSettings::default()
        };
        let connector = connector(WebSearchConfig::from_settings(&settings).unwrap());
        assert_eq!(connector.default_budget(), 7);
        assert_eq!(connector.name(), "web");
    }
}
