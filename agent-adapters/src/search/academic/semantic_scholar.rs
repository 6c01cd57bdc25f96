use std::fmt;
use std::time::Duration;

use agent_primitives::{AcademicProvider, SearchResult, SourceType};
use async_trait::async_trait;
use hyper::header::ACCEPT;
use hyper::{Body, Request, Uri};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{AcademicIndex, AcademicQuery};
use crate::http_client::{HyperClient, USER_AGENT, build_https_client, decode_json, fetch};
use crate::search::text::collapse_whitespace;
use crate::traits::{AdapterError, AdapterResult};

const DEFAULT_ENDPOINT: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "paperId,title,abstract,url,venue,year,publicationDate,authors";
const MAX_LIMIT: usize = 100;

/// Semantic Scholar Graph API paper search.
///
/// Year range and venues are sent as query parameters.
pub struct SemanticScholarIndex {
    client: HyperClient,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for SemanticScholarIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticScholarIndex")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl SemanticScholarIndex {
    /// Creates an index against the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the HTTP client cannot be
    /// constructed.
    pub fn new() -> AdapterResult<Self> {
        Ok(Self {
            client: build_https_client()?,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            api_key: None,
            timeout: Duration::from_secs(20),
        })
    }

    /// Sends `key` as the `x-api-key` header.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the search endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_uri(&self, query: &AcademicQuery) -> AdapterResult<Uri> {
        let mut url = Url::parse(&self.endpoint).map_err(|err| {
            AdapterError::configuration(format!("invalid Semantic Scholar endpoint: {err}"))
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("query", &query.query)
                .append_pair("limit", &query.limit.clamp(1, MAX_LIMIT).to_string())
                .append_pair("fields", FIELDS);
            match (query.year_from, query.year_to) {
                (None, None) => {}
                (from, to) => {
                    let bound = |year: Option<i32>| year.map(|y| y.to_string()).unwrap_or_default();
                    pairs.append_pair("year", &format!("{}-{}", bound(from), bound(to)));
                }
            }
            if !query.venues.is_empty() {
                pairs.append_pair("venue", &query.venues.join(","));
            }
        }

        url.as_str()
            .parse::<Uri>()
            .map_err(|err| AdapterError::invalid_request(format!("invalid search URI: {err}")))
    }
}

#[async_trait]
impl AcademicIndex for SemanticScholarIndex {
    fn provider(&self) -> AcademicProvider {
        AcademicProvider::SemanticScholar
    }

    async fn search(&self, query: &AcademicQuery) -> AdapterResult<Vec<SearchResult>> {
        let mut builder = Request::get(self.request_uri(query)?)
            .header(ACCEPT, "application/json")
            .header(hyper::header::USER_AGENT, USER_AGENT);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        let request = builder.body(Body::empty()).map_err(|err| {
            AdapterError::transport(format!("failed to build Semantic Scholar request: {err}"))
        })?;

        let bytes = fetch(&self.client, request, self.timeout, "Semantic Scholar").await?;
        let response: PaperSearch = decode_json(&bytes, "Semantic Scholar")?;
        Ok(normalise(response, query.limit))
    }
}

fn normalise(response: PaperSearch, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for paper in response.data.into_iter().take(limit) {
        let url = paper
            .url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("https://www.semanticscholar.org/paper/{}", paper.paper_id));
        let published = paper
            .publication_date
            .or_else(|| paper.year.map(|year| year.to_string()));

        let mut builder = SearchResult::builder(format!("s2:{}", paper.paper_id), url, SourceType::Academic)
            .title(collapse_whitespace(&paper.title))
            .snippet(collapse_whitespace(paper.abstract_text.as_deref().unwrap_or_default()))
            .authors(paper.authors.into_iter().map(|author| author.name));
        if let Some(published) = published {
            builder = builder.published_at(published);
        }
        if let Some(venue) = paper.venue.filter(|venue| !venue.is_empty()) {
            builder = builder.venue(venue);
        }

        match builder.build() {
            Ok(result) => results.push(result),
            Err(err) => debug!(error = %err, "Semantic Scholar paper dropped"),
        }
    }
    results
}

#[derive(Debug, Deserialize)]
struct PaperSearch {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    #[serde(default)]
    paper_id: String,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    name: String,
}
