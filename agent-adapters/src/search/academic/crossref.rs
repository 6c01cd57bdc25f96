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
use crate::search::text::plain_text;
use crate::traits::{AdapterError, AdapterResult};

const DEFAULT_ENDPOINT: &str = "https://api.crossref.org/works";
const MAX_ROWS: usize = 100;

/// Crossref REST API works search.
pub struct CrossrefIndex {
    client: HyperClient,
    endpoint: String,
    timeout: Duration,
}

impl std::fmt::Debug for CrossrefIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefIndex")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl CrossrefIndex {
    /// Creates an index against the public works endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the HTTP client cannot be
    /// constructed.
    pub fn new() -> AdapterResult<Self> {
        Ok(Self {
            client: build_https_client()?,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            timeout: Duration::from_secs(20),
        })
    }

    /// Overrides the works endpoint.
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
            AdapterError::configuration(format!("invalid Crossref endpoint: {err}"))
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("query", &query.query)
                .append_pair("rows", &query.limit.clamp(1, MAX_ROWS).to_string());

            let mut filters = Vec::new();
            if let Some(from) = query.year_from {
                filters.push(format!("from-pub-date:{from}"));
            }
            if let Some(to) = query.year_to {
                filters.push(format!("until-pub-date:{to}"));
            }
            if !filters.is_empty() {
                pairs.append_pair("filter", &filters.join(","));
            }
        }

        url.as_str()
            .parse::<Uri>()
            .map_err(|err| AdapterError::invalid_request(format!("invalid search URI: {err}")))
    }
}

#[async_trait]
impl AcademicIndex for CrossrefIndex {
    fn provider(&self) -> AcademicProvider {
        AcademicProvider::Crossref
    }

    async fn search(&self, query: &AcademicQuery) -> AdapterResult<Vec<SearchResult>> {
        let request = Request::get(self.request_uri(query)?)
            .header(ACCEPT, "application/json")
            .header(hyper::header::USER_AGENT, USER_AGENT)
            .body(Body::empty())
            .map_err(|err| {
                AdapterError::transport(format!("failed to build Crossref request: {err}"))
            })?;

        let bytes = fetch(&self.client, request, self.timeout, "Crossref").await?;
        let response: WorksResponse = decode_json(&bytes, "Crossref")?;
        Ok(normalise(response, query.limit))
    }
}

fn normalise(response: WorksResponse, limit: usize) -> Vec<SearchResult> {
    response
        .message
        .items
        .into_iter()
        .take(limit)
        .filter_map(Work::into_result)
        .collect()
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Default, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(rename = "DOI", default)]
    doi: String,
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(default)]
    author: Vec<Contributor>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(default)]
    issued: Option<PartialDate>,
}

#[derive(Debug, Deserialize)]
struct Contributor {
    #[serde(default)]
    given: Option<String>,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl Contributor {
    fn display_name(self) -> Option<String> {
        let joined = [self.given, self.family]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() { self.name } else { Some(joined) }
    }
}

#[derive(Debug, Deserialize)]
struct PartialDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<u32>>>,
}

impl PartialDate {
    /// Renders `[[2019, 4, 1]]` as `2019-04-01`, keeping only the parts
    /// present.
    fn render(&self) -> Option<String> {
        let parts: Vec<u32> = self.date_parts.first()?.iter().map_while(|part| *part).collect();
        match parts.as_slice() {
            [] => None,
            [year] => Some(format!("{year:04}")),
            [year, month] => Some(format!("{year:04}-{month:02}")),
            [year, month, day, ..] => Some(format!("{year:04}-{month:02}-{day:02}")),
        }
    }
}

impl Work {
    fn into_result(self) -> Option<SearchResult> {
        if self.doi.trim().is_empty() {
            debug!("Crossref work without DOI dropped");
            return None;
        }
        let url = self
            .url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("https://doi.org/{}", self.doi));
        let title = self.title.first().map(String::as_str).map(plain_text);
        let published = self.issued.as_ref().and_then(PartialDate::render);

        let mut builder = SearchResult::builder(format!("doi:{}", self.doi), url, SourceType::Academic)
            .title(title.unwrap_or_default())
            .snippet(self.abstract_text.as_deref().map(plain_text).unwrap_or_default())
            .authors(self.author.into_iter().filter_map(Contributor::display_name));
        if let Some(published) = published {
            builder = builder.published_at(published);
        }
        if let Some(venue) = self.container_title.into_iter().find(|venue| !venue.is_empty()) {
            builder = builder.venue(venue);
        }

        builder
            .build()
            .map_err(|err| debug!(error = %err, "Crossref work dropped"))
            .ok()
    }
}
