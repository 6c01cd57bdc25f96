use std::time::Duration;

use agent_primitives::{AcademicProvider, SearchResult, SourceType};
use async_trait::async_trait;
use hyper::header::ACCEPT;
use hyper::{Body, Request, Uri};
use tracing::debug;
use url::Url;
use xml::attribute::OwnedAttribute;
use xml::reader::{ParserConfig, XmlEvent};

use super::{AcademicIndex, AcademicQuery};
use crate::http_client::{HyperClient, USER_AGENT, build_https_client, fetch};
use crate::search::text::collapse_whitespace;
use crate::traits::{AdapterError, AdapterResult};

const DEFAULT_ENDPOINT: &str = "https://export.arxiv.org/api/query";

/// arXiv export API search over the Atom feed.
pub struct ArxivIndex {
    client: HyperClient,
    endpoint: String,
    timeout: Duration,
}

impl std::fmt::Debug for ArxivIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArxivIndex")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ArxivIndex {
    /// Creates an index against the public export endpoint.
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

    /// Overrides the query endpoint.
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
            AdapterError::configuration(format!("invalid arXiv endpoint: {err}"))
        })?;
        url.query_pairs_mut()
            .append_pair("search_query", &format!("all:{}", query.query))
            .append_pair("start", "0")
            .append_pair("max_results", &query.limit.max(1).to_string());

        url.as_str()
            .parse::<Uri>()
            .map_err(|err| AdapterError::invalid_request(format!("invalid search URI: {err}")))
    }
}

#[async_trait]
impl AcademicIndex for ArxivIndex {
    fn provider(&self) -> AcademicProvider {
        AcademicProvider::Arxiv
    }

    async fn search(&self, query: &AcademicQuery) -> AdapterResult<Vec<SearchResult>> {
        let request = Request::get(self.request_uri(query)?)
            .header(ACCEPT, "application/atom+xml")
            .header(hyper::header::USER_AGENT, USER_AGENT)
            .body(Body::empty())
            .map_err(|err| {
                AdapterError::transport(format!("failed to build arXiv request: {err}"))
            })?;

        let bytes = fetch(&self.client, request, self.timeout, "arXiv").await?;
        let feed = std::str::from_utf8(&bytes)
            .map_err(|err| AdapterError::response(format!("arXiv feed is not UTF-8: {err}")))?;

        let mut results = parse_feed(feed)?;
        results.truncate(query.limit);
        Ok(results)
    }
}

#[derive(Default)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    link: Option<String>,
}

impl Entry {
    fn into_result(self) -> Option<SearchResult> {
        let id = self.id.trim();
        let key = id.rsplit('/').next().unwrap_or(id);
        let url = self.link.unwrap_or_else(|| id.to_owned());

        let mut builder = SearchResult::builder(format!("arxiv:{key}"), url, SourceType::Academic)
            .title(collapse_whitespace(&self.title))
            .snippet(collapse_whitespace(&self.summary))
            .authors(self.authors)
            .venue("arXiv");
        if !self.published.trim().is_empty() {
            builder = builder.published_at(self.published.trim());
        }

        builder
            .build()
            .map_err(|err| debug!(error = %err, "arXiv entry dropped"))
            .ok()
    }
}

fn parse_feed(feed: &str) -> AdapterResult<Vec<SearchResult>> {
    let reader = ParserConfig::new()
        .trim_whitespace(true)
        .create_reader(feed.as_bytes());

    let mut results = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut entry: Option<Entry> = None;

    for event in reader {
        let event =
            event.map_err(|err| AdapterError::response(format!("malformed arXiv feed: {err}")))?;
        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                let local = name.local_name;
                if local == "entry" {
                    entry = Some(Entry::default());
                } else if let Some(entry) = entry.as_mut() {
                    if local == "link" {
                        take_link(entry, &attributes);
                    } else if local == "author" {
                        entry.authors.push(String::new());
                    }
                }
                path.push(local);
            }
            XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                if let Some(entry) = entry.as_mut() {
                    append_text(entry, &path, &text);
                }
            }
            XmlEvent::EndElement { name } => {
                path.pop();
                if name.local_name == "entry" {
                    if let Some(result) = entry.take().and_then(Entry::into_result) {
                        results.push(result);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(results)
}

fn append_text(entry: &mut Entry, path: &[String], text: &str) {
    let Some(current) = path.last() else {
        return;
    };
    let parent = path.len().checked_sub(2).and_then(|index| path.get(index));
    let target = match current.as_str() {
        "id" => &mut entry.id,
        "title" => &mut entry.title,
        "summary" => &mut entry.summary,
        "published" => &mut entry.published,
        "name" if parent.is_some_and(|parent| parent == "author") => {
            match entry.authors.last_mut() {
                Some(author) => author,
                None => return,
            }
        }
        _ => return,
    };
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

fn take_link(entry: &mut Entry, attributes: &[OwnedAttribute]) {
    let mut href = None;
    let mut alternate = true;
    for attribute in attributes {
        match attribute.name.local_name.as_str() {
            "href" => href = Some(attribute.value.clone()),
            "rel" => alternate = attribute.value == "alternate",
            _ => {}
        }
    }
    if alternate && entry.link.is_none() {
        entry.link = href;
    }
}
