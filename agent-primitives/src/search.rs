//! Normalised search result shape shared by every source connector.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category of the source that produced a result.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// General web page.
    Web,
    /// Scholarly publication.
    Academic,
    /// Patent filing.
    Patent,
    /// Legal document or case.
    Legal,
}

impl SourceType {
    /// Returns the canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Academic => "academic",
            Self::Patent => "patent",
            Self::Legal => "legal",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scholarly index queried by the academic connector.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AcademicProvider {
    /// arXiv preprint server.
    #[serde(rename = "arxiv")]
    Arxiv,
    /// Semantic Scholar graph API.
    #[serde(rename = "semanticScholar")]
    SemanticScholar,
    /// Crossref works registry.
    #[serde(rename = "crossref")]
    Crossref,
}

impl AcademicProvider {
    /// Returns the configuration label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::SemanticScholar => "semanticScholar",
            Self::Crossref => "crossref",
        }
    }
}

impl fmt::Display for AcademicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcademicProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [Self::Arxiv, Self::SemanticScholar, Self::Crossref]
            .into_iter()
            .find(|provider| provider.as_str() == s)
            .ok_or_else(|| Error::unknown("academic provider", s))
    }
}

/// A single result produced by a source connector.
///
/// Results are immutable once built; the orchestrator deduplicates them by
/// [`url`](Self::url).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    id: String,
    title: String,
    url: String,
    snippet: String,
    source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relevance_score: Option<f64>,
}

impl SearchResult {
    /// Starts building a result with its identifying fields.
    #[must_use]
    pub fn builder(
        id: impl Into<String>,
        url: impl Into<String>,
        source_type: SourceType,
    ) -> SearchResultBuilder {
        SearchResultBuilder {
            id: id.into(),
            url: url.into(),
            source_type,
            title: String::new(),
            snippet: String::new(),
            published_at: None,
            authors: Vec::new(),
            venue: None,
            relevance_score: None,
        }
    }

    /// Opaque provider-assigned identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Result title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Canonical URL, used as the deduplication key.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Short excerpt or abstract.
    #[must_use]
    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    /// Category of the producing source.
    #[must_use]
    pub const fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Publication date as reported by the provider.
    #[must_use]
    pub fn published_at(&self) -> Option<&str> {
        self.published_at.as_deref()
    }

    /// Author names, possibly empty.
    #[must_use]
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    /// Journal, conference, or site name.
    #[must_use]
    pub fn venue(&self) -> Option<&str> {
        self.venue.as_deref()
    }

    /// Relevance in `[0, 1]` when the provider or a reranker supplied one.
    #[must_use]
    pub const fn relevance_score(&self) -> Option<f64> {
        self.relevance_score
    }

    /// Returns a copy carrying a new relevance score.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSearchResult`] when the score falls outside
    /// `[0, 1]`.
    pub fn with_relevance_score(mut self, score: f64) -> Result<Self> {
        validate_score(score)?;
        self.relevance_score = Some(score);
        Ok(self)
    }
}

/// Builder for [`SearchResult`].
#[derive(Debug)]
pub struct SearchResultBuilder {
    id: String,
    url: String,
    source_type: SourceType,
    title: String,
    snippet: String,
    published_at: Option<String>,
    authors: Vec<String>,
    venue: Option<String>,
    relevance_score: Option<f64>,
}

impl SearchResultBuilder {
    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the snippet.
    #[must_use]
    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    /// Sets the publication date.
    #[must_use]
    pub fn published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = Some(published_at.into());
        self
    }

    /// Replaces the author list.
    #[must_use]
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the venue.
    #[must_use]
    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    /// Sets the relevance score. Validated in [`build`](Self::build).
    #[must_use]
    pub fn relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// Finalises the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSearchResult`] if the id or URL is blank or the
    /// relevance score is outside `[0, 1]`.
    pub fn build(self) -> Result<SearchResult> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_result("id cannot be empty"));
        }
        if self.url.trim().is_empty() {
            return Err(Error::invalid_result("url cannot be empty"));
        }
        if let Some(score) = self.relevance_score {
            validate_score(score)?;
        }

        Ok(SearchResult {
            id: self.id,
            title: self.title,
            url: self.url,
            snippet: self.snippet,
            source_type: self.source_type,
            published_at: self.published_at,
            authors: self.authors,
            venue: self.venue,
            relevance_score: self.relevance_score,
        })
    }
}

fn validate_score(score: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&score) {
        return Err(Error::invalid_result(format!(
            "relevance score {score} must be within [0, 1]"
        )));
    }
    Ok(())
}
