//! Search-provider connectors.
//!
//! Each connector implements [`SourceConnector`](crate::traits::SourceConnector)
//! and normalises provider responses into
//! [`SearchResult`](agent_primitives::SearchResult) values.

pub mod academic;
mod text;
pub mod web;

pub use academic::{
    AcademicIndex, AcademicQuery, AcademicSearchConfig, AcademicSearchConnector, ArxivIndex,
    CrossrefIndex, SemanticScholarIndex,
};
pub use web::{WebSearchConfig, WebSearchConnector};
