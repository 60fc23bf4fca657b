//! Record and document types that flow through the ingestion pipeline.
//!
//! ```text
//! RawDocument ──extract──▶ IntermediateData ──parse──▶ RawRecord ──normalize──▶ NormalizedRecord
//! ```

use serde::{Deserialize, Serialize};

use crate::source::IntermediateForm;

/// A document as acquired from upstream, before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDocument {
    /// A downloaded file (in practice always a PDF).
    Bytes { url: String, bytes: Vec<u8> },
    /// Text contents of the nodes matched by a listing selector, gathered
    /// inside the browser session that loaded the page.
    Listing { url: String, items: Vec<String> },
}

impl RawDocument {
    /// The URL the document was read from.
    pub fn url(&self) -> &str {
        match self {
            RawDocument::Bytes { url, .. } | RawDocument::Listing { url, .. } => url,
        }
    }
}

/// One page of a table extraction: rows top to bottom, cells left to right.
///
/// Rows are not padded, so a row may hold fewer cells than the table has
/// columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePage {
    pub rows: Vec<Vec<String>>,
}

/// Output of the extractor, in the shape a parser strategy consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntermediateData {
    PlainText(String),
    TableGrid(Vec<TablePage>),
    DomListing(Vec<String>),
}

impl IntermediateData {
    pub fn form(&self) -> IntermediateForm {
        match self {
            IntermediateData::PlainText(_) => IntermediateForm::PlainText,
            IntermediateData::TableGrid(_) => IntermediateForm::TableGrid,
            IntermediateData::DomListing(_) => IntermediateForm::DomListing,
        }
    }
}

/// A person record as produced by a parser. Not yet trusted: fields may
/// carry stray whitespace, embedded newlines, or arbitrary casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub county: String,
}

impl RawRecord {
    pub fn new(
        county: impl Into<String>,
        last_name: impl Into<String>,
        first_name: impl Into<String>,
        middle_name: impl Into<String>,
    ) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            middle_name: middle_name.into(),
            county: county.into(),
        }
    }
}

/// A cleaned record keyed by its identity, as stored in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Natural key: `county-last-first`, lowercased and hyphenated.
    pub id: String,
    pub county: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
}
