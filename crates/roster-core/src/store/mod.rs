//! Storage abstraction for the roster snapshot.
//!
//! The [`RosterStore`] trait is the write contract the refresh pipeline
//! needs (batched upsert keyed by identity, unconditional delete-all) plus
//! the thin read contract used by the trigger server. Both write
//! operations must be atomic from the caller's point of view: either the
//! whole batch lands or the call returns [`SinkError`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SinkError;
use crate::models::NormalizedRecord;

/// A paginated, optionally filtered listing of one county's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterQuery {
    pub county: String,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    /// Case-insensitive substring matched against first and last name.
    pub search: Option<String>,
}

impl RosterQuery {
    pub fn new(county: impl Into<String>) -> Self {
        Self {
            county: county.into(),
            page: 1,
            page_size: 25,
            search: None,
        }
    }

    /// Rows to skip for the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.page_size)
    }

    /// The search term, if present and non-blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One page of a [`RosterQuery`] plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterPage {
    pub records: Vec<NormalizedRecord>,
    pub total: u64,
}

/// County metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountyRow {
    pub id: i64,
    pub name: String,
}

/// Abstract storage backend for the roster snapshot.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](RosterStore::upsert) | Write a batch, overwriting by identity |
/// | [`delete_all`](RosterStore::delete_all) | Erase every record, all counties |
/// | [`list_county`](RosterStore::list_county) | Paginated, searchable county listing |
/// | [`counties`](RosterStore::counties) | County metadata ordered by id |
/// | [`init_counties`](RosterStore::init_counties) | Seed county metadata |
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Write all records in one atomic batch. Conflicting identities are
    /// overwritten whole, never merged. Returns the number of records
    /// written.
    async fn upsert(&self, records: &[NormalizedRecord]) -> Result<usize, SinkError>;

    /// Remove every record regardless of county. Returns the number
    /// removed; zero is a success.
    async fn delete_all(&self) -> Result<u64, SinkError>;

    /// Records for one county ordered by last name, then first name.
    async fn list_county(&self, query: &RosterQuery) -> Result<RosterPage, SinkError>;

    /// County metadata ordered by id.
    async fn counties(&self) -> Result<Vec<CountyRow>, SinkError>;

    /// Upsert county metadata with 1-based ids in the given order.
    async fn init_counties(&self, names: &[&str]) -> Result<usize, SinkError>;
}
