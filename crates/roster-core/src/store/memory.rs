//! In-memory [`RosterStore`] implementation for tests and embedding.
//!
//! Records live in a `HashMap` keyed by identity behind
//! `std::sync::RwLock`; every write takes the lock once, so a batch is
//! applied all-or-nothing.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::SinkError;
use crate::models::NormalizedRecord;

use super::{CountyRow, RosterPage, RosterQuery, RosterStore};

#[derive(Default)]
struct State {
    records: HashMap<String, NormalizedRecord>,
    counties: Vec<CountyRow>,
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, SinkError> {
        self.state
            .read()
            .map_err(|_| SinkError::ReadFailed("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, SinkError> {
        self.state
            .write()
            .map_err(|_| SinkError::WriteFailed("store lock poisoned".to_string()))
    }

    /// Every stored record, sorted by identity.
    pub fn snapshot(&self) -> Vec<NormalizedRecord> {
        let Ok(state) = self.read() else {
            return Vec::new();
        };
        let mut records: Vec<NormalizedRecord> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Number of stored records for `county`.
    pub fn count_for(&self, county: &str) -> usize {
        self.read()
            .map(|s| {
                s.records
                    .values()
                    .filter(|r| r.county.eq_ignore_ascii_case(county))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl RosterStore for InMemoryStore {
    async fn upsert(&self, records: &[NormalizedRecord]) -> Result<usize, SinkError> {
        let mut state = self.write()?;
        for record in records {
            state.records.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn delete_all(&self) -> Result<u64, SinkError> {
        let mut state = self.write()?;
        let removed = state.records.len() as u64;
        state.records.clear();
        Ok(removed)
    }

    async fn list_county(&self, query: &RosterQuery) -> Result<RosterPage, SinkError> {
        let state = self.read()?;
        let needle = query.search_term().map(str::to_lowercase);
        let mut matches: Vec<&NormalizedRecord> = state
            .records
            .values()
            .filter(|r| r.county.eq_ignore_ascii_case(&query.county))
            .filter(|r| match &needle {
                Some(n) => {
                    r.first_name.to_lowercase().contains(n.as_str())
                        || r.last_name.to_lowercase().contains(n.as_str())
                }
                None => true,
            })
            .collect();
        matches.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
        });

        let total = matches.len() as u64;
        let records = matches
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .cloned()
            .collect();
        Ok(RosterPage { records, total })
    }

    async fn counties(&self) -> Result<Vec<CountyRow>, SinkError> {
        Ok(self.read()?.counties.clone())
    }

    async fn init_counties(&self, names: &[&str]) -> Result<usize, SinkError> {
        let mut state = self.write()?;
        state.counties = names
            .iter()
            .enumerate()
            .map(|(i, name)| CountyRow {
                id: i as i64 + 1,
                name: name.to_string(),
            })
            .collect();
        Ok(names.len())
    }
}
