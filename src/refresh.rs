//! Refresh orchestration.
//!
//! The [`Refresher`] is the only component that knows there is more than
//! one source. Per source it runs
//!
//! ```text
//! fetch ──▶ extract ──▶ parse ──▶ normalize ──▶ upsert
//! ```
//!
//! and it owns the single run slot: one run at a time, whatever its
//! scope, because every run writes to the same store. A request that
//! arrives while a run holds the slot fails with
//! [`RefreshError::AlreadyRunning`]; runs are never interleaved.
//!
//! # Full refresh modes
//!
//! | Mode | Behaviour |
//! |------|-----------|
//! | `sequential` | `delete_all`, then each source in declaration order; the first failure stops the run and the store keeps whatever was written before it |
//! | `staged` | prepare every source first; delete and write only when all succeeded, otherwise the store is left untouched |

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use roster_core::normalize::normalize_batch;
use roster_core::store::RosterStore;
use roster_core::{ExtractError, FetchError, NormalizedRecord, SinkError, Source, SourceRegistry};

use crate::config::RefreshMode;
use crate::extract::extract_blocking;
use crate::fetch::DocumentFetcher;

/// What a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "county", rename_all = "snake_case")]
pub enum RunScope {
    Full,
    Single(String),
}

impl std::fmt::Display for RunScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunScope::Full => f.write_str("full refresh"),
            RunScope::Single(county) => write!(f, "refresh of {}", county),
        }
    }
}

/// Pipeline stage a source failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extract,
    Sink,
}

/// One source's failure in a staged run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub county: String,
    pub stage: Stage,
    pub message: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("unknown source county: '{0}'")]
    InvalidSource(String),

    #[error("{0} is already in progress")]
    AlreadyRunning(RunScope),

    #[error("{county}: {source}")]
    Fetch { county: String, source: FetchError },

    #[error("{county}: {source}")]
    Extract { county: String, source: ExtractError },

    #[error("{}{source}", county_prefix(.county))]
    Sink {
        county: Option<String>,
        source: SinkError,
    },

    #[error("{} source(s) failed; snapshot left unchanged", .failures.len())]
    Staged { failures: Vec<SourceFailure> },
}

fn county_prefix(county: &Option<String>) -> String {
    county
        .as_deref()
        .map(|c| format!("{}: ", c))
        .unwrap_or_default()
}

impl RefreshError {
    fn failure(&self) -> Option<SourceFailure> {
        let (county, stage) = match self {
            RefreshError::Fetch { county, .. } => (county.clone(), Stage::Fetch),
            RefreshError::Extract { county, .. } => (county.clone(), Stage::Extract),
            RefreshError::Sink {
                county: Some(county),
                ..
            } => (county.clone(), Stage::Sink),
            _ => return None,
        };
        Some(SourceFailure {
            county,
            stage,
            message: self.to_string(),
        })
    }
}

/// Per-source counts for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub county: String,
    /// Records the parser produced.
    pub parsed: usize,
    /// Records written after normalization and dedup.
    pub upserted: usize,
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub run_id: Uuid,
    pub scope: RunScope,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Records removed by the leading delete-all; zero for single runs.
    pub deleted: u64,
    pub sources: Vec<SourceOutcome>,
}

impl RefreshReport {
    pub fn total_upserted(&self) -> usize {
        self.sources.iter().map(|s| s.upserted).sum()
    }
}

/// Retained outcome of the most recent run, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub report: RefreshReport,
}

#[derive(Debug, Clone)]
enum RunState {
    Idle,
    Running {
        scope: RunScope,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    },
}

/// Snapshot of the orchestrator for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<RunScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub last_run: Option<LastRun>,
}

/// A source's records, ready to write.
struct Prepared {
    county: String,
    parsed: usize,
    records: Vec<NormalizedRecord>,
}

/// Holds the run slot; releases it on drop, including on early return.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = RunState::Idle;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Refresher {
    registry: SourceRegistry,
    fetcher: Arc<dyn DocumentFetcher>,
    store: Arc<dyn RosterStore>,
    mode: RefreshMode,
    state: Mutex<RunState>,
    last_run: Mutex<Option<LastRun>>,
}

impl Refresher {
    pub fn new(
        registry: SourceRegistry,
        fetcher: Arc<dyn DocumentFetcher>,
        store: Arc<dyn RosterStore>,
        mode: RefreshMode,
    ) -> Self {
        Self {
            registry,
            fetcher,
            store,
            mode,
            state: Mutex::new(RunState::Idle),
            last_run: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RosterStore> {
        &self.store
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn status(&self) -> RefreshStatus {
        let last_run = lock(&self.last_run).clone();
        match &*lock(&self.state) {
            RunState::Idle => RefreshStatus {
                running: false,
                scope: None,
                run_id: None,
                started_at: None,
                last_run,
            },
            RunState::Running {
                scope,
                run_id,
                started_at,
            } => RefreshStatus {
                running: true,
                scope: Some(scope.clone()),
                run_id: Some(*run_id),
                started_at: Some(*started_at),
                last_run,
            },
        }
    }

    /// Check-and-set the run slot.
    fn claim(&self, scope: RunScope) -> Result<RunGuard<'_>, RefreshError> {
        let mut state = lock(&self.state);
        if let RunState::Running { scope: current, .. } = &*state {
            return Err(RefreshError::AlreadyRunning(current.clone()));
        }
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        *state = RunState::Running {
            scope,
            run_id,
            started_at,
        };
        Ok(RunGuard {
            state: &self.state,
            run_id,
            started_at,
        })
    }

    /// Replace the whole snapshot with fresh data from every source.
    pub async fn refresh_all(&self) -> Result<RefreshReport, RefreshError> {
        let guard = self.claim(RunScope::Full)?;
        let mut report = new_report(&guard, RunScope::Full);
        tracing::info!(
            run_id = %report.run_id,
            mode = ?self.mode,
            sources = self.registry.len(),
            "full refresh started"
        );

        let result = match self.mode {
            RefreshMode::Sequential => self.run_sequential(&mut report).await,
            RefreshMode::Staged => self.run_staged(&mut report).await,
        };
        self.finish(report, result)
    }

    /// Refresh one county without touching any other county's records.
    pub async fn refresh_one(&self, county: &str) -> Result<RefreshReport, RefreshError> {
        let source = self
            .registry
            .find(county)
            .ok_or_else(|| RefreshError::InvalidSource(county.trim().to_string()))?;

        let scope = RunScope::Single(source.county.clone());
        let guard = self.claim(scope.clone())?;
        let mut report = new_report(&guard, scope);
        tracing::info!(run_id = %report.run_id, county = %source.county, "single refresh started");

        let result = async {
            let prepared = self.prepare(source).await?;
            let outcome = self.write(prepared).await?;
            report.sources.push(outcome);
            Ok::<(), RefreshError>(())
        }
        .await;
        self.finish(report, result)
    }

    async fn run_sequential(&self, report: &mut RefreshReport) -> Result<(), RefreshError> {
        report.deleted = self
            .store
            .delete_all()
            .await
            .map_err(|source| RefreshError::Sink {
                county: None,
                source,
            })?;
        tracing::info!(deleted = report.deleted, "cleared previous snapshot");

        for source in self.registry.sources() {
            let prepared = self.prepare(source).await?;
            report.sources.push(self.write(prepared).await?);
        }
        Ok(())
    }

    async fn run_staged(&self, report: &mut RefreshReport) -> Result<(), RefreshError> {
        let mut ready = Vec::with_capacity(self.registry.len());
        let mut failures = Vec::new();
        for source in self.registry.sources() {
            match self.prepare(source).await {
                Ok(prepared) => ready.push(prepared),
                Err(e) => failures.extend(e.failure()),
            }
        }
        if !failures.is_empty() {
            return Err(RefreshError::Staged { failures });
        }

        report.deleted = self
            .store
            .delete_all()
            .await
            .map_err(|source| RefreshError::Sink {
                county: None,
                source,
            })?;
        tracing::info!(deleted = report.deleted, "cleared previous snapshot");

        for prepared in ready {
            report.sources.push(self.write(prepared).await?);
        }
        Ok(())
    }

    /// Fetch, extract, parse, and normalize one source.
    #[tracing::instrument(skip_all, fields(county = %source.county))]
    async fn prepare(&self, source: &Source) -> Result<Prepared, RefreshError> {
        let county = source.county.clone();

        let raw = self.fetcher.fetch(source).await.map_err(|e| {
            if matches!(e, FetchError::ElementNotFound { .. }) {
                tracing::error!(kind = e.kind(), error = %e, "selector matched nothing; source definition needs updating");
            } else {
                tracing::error!(kind = e.kind(), retryable = e.is_retryable(), error = %e, "fetch failed");
            }
            RefreshError::Fetch {
                county: county.clone(),
                source: e,
            }
        })?;

        let data = extract_blocking(raw, source.form).await.map_err(|e| {
            tracing::error!(error = %e, "extraction failed");
            RefreshError::Extract {
                county: county.clone(),
                source: e,
            }
        })?;

        let raws = source.parser.parse(&source.county, &data);
        let parsed = raws.len();
        if parsed == 0 {
            tracing::warn!(parser = source.parser.name(), "parser matched no records");
        }
        let records = normalize_batch(raws);
        tracing::debug!(parsed, normalized = records.len(), "source prepared");

        Ok(Prepared {
            county,
            parsed,
            records,
        })
    }

    async fn write(&self, prepared: Prepared) -> Result<SourceOutcome, RefreshError> {
        let upserted = self.store.upsert(&prepared.records).await.map_err(|e| {
            tracing::error!(county = %prepared.county, error = %e, "upsert failed");
            RefreshError::Sink {
                county: Some(prepared.county.clone()),
                source: e,
            }
        })?;
        tracing::info!(county = %prepared.county, parsed = prepared.parsed, upserted, "source refreshed");
        Ok(SourceOutcome {
            county: prepared.county,
            parsed: prepared.parsed,
            upserted,
        })
    }

    fn finish(
        &self,
        mut report: RefreshReport,
        result: Result<(), RefreshError>,
    ) -> Result<RefreshReport, RefreshError> {
        report.finished_at = Utc::now();
        let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();

        let (success, message) = match &result {
            Ok(()) => {
                tracing::info!(
                    run_id = %report.run_id,
                    scope = %report.scope,
                    upserted = report.total_upserted(),
                    elapsed_ms,
                    "refresh complete"
                );
                (
                    true,
                    format!(
                        "{} complete: {} record(s) from {} source(s)",
                        report.scope,
                        report.total_upserted(),
                        report.sources.len()
                    ),
                )
            }
            Err(e) => {
                tracing::error!(run_id = %report.run_id, scope = %report.scope, error = %e, elapsed_ms, "refresh failed");
                (false, format!("{} failed: {}", report.scope, e))
            }
        };

        *lock(&self.last_run) = Some(LastRun {
            success,
            message,
            report: report.clone(),
        });
        result.map(|()| report)
    }
}

fn new_report(guard: &RunGuard<'_>, scope: RunScope) -> RefreshReport {
    RefreshReport {
        run_id: guard.run_id,
        scope,
        started_at: guard.started_at,
        finished_at: guard.started_at,
        deleted: 0,
        sources: Vec::new(),
    }
}
