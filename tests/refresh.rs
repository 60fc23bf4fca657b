mod common;

use std::sync::Arc;

use async_trait::async_trait;

use common::{listing, registry, text_pdf, GatedFetcher, ScriptedFetcher};
use roster_core::store::memory::InMemoryStore;
use roster_core::store::{CountyRow, RosterPage, RosterQuery, RosterStore};
use roster_core::{
    Acquisition, FetchError, IntermediateForm, NormalizedRecord, ParseStrategy, RawDocument,
    RawRecord, SinkError, Source, SourceRegistry,
};
use roster_harness::config::RefreshMode;
use roster_harness::refresh::{RefreshError, Refresher, RunScope, Stage};

fn network_error(county: &str) -> FetchError {
    FetchError::Network {
        url: format!("http://localhost/{}", county.to_lowercase()),
        message: "connection reset".to_string(),
    }
}

fn four_sources(fetcher: &ScriptedFetcher) {
    fetcher.set("Alpha", Ok(listing("Alpha", &["Doe, John", "Roe, Jane Q"])));
    fetcher.set("Bravo", Err(network_error("Bravo")));
    fetcher.set("Charlie", Ok(listing("Charlie", &["Poe, Edgar"])));
    fetcher.set("Delta", Ok(listing("Delta", &["Moe, Sam"])));
}

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let old = roster_core::normalize::normalize_batch(vec![RawRecord::new(
        "Alpha", "Stale", "Record", "",
    )]);
    store.upsert(&old).await.unwrap();
    store
}

fn refresher(
    registry: SourceRegistry,
    fetcher: Arc<ScriptedFetcher>,
    store: Arc<InMemoryStore>,
    mode: RefreshMode,
) -> Refresher {
    Refresher::new(registry, fetcher, store, mode)
}

#[tokio::test]
async fn sequential_refresh_stops_at_first_failure() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    let store = seeded_store().await;
    let refresher = refresher(
        registry(&["Alpha", "Bravo", "Charlie", "Delta"]),
        fetcher.clone(),
        store.clone(),
        RefreshMode::Sequential,
    );

    let err = refresher.refresh_all().await.unwrap_err();
    assert!(
        matches!(&err, RefreshError::Fetch { county, .. } if county == "Bravo"),
        "{:?}",
        err
    );

    // Only the first source's records survive; the old snapshot is gone.
    let ids: Vec<String> = store.snapshot().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["alpha-doe-john", "alpha-roe-jane"]);
    assert_eq!(fetcher.calls(), vec!["Alpha", "Bravo"]);

    let last = refresher.status().last_run.unwrap();
    assert!(!last.success);
    assert!(last.message.contains("Bravo"));
    assert_eq!(last.report.deleted, 1);
}

#[tokio::test]
async fn sequential_refresh_replaces_snapshot() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    fetcher.set("Bravo", Ok(listing("Bravo", &["Smith, Anna"])));
    let store = seeded_store().await;
    let refresher = refresher(
        registry(&["Alpha", "Bravo", "Charlie", "Delta"]),
        fetcher.clone(),
        store.clone(),
        RefreshMode::Sequential,
    );

    let report = refresher.refresh_all().await.unwrap();
    assert_eq!(report.scope, RunScope::Full);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.total_upserted(), 5);
    let order: Vec<&str> = report.sources.iter().map(|s| s.county.as_str()).collect();
    assert_eq!(order, vec!["Alpha", "Bravo", "Charlie", "Delta"]);
    assert_eq!(store.snapshot().len(), 5);
    assert!(refresher.status().last_run.unwrap().success);
}

#[tokio::test]
async fn staged_refresh_failure_leaves_snapshot_untouched() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    fetcher.set("Delta", Ok(RawDocument::Bytes {
        url: "http://localhost/delta".into(),
        bytes: b"not a listing".to_vec(),
    }));
    let store = seeded_store().await;
    let before = store.snapshot();
    let refresher = refresher(
        registry(&["Alpha", "Bravo", "Charlie", "Delta"]),
        fetcher.clone(),
        store.clone(),
        RefreshMode::Staged,
    );

    let err = refresher.refresh_all().await.unwrap_err();
    let RefreshError::Staged { failures } = err else {
        panic!("expected staged failure, got {:?}", err);
    };
    let summary: Vec<(&str, Stage)> = failures
        .iter()
        .map(|f| (f.county.as_str(), f.stage))
        .collect();
    assert_eq!(summary, vec![("Bravo", Stage::Fetch), ("Delta", Stage::Extract)]);

    // Every source was attempted, nothing was written.
    assert_eq!(fetcher.calls().len(), 4);
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn staged_refresh_commits_when_all_succeed() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    fetcher.set("Bravo", Ok(listing("Bravo", &["Smith, Anna"])));
    let store = seeded_store().await;
    let refresher = refresher(
        registry(&["Alpha", "Bravo", "Charlie", "Delta"]),
        fetcher,
        store.clone(),
        RefreshMode::Staged,
    );

    let report = refresher.refresh_all().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(store.snapshot().len(), 5);
    assert!(store.snapshot().iter().all(|r| r.last_name != "Stale"));
}

#[tokio::test]
async fn unknown_county_is_rejected_before_any_work() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    let store = seeded_store().await;
    let before = store.snapshot();
    let refresher = refresher(
        registry(&["Alpha", "Bravo"]),
        fetcher.clone(),
        store.clone(),
        RefreshMode::Sequential,
    );

    let err = refresher.refresh_one("NotACounty").await.unwrap_err();
    assert_eq!(err, RefreshError::InvalidSource("NotACounty".to_string()));
    assert!(fetcher.calls().is_empty());
    assert_eq!(store.snapshot(), before);
    assert!(refresher.status().last_run.is_none());
}

#[tokio::test]
async fn single_refresh_keeps_other_counties() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    let store = seeded_store().await;
    let refresher = refresher(
        registry(&["Alpha", "Bravo", "Charlie"]),
        fetcher.clone(),
        store.clone(),
        RefreshMode::Sequential,
    );

    let report = refresher.refresh_one(" charlie ").await.unwrap();
    assert_eq!(report.scope, RunScope::Single("Charlie".to_string()));
    assert_eq!(report.deleted, 0);
    assert_eq!(fetcher.calls(), vec!["Charlie"]);
    assert_eq!(store.count_for("Alpha"), 1);
    assert_eq!(store.count_for("Charlie"), 1);
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.set("Alpha", Ok(listing("Alpha", &["Doe, John", "DOE, JOHN", "Roe, Jane"])));
    let store = Arc::new(InMemoryStore::new());
    let refresher = refresher(
        registry(&["Alpha"]),
        fetcher,
        store.clone(),
        RefreshMode::Sequential,
    );

    let first = refresher.refresh_one("Alpha").await.unwrap();
    let snapshot = store.snapshot();
    refresher.refresh_one("Alpha").await.unwrap();
    assert_eq!(store.snapshot(), snapshot);
    assert_eq!(first.sources[0].parsed, 3);
    assert_eq!(first.sources[0].upserted, 2);
}

#[tokio::test]
async fn zero_matches_is_not_a_failure() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.set("Alpha", Ok(listing("Alpha", &["Inmate Roster", "Updated daily"])));
    let store = Arc::new(InMemoryStore::new());
    let refresher = refresher(
        registry(&["Alpha"]),
        fetcher,
        store.clone(),
        RefreshMode::Sequential,
    );

    let report = refresher.refresh_all().await.unwrap();
    assert_eq!(report.sources[0].parsed, 0);
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn labeled_field_source_end_to_end() {
    let vilas = Source {
        county: "Vilas".to_string(),
        acquisition: Acquisition::Direct {
            url: "http://localhost/vilas.pdf".to_string(),
        },
        form: IntermediateForm::PlainText,
        parser: ParseStrategy::LabeledField {
            label: "Name:".to_string(),
        },
    };
    let fetcher = Arc::new(ScriptedFetcher::new().respond(
        "Vilas",
        Ok(RawDocument::Bytes {
            url: "http://localhost/vilas.pdf".to_string(),
            bytes: text_pdf(&["Booking 1123 Name: Doe, John Age: 41"]),
        }),
    ));
    let store = Arc::new(InMemoryStore::new());
    let refresher = Refresher::new(
        SourceRegistry::new(vec![vilas]).unwrap(),
        fetcher,
        store.clone(),
        RefreshMode::Sequential,
    );

    refresher.refresh_one("Vilas").await.unwrap();
    let records = store.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "vilas-doe-john");
    assert_eq!(records[0].last_name, "Doe");
    assert_eq!(records[0].first_name, "John");
}

#[tokio::test]
async fn grid_source_end_to_end() {
    let waukesha = Source {
        county: "Waukesha".to_string(),
        acquisition: Acquisition::Direct {
            url: "http://localhost/waukesha.pdf".to_string(),
        },
        form: IntermediateForm::TableGrid,
        parser: ParseStrategy::GridRows,
    };
    let stream = "BT /F1 10 Tf \
        1 0 0 1 72 700 Tm (smith\\n) Tj \
        1 0 0 1 200 700 Tm (jane\\n) Tj \
        1 0 0 1 320 700 Tm (Cell Block 3) Tj \
        ET";
    let fetcher = Arc::new(ScriptedFetcher::new().respond(
        "Waukesha",
        Ok(RawDocument::Bytes {
            url: "http://localhost/waukesha.pdf".to_string(),
            bytes: common::pdf_with_content(stream),
        }),
    ));
    let store = Arc::new(InMemoryStore::new());
    let refresher = Refresher::new(
        SourceRegistry::new(vec![waukesha]).unwrap(),
        fetcher,
        store.clone(),
        RefreshMode::Sequential,
    );

    refresher.refresh_all().await.unwrap();
    let records = store.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].last_name, "Smith");
    assert_eq!(records[0].first_name, "Jane");
    assert_eq!(records[0].id, "waukesha-smith-jane");
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let fetcher = Arc::new(GatedFetcher::new());
    let entered = fetcher.entered.clone();
    let release = fetcher.release.clone();
    let refresher = Arc::new(Refresher::new(
        registry(&["Alpha"]),
        fetcher,
        Arc::new(InMemoryStore::new()),
        RefreshMode::Sequential,
    ));

    let running = {
        let refresher = refresher.clone();
        tokio::spawn(async move { refresher.refresh_all().await })
    };
    entered.notified().await;

    assert!(refresher.status().running);
    assert_eq!(
        refresher.refresh_one("Alpha").await.unwrap_err(),
        RefreshError::AlreadyRunning(RunScope::Full)
    );
    assert_eq!(
        refresher.refresh_all().await.unwrap_err(),
        RefreshError::AlreadyRunning(RunScope::Full)
    );

    release.notify_one();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.total_upserted(), 1);

    let status = refresher.status();
    assert!(!status.running);
    assert!(status.last_run.unwrap().success);
}

/// Accepts deletes, fails every upsert.
struct BrokenStore;

#[async_trait]
impl RosterStore for BrokenStore {
    async fn upsert(&self, _records: &[NormalizedRecord]) -> Result<usize, SinkError> {
        Err(SinkError::WriteFailed("disk full".to_string()))
    }
    async fn delete_all(&self) -> Result<u64, SinkError> {
        Ok(0)
    }
    async fn list_county(&self, _query: &RosterQuery) -> Result<RosterPage, SinkError> {
        Err(SinkError::ReadFailed("unavailable".to_string()))
    }
    async fn counties(&self) -> Result<Vec<CountyRow>, SinkError> {
        Ok(Vec::new())
    }
    async fn init_counties(&self, _names: &[&str]) -> Result<usize, SinkError> {
        Ok(0)
    }
}

#[tokio::test]
async fn store_failure_is_reported_with_county() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    let refresher = Refresher::new(
        registry(&["Alpha", "Charlie"]),
        fetcher.clone(),
        Arc::new(BrokenStore),
        RefreshMode::Sequential,
    );

    let err = refresher.refresh_all().await.unwrap_err();
    assert_eq!(
        err,
        RefreshError::Sink {
            county: Some("Alpha".to_string()),
            source: SinkError::WriteFailed("disk full".to_string()),
        }
    );
    assert_eq!(err.to_string(), "Alpha: store write failed: disk full");
    assert_eq!(fetcher.calls(), vec!["Alpha"]);
}

#[tokio::test]
async fn missing_element_aborts_sequential_refresh() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    four_sources(&fetcher);
    fetcher.set(
        "Bravo",
        Err(FetchError::ElementNotFound {
            url: "http://localhost/bravo".to_string(),
            selector: "li.inmate".to_string(),
        }),
    );
    let store = seeded_store().await;
    let refresher = refresher(
        registry(&["Alpha", "Bravo", "Charlie", "Delta"]),
        fetcher.clone(),
        store.clone(),
        RefreshMode::Sequential,
    );

    let err = refresher.refresh_all().await.unwrap_err();
    let RefreshError::Fetch { county, source } = &err else {
        panic!("expected fetch failure, got {:?}", err);
    };
    assert_eq!(county, "Bravo");
    assert_eq!(source.kind(), "element_not_found");
    assert!(!source.is_retryable());

    // Charlie and Delta were never attempted.
    assert_eq!(fetcher.calls(), vec!["Alpha", "Bravo"]);
    assert_eq!(store.count_for("Charlie"), 0);
    assert_eq!(store.count_for("Alpha"), 2);
}

#[tokio::test]
async fn timeout_fails_single_refresh() {
    let fetcher = Arc::new(ScriptedFetcher::new().respond(
        "Charlie",
        Err(FetchError::Timeout {
            url: "http://localhost/charlie".to_string(),
            secs: 60,
        }),
    ));
    let store = seeded_store().await;
    let before = store.snapshot();
    let refresher = refresher(
        registry(&["Alpha", "Charlie"]),
        fetcher,
        store.clone(),
        RefreshMode::Sequential,
    );

    let err = refresher.refresh_one("Charlie").await.unwrap_err();
    let RefreshError::Fetch { source, .. } = &err else {
        panic!("expected fetch failure, got {:?}", err);
    };
    assert_eq!(source.kind(), "timeout");
    assert!(source.is_retryable());
    assert_eq!(store.snapshot(), before);

    let last = refresher.status().last_run.unwrap();
    assert!(!last.success);
    assert!(last.message.contains("timed out"), "{}", last.message);
}
