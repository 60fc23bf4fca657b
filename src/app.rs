//! Wiring shared by the CLI commands and the server.

use std::sync::Arc;

use anyhow::Result;

use roster_core::store::RosterStore;

use crate::config::Config;
use crate::db;
use crate::fetch::Fetcher;
use crate::migrate;
use crate::refresh::Refresher;
use crate::sqlite_store::SqliteStore;

/// Open the configured database, creating the schema if needed.
pub async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

/// A refresher over the configured sources, live fetcher, and `store`.
pub fn build_refresher(config: &Config, store: Arc<dyn RosterStore>) -> Result<Arc<Refresher>> {
    let registry = config.registry()?;
    let fetcher = Arc::new(Fetcher::new(&config.fetch)?);
    Ok(Arc::new(Refresher::new(
        registry,
        fetcher,
        store,
        config.refresh.mode,
    )))
}
