//! # Roster Harness
//!
//! Daily ingestion of county jail rosters published in incompatible
//! formats (free-text PDF, tabular PDF, pages rendered client-side), into
//! one normalized, queryable snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────────────────────────────────┐   ┌──────────┐
//! │ Scheduler │──▶│ Refresher                               │──▶│  SQLite  │
//! │  / HTTP   │   │ fetch → extract → parse → normalize     │   │ inmates  │
//! │  / CLI    │   │ (one source at a time, one run at once) │   │ counties │
//! └───────────┘   └─────────────────────────────────────────┘   └──────────┘
//! ```
//!
//! Runtime-free pieces (record types, parsers, normalization, the store
//! trait) live in the `roster-core` crate.
//!
//! ## Quick Start
//!
//! ```bash
//! roster init                  # create database, seed counties
//! roster sources               # show configured sources
//! roster refresh               # full refresh now
//! roster refresh --county vilas
//! roster serve --schedule      # HTTP triggers + daily 08:00 refresh
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fetch`] | Direct and browser document acquisition |
//! | [`browser`] | Headless Chromium sessions |
//! | [`extract`] | PDF text and table extraction |
//! | [`refresh`] | Refresh orchestration |
//! | [`scheduler`] | Daily refresh timer |
//! | [`server`] | HTTP trigger server |
//! | [`sqlite_store`] | SQLite store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod browser;
pub mod config;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod migrate;
pub mod refresh;
pub mod scheduler;
pub mod server;
pub mod sources;
pub mod sqlite_store;
