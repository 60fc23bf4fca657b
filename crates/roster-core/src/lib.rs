//! # Roster Harness Core
//!
//! Runtime-free logic for Roster Harness: record types, source
//! definitions, the per-source record parsers, name normalization and
//! identity, the error taxonomy, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, browser, or PDF
//! dependencies. Everything that touches the network or the disk lives in
//! the `roster-harness` crate.

pub mod counties;
pub mod error;
pub mod models;
pub mod normalize;
pub mod parse;
pub mod source;
pub mod store;

pub use error::{ExtractError, FetchError, SinkError};
pub use models::{IntermediateData, NormalizedRecord, RawDocument, RawRecord, TablePage};
pub use source::{Acquisition, IntermediateForm, ParseStrategy, Source, SourceRegistry};
