//! Core engine for an in-memory, coverage-tracked time-series cache.
//!
//! This crate provides the pieces that let a process fetch file-based
//! instrument time series for arbitrary time windows without ever re-reading
//! spans it already holds:
//!
//! - Canonical ticks and time ranges, with conversion from every supported
//!   native time encoding (`time` module).
//! - Interval bookkeeping of which spans of each product are already
//!   ingested (`coverage` module).
//! - A multi-format ingestion pipeline that locates, reads, projects, fills
//!   and merges Parquet and delimited text files (`ingest` and `formats`
//!   modules).
//! - An identity-stable, copy-on-write store of product instances with
//!   lazily computed derived fields (`store` module).
//! - A request orchestrator tying the three together (`orchestrator`
//!   module).
//!
//! Backends, the archive root and cache behaviour are configured through
//! the `config` module; filesystem access lives in `storage`.
#![deny(missing_docs)]
pub mod bundle;
pub mod config;
pub mod coverage;
pub mod formats;
pub mod helpers;
pub mod ingest;
pub mod orchestrator;
pub mod product;
pub mod storage;
pub mod store;
pub mod time;

#[cfg(test)]
mod test_util;

pub use product::ProductKey;
