//! # timeseries-cache
//!
//! In-memory, coverage-tracked cache for file-based instrument time series.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,no_run
//! use timeseries_cache::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(std::path::Path::new("cache.json")).await?;
//! let cache = RequestOrchestrator::from_settings(&settings);
//!
//! let key = ProductKey::new("omni");
//! cache.ensure(&key, TimeRange::parse("2020-01-01", "2020-01-04")?).await?;
//! let bz = cache.store().view(&key, "bz", None)?;
//! println!("{} samples", bz.len());
//! # Ok(())
//! # }
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Coverage namespace (wrapper-only).
pub mod coverage {
    pub use timeseries_cache_core::coverage::{CoverageSet, CoverageTracker};
}

/// Time namespace (wrapper-only).
pub mod time {
    pub use timeseries_cache_core::time::{
        NativeTime, Tick, TimeEncoding, TimeParseError, TimeRange, datetime_from_tick, denormalize,
        normalize, tick_from_datetime,
    };
}

pub use timeseries_cache_core::ProductKey;
pub use timeseries_cache_core::bundle::{BundleError, RecordBundle};
pub use timeseries_cache_core::config::{
    BackendConfig, BackendDescriptor, BackendFormat, BackendRegistry, CacheConfig, ConfigError,
    FetchStrategy, RecordPolicy, Settings,
};
pub use timeseries_cache_core::ingest::{
    Degradation, ErrorKind, Ingest, IngestOutcome, IngestionPipeline, PipelineError,
};
pub use timeseries_cache_core::orchestrator::{EnsureOutcome, RequestOrchestrator};
pub use timeseries_cache_core::storage::DataLocation;
pub use timeseries_cache_core::store::{
    DerivedField, DerivedFn, FieldView, ProductHandle, ProductInstance, ProductStore, StoreError,
    UpdateSummary,
};
