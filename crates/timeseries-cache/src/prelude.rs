//! Wrapper prelude.
//!
//! The `timeseries-cache` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::coverage;
pub use crate::time::{Tick, TimeEncoding, TimeRange};
pub use crate::{
    BackendRegistry, CacheConfig, DataLocation, Degradation, DerivedField, DerivedFn,
    EnsureOutcome, ErrorKind, FieldView, FetchStrategy, Ingest, IngestionPipeline,
    PipelineError, ProductKey, ProductStore, RecordBundle, RecordPolicy, RequestOrchestrator,
    Settings, StoreError,
};
