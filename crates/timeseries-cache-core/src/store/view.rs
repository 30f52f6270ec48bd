use std::{ops::Range, sync::Arc};

use crate::{store::ProductHandle, time::Tick};

/// Read-only window onto one field of a product snapshot.
///
/// The view shares the snapshot's arrays, so it stays valid (and unchanged)
/// after later updates. [`FieldView::is_stale`] reports whether a newer
/// snapshot has been published since.
#[derive(Debug, Clone)]
pub struct FieldView {
    pub(crate) name: String,
    pub(crate) times: Arc<[Tick]>,
    pub(crate) values: Arc<[f64]>,
    pub(crate) rows: Range<usize>,
    pub(crate) version: u64,
    pub(crate) derived: bool,
    pub(crate) handle: Arc<ProductHandle>,
}

impl FieldView {
    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Timestamps of the viewed rows.
    pub fn times(&self) -> &[Tick] {
        &self.times[self.rows.clone()]
    }

    /// Values of the viewed rows.
    pub fn values(&self) -> &[f64] {
        &self.values[self.rows.clone()]
    }

    /// Number of viewed rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no row is viewed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Version of the snapshot the view was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True for derived fields.
    pub fn is_derived(&self) -> bool {
        self.derived
    }

    /// True once the product has been updated past this view's snapshot.
    pub fn is_stale(&self) -> bool {
        self.handle.version() != self.version
    }
}
