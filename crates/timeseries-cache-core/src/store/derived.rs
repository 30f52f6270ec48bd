//! Derived fields: values computed from an instance's stored fields.
//!
//! The store only provides the mechanism. A derived field is computed the
//! first time it is viewed after an update and cached until the next one.

use std::{fmt, sync::Arc};

use crate::store::ProductInstance;

/// A field computed on demand from stored fields.
pub trait DerivedField: Send + Sync {
    /// Name the field is viewed under.
    fn name(&self) -> &str;

    /// Stored fields the computation reads.
    fn inputs(&self) -> &[String];

    /// Compute one value per row of `instance`.
    fn compute(&self, instance: &ProductInstance) -> Vec<f64>;
}

/// [`DerivedField`] backed by a closure.
///
/// ```
/// use timeseries_cache_core::store::{DerivedField, DerivedFn, ProductInstance};
///
/// let doubled = DerivedFn::new("x2", ["x"], |inst: &ProductInstance| -> Vec<f64> {
///     inst.field("x").unwrap_or_default().iter().map(|v| v * 2.0).collect()
/// });
/// assert_eq!(doubled.name(), "x2");
/// assert_eq!(doubled.inputs(), ["x".to_string()]);
/// ```
pub struct DerivedFn<F> {
    name: String,
    inputs: Vec<String>,
    compute: F,
}

impl<F> DerivedFn<F>
where
    F: Fn(&ProductInstance) -> Vec<f64> + Send + Sync,
{
    /// Wrap `compute` as a derived field named `name`.
    pub fn new<I, S>(name: impl Into<String>, inputs: I, compute: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            compute,
        }
    }
}

impl<F> DerivedField for DerivedFn<F>
where
    F: Fn(&ProductInstance) -> Vec<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn compute(&self, instance: &ProductInstance) -> Vec<f64> {
        (self.compute)(instance)
    }
}

impl<F> fmt::Debug for DerivedFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedFn")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// A registered derived field and its cached values.
pub(crate) struct DerivedSlot {
    pub(crate) field: Arc<dyn DerivedField>,
    /// Values and the snapshot version they were computed from.
    pub(crate) cached: Option<(u64, Arc<[f64]>)>,
}

impl DerivedSlot {
    pub(crate) fn new(field: Arc<dyn DerivedField>) -> Self {
        Self {
            field,
            cached: None,
        }
    }

    /// Cached values if they were computed from snapshot `version`.
    pub(crate) fn fresh(&self, version: u64) -> Option<Arc<[f64]>> {
        match &self.cached {
            Some((v, values)) if *v == version => Some(Arc::clone(values)),
            _ => None,
        }
    }

    /// Cache `values` for `version` unless newer values are already cached.
    pub(crate) fn remember(&mut self, version: u64, values: Arc<[f64]>) {
        if self.cached.as_ref().is_none_or(|(cached, _)| *cached <= version) {
            self.cached = Some((version, values));
        }
    }
}

impl fmt::Debug for DerivedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedSlot")
            .field("name", &self.field.name())
            .field("cached_version", &self.cached.as_ref().map(|(v, _)| *v))
            .finish()
    }
}
