//! Product instance store.
//!
//! The store keeps exactly one [`ProductHandle`] per product key for its
//! whole lifetime. A handle publishes immutable [`ProductInstance`]
//! snapshots: readers load the current snapshot without locking, and an
//! update builds the merged snapshot completely before swapping it in.
//! Writers to the same handle are serialised; readers holding an older
//! snapshot keep a consistent view of it.
//!
//! Derived fields registered on a handle are computed lazily from the
//! current snapshot and cached until the next update.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use arc_swap::ArcSwap;
use log::debug;
use snafu::prelude::*;

use crate::{bundle::RecordBundle, product::ProductKey, time::TimeRange};

mod derived;
mod error;
mod instance;
mod view;

pub use derived::{DerivedField, DerivedFn};
pub use error::StoreError;
pub use instance::ProductInstance;
pub use view::FieldView;

use derived::DerivedSlot;
use error::{DerivedInputSnafu, DerivedLengthSnafu, UnknownFieldSnafu};

/// What an update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Version of the published snapshot.
    pub version: u64,
    /// Rows in the published snapshot.
    pub rows: usize,
    /// Rows taken from the bundle.
    pub added: usize,
    /// Stored rows replaced by bundle rows with the same timestamp.
    pub replaced: usize,
}

/// The identity-stable home of one product's data.
pub struct ProductHandle {
    key: ProductKey,
    current: ArcSwap<ProductInstance>,
    writer: Mutex<()>,
    derived: Mutex<BTreeMap<String, DerivedSlot>>,
}

impl ProductHandle {
    fn new(key: ProductKey) -> Self {
        Self {
            key,
            current: ArcSwap::from_pointee(ProductInstance::default()),
            writer: Mutex::new(()),
            derived: Mutex::new(BTreeMap::new()),
        }
    }

    /// Product key of this handle.
    pub fn key(&self) -> &ProductKey {
        &self.key
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<ProductInstance> {
        self.current.load_full()
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    /// Merge `bundle` into the product and publish the result.
    pub fn update(&self, bundle: RecordBundle) -> UpdateSummary {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.current.load_full();
        let (next, stats) = current.merged(bundle);
        let summary = UpdateSummary {
            version: next.version(),
            rows: next.len(),
            added: stats.added,
            replaced: stats.replaced,
        };
        self.current.store(Arc::new(next));

        debug!(
            "Published {} v{}: {} row(s), {} added, {} replaced",
            self.key, summary.version, summary.rows, summary.added, summary.replaced
        );
        summary
    }

    /// Register (or replace) a derived field.
    pub fn register_derived(&self, field: Arc<dyn DerivedField>) {
        let mut derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        derived.insert(field.name().to_string(), DerivedSlot::new(field));
    }

    /// Names of the registered derived fields, sorted.
    pub fn derived_names(&self) -> Vec<String> {
        let derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        derived.keys().cloned().collect()
    }

    /// Whether the derived field `name` must be recomputed before its next
    /// view.
    pub fn derived_is_stale(&self, name: &str) -> Result<bool, StoreError> {
        let version = self.version();
        let derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = derived.get(name).context(UnknownFieldSnafu {
            key: self.key.clone(),
            field: name,
        })?;
        Ok(slot.fresh(version).is_none())
    }

    /// View `field`, restricted to `range` when given.
    ///
    /// Stored fields take precedence over derived fields of the same name.
    pub fn view(
        self: &Arc<Self>,
        field: &str,
        range: Option<TimeRange>,
    ) -> Result<FieldView, StoreError> {
        let snapshot = self.snapshot();
        let rows = snapshot.rows_in(range);

        if let Some(values) = snapshot.field_arc(field) {
            return Ok(FieldView {
                name: field.to_string(),
                times: snapshot.times_arc(),
                values,
                rows,
                version: snapshot.version(),
                derived: false,
                handle: Arc::clone(self),
            });
        }

        let values = self.derived_values(&snapshot, field)?;
        Ok(FieldView {
            name: field.to_string(),
            times: snapshot.times_arc(),
            values,
            rows,
            version: snapshot.version(),
            derived: true,
            handle: Arc::clone(self),
        })
    }

    fn derived_values(&self, snapshot: &ProductInstance, name: &str) -> Result<Arc<[f64]>, StoreError> {
        let mut derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = derived.get_mut(name).context(UnknownFieldSnafu {
            key: self.key.clone(),
            field: name,
        })?;

        if let Some(values) = slot.fresh(snapshot.version()) {
            return Ok(values);
        }

        if let Some(input) = slot
            .field
            .inputs()
            .iter()
            .find(|input| snapshot.field(input).is_none())
        {
            return DerivedInputSnafu {
                key: self.key.clone(),
                field: name,
                input: input.as_str(),
            }
            .fail();
        }

        let values = slot.field.compute(snapshot);
        ensure!(
            values.len() == snapshot.len(),
            DerivedLengthSnafu {
                key: self.key.clone(),
                field: name,
                len: values.len(),
                expected: snapshot.len(),
            }
        );

        debug!("Computed derived {}.{name} for v{}", self.key, snapshot.version());
        let values: Arc<[f64]> = Arc::from(values);
        slot.remember(snapshot.version(), Arc::clone(&values));
        Ok(values)
    }
}

impl fmt::Debug for ProductHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductHandle")
            .field("key", &self.key)
            .field("version", &self.version())
            .field("rows", &self.current.load().len())
            .finish_non_exhaustive()
    }
}

/// All product handles of a process, keyed by product.
#[derive(Debug, Default)]
pub struct ProductStore {
    handles: RwLock<HashMap<ProductKey, Arc<ProductHandle>>>,
}

impl ProductStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for `key`, creating an empty one on first use.
    ///
    /// The same `Arc` is returned for a key on every call.
    pub fn grab(&self, key: &ProductKey) -> Arc<ProductHandle> {
        {
            let handles = self.handles.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = handles.get(key) {
                return Arc::clone(handle);
            }
        }
        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            handles
                .entry(key.clone())
                .or_insert_with(|| Arc::new(ProductHandle::new(key.clone()))),
        )
    }

    /// Merge `bundle` into `key`'s instance.
    pub fn update(&self, key: &ProductKey, bundle: RecordBundle) -> UpdateSummary {
        self.grab(key).update(bundle)
    }

    /// View one field of `key`, optionally restricted to `range`.
    pub fn view(
        &self,
        key: &ProductKey,
        field: &str,
        range: Option<TimeRange>,
    ) -> Result<FieldView, StoreError> {
        self.grab(key).view(field, range)
    }

    /// Register a derived field on `key`.
    pub fn register_derived(&self, key: &ProductKey, field: Arc<dyn DerivedField>) {
        self.grab(key).register_derived(field);
    }

    /// Whether `key`'s derived field `name` is stale.
    pub fn derived_status(&self, key: &ProductKey, name: &str) -> Result<bool, StoreError> {
        self.grab(key).derived_is_stale(name)
    }

    /// Keys with a handle, sorted.
    pub fn keys(&self) -> Vec<ProductKey> {
        let handles = self.handles.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = handles.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of handles.
    pub fn len(&self) -> usize {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if no handle was created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
