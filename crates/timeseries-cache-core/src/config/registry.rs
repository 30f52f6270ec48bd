//! Product key to backend descriptor mapping.

use std::{collections::BTreeMap, sync::Arc};

use snafu::prelude::*;

use crate::{
    config::{BackendConfig, BackendDescriptor, ConfigError, ProductSnafu, UnknownProductSnafu},
    product::ProductKey,
};

/// Resolves product keys to their validated backend descriptors.
///
/// Descriptors are shared behind `Arc`, so a resolved descriptor stays valid
/// for the duration of a pipeline run even if the registry is rebuilt.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<ProductKey, Arc<BackendDescriptor>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration-form descriptors, validating each.
    pub fn from_configs<I>(configs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (ProductKey, BackendConfig)>,
    {
        let mut registry = Self::new();
        for (key, config) in configs {
            let descriptor =
                BackendDescriptor::try_from(config).context(ProductSnafu { key: key.clone() })?;
            registry.insert(key, descriptor);
        }
        Ok(registry)
    }

    /// Register (or replace) the backend for `key`.
    pub fn insert(&mut self, key: impl Into<ProductKey>, descriptor: BackendDescriptor) {
        self.backends.insert(key.into(), Arc::new(descriptor));
    }

    /// Look up the backend for `key`.
    pub fn resolve(&self, key: &ProductKey) -> Result<Arc<BackendDescriptor>, ConfigError> {
        self.backends
            .get(key)
            .cloned()
            .context(UnknownProductSnafu { key: key.clone() })
    }

    /// Registered product keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &ProductKey> {
        self.backends.keys()
    }

    /// Number of registered products.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True if no product is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
