use snafu::prelude::*;

use crate::{product::ProductKey, storage::StorageError};

/// Errors raised while loading or resolving backend configuration.
///
/// All of these are detected before any data file is touched: templates and
/// descriptors are validated when the registry is built, and product keys
/// are resolved once per request.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// No backend is registered under the requested key.
    #[snafu(display("No backend registered for product {key}"))]
    UnknownProduct {
        /// Key that failed to resolve.
        key: ProductKey,
    },

    /// The settings file could not be read.
    #[snafu(display("Failed to read settings: {source}"))]
    ReadConfig {
        /// Underlying storage error.
        #[snafu(source(from(StorageError, Box::new)))]
        source: Box<StorageError>,
    },

    /// The settings file is not valid JSON for the expected layout.
    #[snafu(display("Failed to parse settings JSON: {source}"))]
    ParseConfig {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A path template has unbalanced braces or an unknown placeholder.
    #[snafu(display("Invalid path template {template:?}: {detail}"))]
    InvalidTemplate {
        /// The offending template text.
        template: String,
        /// What is wrong with it.
        detail: String,
    },

    /// A descriptor is internally inconsistent.
    #[snafu(display("Invalid backend descriptor: {detail}"))]
    InvalidDescriptor {
        /// What is wrong with it.
        detail: String,
    },

    /// A descriptor failed validation; wraps the error with the product it
    /// belongs to.
    #[snafu(display("Product {key}: {source}"))]
    Product {
        /// Product whose descriptor is invalid.
        key: ProductKey,
        /// Underlying validation error.
        #[snafu(source(from(ConfigError, Box::new)))]
        source: Box<ConfigError>,
    },

    /// A caller requested a field the backend does not declare.
    #[snafu(display("Product {key} does not declare field {field:?}"))]
    UnknownField {
        /// Product that was requested.
        key: ProductKey,
        /// Undeclared field name.
        field: String,
    },
}
