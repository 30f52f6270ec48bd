use snafu::prelude::*;

use crate::product::ProductKey;

/// Errors returned by [`ProductStore`](crate::store::ProductStore) reads.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The field is neither stored nor registered as derived.
    #[snafu(display("Product {key} has no field {field:?}"))]
    UnknownField {
        /// Product.
        key: ProductKey,
        /// Requested field.
        field: String,
    },

    /// A derived field produced the wrong number of values.
    #[snafu(display(
        "Derived field {field:?} of {key} produced {len} values for {expected} timestamps"
    ))]
    DerivedLength {
        /// Product.
        key: ProductKey,
        /// Derived field.
        field: String,
        /// Values produced.
        len: usize,
        /// Number of timestamps.
        expected: usize,
    },

    /// An input of a derived field is not stored on the instance.
    #[snafu(display("Derived field {field:?} of {key} needs missing input {input:?}"))]
    DerivedInput {
        /// Product.
        key: ProductKey,
        /// Derived field.
        field: String,
        /// Missing input.
        input: String,
    },
}
