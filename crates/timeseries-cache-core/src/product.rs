//! Product identity.

use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Opaque identifier of one instrument or derived data product
/// (for example `"wind_mfi_h0"` or `"wind_swe_fit"`).
///
/// Keys are immutable and cheap to clone; they are the sole lookup key of
/// the coverage tracker, the backend registry and the product store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductKey(Arc<str>);

impl ProductKey {
    /// Create a key from any string-like value.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ProductKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProductKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProductKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}
