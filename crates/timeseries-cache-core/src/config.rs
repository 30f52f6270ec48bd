//! Cache configuration and the backend registry.
//!
//! Settings are usually loaded from a JSON file:
//!
//! ```json
//! {
//!   "root": "/data/archive",
//!   "cache": { "tolerance_secs": 10, "max_concurrent_reads": 8 },
//!   "products": {
//!     "wind_mfi": {
//!       "kind": "binary_columnar",
//!       "path_template": "wind/mfi/{YYYY}/wi_h0_mfi_{YYYY}{MM}{DD}.parquet",
//!       "time_field": "epoch",
//!       "time_encoding": "tt2000",
//!       "fields": ["bgse_x", "bgse_y", "bgse_z"],
//!       "fill_sentinel": -1e31
//!     }
//!   }
//! }
//! ```
//!
//! Every descriptor is validated while the settings are loaded; a registry
//! that loads successfully never produces template or descriptor errors
//! later.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    product::ProductKey,
    storage::{self, DataLocation},
};

mod backend;
mod error;
mod registry;

pub use backend::{BackendConfig, BackendDescriptor, BackendFormat, BackendKind, DelimitedOptions};
pub use error::ConfigError;
pub(crate) use error::*;
pub use registry::BackendRegistry;

/// What the orchestrator records as covered after an ingest attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPolicy {
    /// Record the whole requested range after every completed attempt,
    /// including attempts that found no data. Missing files are never
    /// retried automatically.
    #[default]
    Always,
    /// Record only the time slots whose files were located; missing slots
    /// stay uncovered and are retried on the next request.
    LocatedOnly,
}

/// How much of an uncovered request the orchestrator fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Ingest the full requested range.
    #[default]
    FullRange,
    /// Ingest only the sub-ranges not yet covered.
    Remainder,
}

/// Tunables shared by the pipeline and the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Boundary jitter absorbed by coverage checks.
    #[serde(rename = "tolerance_secs", with = "duration_secs")]
    pub tolerance: Duration,
    /// Upper bound on reading and decoding one file.
    #[serde(rename = "file_timeout_secs", with = "duration_secs")]
    pub file_timeout: Duration,
    /// Files read concurrently within one pipeline run.
    pub max_concurrent_reads: usize,
    /// Coverage recording policy.
    pub record_policy: RecordPolicy,
    /// Fetch strategy for partially covered requests.
    pub fetch_strategy: FetchStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tolerance: Duration::from_secs(10),
            file_timeout: Duration::from_secs(30),
            max_concurrent_reads: 4,
            record_policy: RecordPolicy::Always,
            fetch_strategy: FetchStrategy::FullRange,
        }
    }
}

impl CacheConfig {
    /// Tolerance expressed in ticks (saturating).
    pub fn tolerance_ticks(&self) -> i64 {
        i64::try_from(self.tolerance.as_nanos()).unwrap_or(i64::MAX)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| de::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    root: PathBuf,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    products: BTreeMap<ProductKey, BackendConfig>,
}

/// Everything needed to build an orchestrator: archive root, tunables and
/// the validated backend registry.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Archive root the path templates are resolved against.
    pub root: DataLocation,
    /// Cache tunables.
    pub cache: CacheConfig,
    /// Backends by product key.
    pub registry: BackendRegistry,
}

impl Settings {
    /// Parse settings from JSON text. A relative `root` is kept as written.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: SettingsFile = serde_json::from_str(json).context(ParseConfigSnafu)?;
        Ok(Self {
            root: DataLocation::local(file.root),
            cache: file.cache,
            registry: BackendRegistry::from_configs(file.products)?,
        })
    }

    /// Load settings from a JSON file. A relative `root` is resolved against
    /// the directory containing the file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let location = DataLocation::local(dir);
        let name = path.file_name().map(Path::new).unwrap_or(path);

        let json = storage::read_to_string(&location, name)
            .await
            .context(ReadConfigSnafu)?;
        let mut settings = Self::from_json_str(&json)?;
        let DataLocation::Local(root) = &settings.root;
        settings.root = DataLocation::local(dir.join(root));
        Ok(settings)
    }
}
