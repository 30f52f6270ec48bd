//! Ingestion pipeline: turn a `(product, range)` request into a
//! [`RecordBundle`].
//!
//! A run resolves the product's backend, locates one file per time slot,
//! reads the located files concurrently (each bounded by a timeout), slices
//! each to the requested rows and fields, then concatenates and stably sorts
//! everything into one validated bundle.
//!
//! Problems with individual slots or files never abort a run; they are
//! reported as [`Degradation`] notices next to the bundle. The run fails
//! only for configuration errors, when nothing could be read, or when the
//! merged arrays are inconsistent.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use log::{debug, info, warn};
use snafu::prelude::*;
use tokio::time::timeout;

use crate::{
    bundle::RecordBundle,
    config::{BackendDescriptor, BackendKind, BackendRegistry, CacheConfig, Settings},
    formats::{FileDecode, FileSource, decode_file},
    product::ProductKey,
    storage::{self, DataLocation},
    time::TimeRange,
};

mod error;
mod extract;
mod locate;
mod merge;

pub use error::{Degradation, ErrorKind, FileReadError, PipelineError};
pub(crate) use error::*;

use extract::FileSlice;
use locate::{Located, LocatedFile, locate_files};

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Rows found inside the request, sorted by time.
    pub bundle: RecordBundle,
    /// Non-fatal problems met along the way, in discovery order.
    pub notices: Vec<Degradation>,
    /// Slots whose file was found and read (or skipped by the boundary
    /// pre-check), ascending.
    pub located_slots: Vec<TimeRange>,
}

impl IngestOutcome {
    /// True if some part of the request has no file behind it.
    pub fn is_partial(&self) -> bool {
        self.notices.iter().any(Degradation::is_partial_coverage)
    }
}

/// Something that can fetch a product's records for a time range.
///
/// The orchestrator depends on this seam rather than on the concrete
/// pipeline.
#[async_trait]
pub trait Ingest: Send + Sync {
    /// Fetch every declared field of `key` within `range`.
    async fn ingest(&self, key: &ProductKey, range: TimeRange) -> Result<IngestOutcome, PipelineError>;
}

/// File-backed implementation of [`Ingest`].
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    location: DataLocation,
    registry: Arc<BackendRegistry>,
    file_timeout: Duration,
    max_concurrent_reads: usize,
}

impl IngestionPipeline {
    /// Create a pipeline reading from `location`.
    pub fn new(location: DataLocation, registry: Arc<BackendRegistry>, config: &CacheConfig) -> Self {
        Self {
            location,
            registry,
            file_timeout: config.file_timeout,
            max_concurrent_reads: config.max_concurrent_reads.max(1),
        }
    }

    /// Create a pipeline from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.root.clone(),
            Arc::new(settings.registry.clone()),
            &settings.cache,
        )
    }

    /// Archive root the pipeline reads from.
    pub fn location(&self) -> &DataLocation {
        &self.location
    }

    /// Registry the pipeline resolves products with.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Fetch a subset of `key`'s fields within `range`.
    ///
    /// An empty `fields` list selects every declared field. Requesting a
    /// field the backend does not declare is a configuration error.
    pub async fn ingest_fields(
        &self,
        key: &ProductKey,
        range: TimeRange,
        fields: &[&str],
    ) -> Result<IngestOutcome, PipelineError> {
        let descriptor = self.registry.resolve(key).context(ConfigSnafu)?;
        let fields = descriptor.project(key, fields).context(ConfigSnafu)?;

        if range.is_empty() {
            return Ok(IngestOutcome {
                bundle: RecordBundle::empty(fields),
                notices: Vec::new(),
                located_slots: Vec::new(),
            });
        }

        let Located { files, mut notices } =
            locate_files(&self.location, key, &descriptor, range).await;
        if files.is_empty() {
            warn!("No files located for {key} in {range}");
            return NoDataFoundSnafu {
                key: key.clone(),
                range,
                notices,
            }
            .fail();
        }
        debug!("Located {} file(s) for {key} in {range}", files.len());

        // `buffered` keeps results in discovery order.
        let reads: Vec<_> = files
            .iter()
            .map(|file| self.read_file(&file.path, &descriptor, &fields, range))
            .collect();
        let results: Vec<Result<FileDecode, FileReadError>> = stream::iter(reads)
            .buffered(self.max_concurrent_reads)
            .collect()
            .await;

        let Gathered {
            slices,
            located_slots,
            failed,
        } = gather(
            &files,
            results,
            &fields,
            descriptor.fill_sentinel(),
            range,
            &mut notices,
        );

        if failed == files.len() {
            return NoDataFoundSnafu {
                key: key.clone(),
                range,
                notices,
            }
            .fail();
        }

        let bundle =
            merge::concat_and_sort(slices, &fields).context(InvariantSnafu { key: key.clone() })?;
        info!(
            "Ingested {} row(s) for {key} in {range} from {} file(s)",
            bundle.len(),
            files.len() - failed
        );

        Ok(IngestOutcome {
            bundle,
            notices,
            located_slots,
        })
    }

    async fn read_file(
        &self,
        path: &Path,
        descriptor: &Arc<BackendDescriptor>,
        fields: &[String],
        range: TimeRange,
    ) -> Result<FileDecode, FileReadError> {
        let work = async {
            let source = match descriptor.kind() {
                BackendKind::BinaryColumnar => storage::open_file(&self.location, path)
                    .await
                    .map(FileSource::File),
                BackendKind::DailyDelimited(_) => storage::read_all_bytes(&self.location, path)
                    .await
                    .map(FileSource::Bytes),
            }
            .context(StorageSnafu)?;
            let descriptor = Arc::clone(descriptor);
            let fields = fields.to_vec();
            tokio::task::spawn_blocking(move || decode_file(source, &descriptor, &fields, range))
                .await
                .context(TaskSnafu)?
        };

        bounded(self.file_timeout, work).await
    }
}

/// Per-file results folded into slices, readable slots and a failure count.
struct Gathered {
    slices: Vec<FileSlice>,
    located_slots: Vec<TimeRange>,
    failed: usize,
}

/// Fold `results` (in the same order as `files`) into slices, turning each
/// skip and failure into a notice.
fn gather(
    files: &[LocatedFile],
    results: Vec<Result<FileDecode, FileReadError>>,
    fields: &[String],
    sentinel: Option<f64>,
    range: TimeRange,
    notices: &mut Vec<Degradation>,
) -> Gathered {
    let mut out = Gathered {
        slices: Vec::with_capacity(files.len()),
        located_slots: Vec::with_capacity(files.len()),
        failed: 0,
    };

    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(FileDecode::Skipped { first, last }) => {
                debug!("Skipping {}: outside {range}", file.path.display());
                notices.push(Degradation::FileSkipped {
                    path: file.path.clone(),
                    first,
                    last,
                });
                out.located_slots.push(file.slot);
            }
            Ok(FileDecode::Decoded(decoded)) => {
                out.slices.push(extract::extract(
                    decoded, fields, sentinel, range, &file.path, notices,
                ));
                out.located_slots.push(file.slot);
            }
            Err(e) => {
                warn!("Failed to read {}: {e}", file.path.display());
                out.failed += 1;
                notices.push(Degradation::FileFailed {
                    slot: file.slot,
                    path: file.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    out
}

/// Run one file's read and decode under `limit`.
async fn bounded<F>(limit: Duration, work: F) -> Result<FileDecode, FileReadError>
where
    F: Future<Output = Result<FileDecode, FileReadError>>,
{
    match timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu { after: limit }.fail(),
    }
}

#[async_trait]
impl Ingest for IngestionPipeline {
    async fn ingest(&self, key: &ProductKey, range: TimeRange) -> Result<IngestOutcome, PipelineError> {
        self.ingest_fields(key, range, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{BackendConfig, BackendFormat},
        formats::{ColumnValues, DecodedFile},
        test_util::*,
        time::TimeEncoding,
    };
    use std::collections::BTreeMap;
    use arrow::array::{ArrayRef, Float32Array, Int64Array};
    use tempfile::TempDir;

    fn csv_backend(fields: &[&str]) -> BackendDescriptor {
        BackendDescriptor::try_from(BackendConfig {
            kind: BackendFormat::DailyDelimited,
            path_template: Some("omni/{YYYY}{MM}{DD}.csv".to_string()),
            path_templates: Vec::new(),
            time_field: "time".to_string(),
            time_encoding: TimeEncoding::Calendar,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            fill_sentinel: Some(-9999.0),
            block_hours: None,
            delimiter: None,
            comment: None,
        })
        .expect("valid descriptor")
    }

    fn pipeline(root: &Path, key: &str, descriptor: BackendDescriptor) -> IngestionPipeline {
        pipeline_with(root, key, descriptor, &CacheConfig::default())
    }

    fn pipeline_with(
        root: &Path,
        key: &str,
        descriptor: BackendDescriptor,
        config: &CacheConfig,
    ) -> IngestionPipeline {
        let mut registry = BackendRegistry::new();
        registry.insert(key, descriptor);
        IngestionPipeline::new(DataLocation::local(root), Arc::new(registry), config)
    }

    #[tokio::test]
    async fn reads_merges_and_reports_missing_day() -> TestResult {
        let tmp = TempDir::new()?;
        write_text(
            &tmp.path().join("omni/20200103.csv"),
            "time,np,vp\n2020-01-03T00:00:00,1,400\n2020-01-03T01:00:00,-9999,410\n",
        )?;
        write_text(
            &tmp.path().join("omni/20200101.csv"),
            "time,np\n2020-01-01T12:00:00,3\n2020-01-01T06:00:00,2\n",
        )?;

        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np", "vp"]));
        let out = pipeline
            .ingest(&ProductKey::new("omni"), range("2020-01-01", "2020-01-04"))
            .await?;

        assert_eq!(
            out.bundle.times(),
            &[
                tick("2020-01-01T06:00:00"),
                tick("2020-01-01T12:00:00"),
                tick("2020-01-03T00:00:00"),
                tick("2020-01-03T01:00:00"),
            ]
        );
        let np = out.bundle.field("np").ok_or("np missing")?;
        assert_eq!(&np[..3], &[2.0, 3.0, 1.0]);
        assert!(np[3].is_nan());
        let vp = out.bundle.field("vp").ok_or("vp missing")?;
        assert!(vp[0].is_nan() && vp[1].is_nan());
        assert_eq!(&vp[2..], &[400.0, 410.0]);

        assert!(out.is_partial());
        assert!(out.notices.iter().any(|n| matches!(
            n,
            Degradation::MissingFile { slot, .. } if *slot == day_range("2020-01-02")
        )));
        assert!(out.notices.iter().any(|n| matches!(
            n,
            Degradation::FieldMissing { field, .. } if field == "vp"
        )));
        assert_eq!(
            out.located_slots,
            vec![day_range("2020-01-01"), day_range("2020-01-03")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn subset_of_fields_and_unknown_field() -> TestResult {
        let tmp = TempDir::new()?;
        write_text(
            &tmp.path().join("omni/20200101.csv"),
            "time,np,vp\n2020-01-01T00:00:00,1,400\n",
        )?;
        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np", "vp"]));
        let key = ProductKey::new("omni");

        let out = pipeline
            .ingest_fields(&key, day_range("2020-01-01"), &["vp"])
            .await?;
        assert_eq!(out.bundle.fields().len(), 1);
        assert_eq!(out.bundle.field("vp"), Some(&[400.0][..]));

        let err = pipeline
            .ingest_fields(&key, day_range("2020-01-01"), &["bz"])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_product_is_config_error() -> TestResult {
        let tmp = TempDir::new()?;
        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np"]));
        let err = pipeline
            .ingest(&ProductKey::new("nope"), day_range("2020-01-01"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        Ok(())
    }

    #[tokio::test]
    async fn nothing_located_is_no_data_found() -> TestResult {
        let tmp = TempDir::new()?;
        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np"]));
        let err = pipeline
            .ingest(&ProductKey::new("omni"), range("2020-01-01", "2020-01-03"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDataFound);
        assert_eq!(err.notices().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn all_files_failing_is_no_data_found() -> TestResult {
        let tmp = TempDir::new()?;
        write_text(&tmp.path().join("omni/20200101.csv"), "when,np\n")?;
        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np"]));
        let err = pipeline
            .ingest(&ProductKey::new("omni"), day_range("2020-01-01"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDataFound);
        assert!(matches!(err.notices(), [Degradation::FileFailed { .. }]));
        Ok(())
    }

    #[tokio::test]
    async fn failed_file_degrades_when_others_succeed() -> TestResult {
        let tmp = TempDir::new()?;
        write_text(&tmp.path().join("omni/20200101.csv"), "when,np\n")?;
        write_text(
            &tmp.path().join("omni/20200102.csv"),
            "time,np\n2020-01-02T00:00:00,5\n",
        )?;
        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np"]));
        let out = pipeline
            .ingest(&ProductKey::new("omni"), range("2020-01-01", "2020-01-03"))
            .await?;
        assert_eq!(out.bundle.len(), 1);
        assert!(matches!(out.notices.as_slice(), [Degradation::FileFailed { .. }]));
        assert_eq!(out.located_slots, vec![day_range("2020-01-02")]);
        Ok(())
    }

    #[tokio::test]
    async fn skipped_file_yields_empty_bundle() -> TestResult {
        let tmp = TempDir::new()?;
        // Mislabelled file: named for Jan 1 but holding Jan 5 data.
        write_text(
            &tmp.path().join("omni/20200101.csv"),
            "time,np\n2020-01-05T00:00:00,5\n2020-01-05T01:00:00,6\n",
        )?;
        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np"]));
        let out = pipeline
            .ingest(&ProductKey::new("omni"), day_range("2020-01-01"))
            .await?;
        assert!(out.bundle.is_empty());
        assert_eq!(out.bundle.fields().len(), 1);
        assert!(matches!(out.notices.as_slice(), [Degradation::FileSkipped { .. }]));
        Ok(())
    }

    #[tokio::test]
    async fn parquet_backend_with_f32_sentinel() -> TestResult {
        let tmp = TempDir::new()?;
        let base = tt2000_at("2020-01-01T00:00:00");
        let batch = record_batch(vec![
            (
                "epoch",
                Arc::new(Int64Array::from(vec![base, base + 1_000_000_000, base + 2_000_000_000]))
                    as ArrayRef,
            ),
            (
                "bx",
                Arc::new(Float32Array::from(vec![1.0, -1e31, 3.0])) as ArrayRef,
            ),
        ])?;
        write_parquet(&tmp.path().join("mag/2020/mag_2020001.parquet"), &batch)?;

        let descriptor = BackendDescriptor::try_from(BackendConfig {
            kind: BackendFormat::BinaryColumnar,
            path_template: Some("mag/{YYYY}/mag_{YYYY}{DOY}.parquet".to_string()),
            path_templates: Vec::new(),
            time_field: "epoch".to_string(),
            time_encoding: TimeEncoding::Tt2000,
            fields: vec!["bx".to_string()],
            fill_sentinel: Some(-1e31),
            block_hours: None,
            delimiter: None,
            comment: None,
        })?;
        let pipeline = pipeline(tmp.path(), "mag", descriptor);
        let out = pipeline
            .ingest(
                &ProductKey::new("mag"),
                range("2020-01-01T00:00:01", "2020-01-02"),
            )
            .await?;

        assert_eq!(
            out.bundle.times(),
            &[tick("2020-01-01T00:00:01"), tick("2020-01-01T00:00:02")]
        );
        let bx = out.bundle.field("bx").ok_or("bx missing")?;
        assert!(bx[0].is_nan());
        assert_eq!(bx[1], 3.0);
        assert!(out.notices.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_range_reads_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let pipeline = pipeline(tmp.path(), "omni", csv_backend(&["np"]));
        let at = tick("2020-01-01");
        let out = pipeline
            .ingest(&ProductKey::new("omni"), TimeRange::new(at, at)?)
            .await?;
        assert!(out.bundle.is_empty());
        assert!(out.notices.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn stalled_read_times_out() {
        let limit = Duration::from_millis(20);
        let err = bounded(limit, std::future::pending()).await.unwrap_err();
        assert!(matches!(err, FileReadError::Timeout { after } if after == limit));

        let done = bounded(limit, async { Ok(FileDecode::Skipped { first: 0, last: 1 }) }).await;
        assert!(matches!(done, Ok(FileDecode::Skipped { .. })));
    }

    #[test]
    fn timed_out_file_degrades_while_others_fill_the_bundle() -> TestResult {
        let files = vec![
            LocatedFile {
                slot: day_range("2020-01-01"),
                path: "omni/20200101.csv".into(),
            },
            LocatedFile {
                slot: day_range("2020-01-02"),
                path: "omni/20200102.csv".into(),
            },
        ];
        let results = vec![
            Err(FileReadError::Timeout {
                after: Duration::from_secs(30),
            }),
            Ok(FileDecode::Decoded(DecodedFile {
                times: vec![Some(tick("2020-01-02T06:00:00"))],
                columns: BTreeMap::from([(
                    "np".to_string(),
                    ColumnValues::F64(vec![Some(5.0)]),
                )]),
                missing: Vec::new(),
            })),
        ];
        let fields = vec!["np".to_string()];
        let mut notices = Vec::new();

        let gathered = gather(
            &files,
            results,
            &fields,
            None,
            range("2020-01-01", "2020-01-03"),
            &mut notices,
        );
        assert_eq!(gathered.failed, 1);
        assert_eq!(gathered.located_slots, vec![day_range("2020-01-02")]);
        assert!(matches!(
            notices.as_slice(),
            [Degradation::FileFailed { slot, reason, .. }]
                if *slot == day_range("2020-01-01") && reason.contains("Timed out")
        ));

        let bundle = merge::concat_and_sort(gathered.slices, &fields)?;
        assert_eq!(bundle.times(), &[tick("2020-01-02T06:00:00")]);
        assert_eq!(bundle.field("np"), Some(&[5.0][..]));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_reads_report_in_discovery_order() -> TestResult {
        let tmp = TempDir::new()?;
        let days = ["2020-01-01", "2020-01-02", "2020-01-03", "2020-01-04", "2020-01-05"];
        for (i, day) in days.iter().enumerate() {
            // Earlier days are larger, so later reads tend to finish first.
            let rows = 2_000 / (i + 1);
            let mut text = String::from("time,np\n");
            for r in 0..rows {
                text.push_str(&format!(
                    "{day}T{:02}:{:02}:{:02},{i}\n",
                    r / 3600,
                    (r / 60) % 60,
                    r % 60
                ));
            }
            write_text(&tmp.path().join(format!("omni/{}.csv", day.replace('-', ""))), &text)?;
        }

        let config = CacheConfig {
            max_concurrent_reads: 4,
            ..CacheConfig::default()
        };
        let pipeline = pipeline_with(tmp.path(), "omni", csv_backend(&["np", "vp"]), &config);
        let out = pipeline
            .ingest(&ProductKey::new("omni"), range("2020-01-01", "2020-01-06"))
            .await?;

        let expected: Vec<TimeRange> = days.iter().map(|d| day_range(d)).collect();
        assert_eq!(out.located_slots, expected);
        let missing_in: Vec<String> = out
            .notices
            .iter()
            .filter_map(|n| match n {
                Degradation::FieldMissing { path, .. } => Some(path.display().to_string()),
                _ => None,
            })
            .collect();
        let expected_paths: Vec<String> = days
            .iter()
            .map(|d| format!("omni/{}.csv", d.replace('-', "")))
            .collect();
        assert_eq!(missing_in, expected_paths);

        let np = out.bundle.field("np").ok_or("np missing")?;
        assert_eq!(np.first(), Some(&0.0));
        assert_eq!(np.last(), Some(&4.0));
        assert!(out.bundle.times().windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }
}
