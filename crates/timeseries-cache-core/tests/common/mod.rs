#![allow(dead_code)]

use std::{fs, path::Path, sync::Arc};

use arrow::array::{ArrayRef, Float32Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use timeseries_cache_core::{
    config::{BackendConfig, BackendFormat, BackendRegistry, CacheConfig},
    coverage::CoverageTracker,
    ingest::IngestionPipeline,
    orchestrator::RequestOrchestrator,
    storage::DataLocation,
    store::ProductStore,
    time::{NativeTime, Tick, TimeEncoding, TimeRange, denormalize, normalize},
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn tick(s: &str) -> Result<Tick, Box<dyn std::error::Error>> {
    Ok(normalize(NativeTime::Text(s), TimeEncoding::Calendar)?)
}

pub fn range(start: &str, end: &str) -> Result<TimeRange, Box<dyn std::error::Error>> {
    Ok(TimeRange::parse(start, end)?)
}

pub fn write_text(path: &Path, text: &str) -> TestResult {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

/// Write a Parquet file with a TT2000 `epoch` column and one f32 column per
/// entry of `fields`.
pub fn write_tt2000_parquet(
    path: &Path,
    times: &[&str],
    fields: &[(&str, Vec<f32>)],
) -> TestResult {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut epochs = Vec::with_capacity(times.len());
    for t in times {
        match denormalize(tick(t)?, TimeEncoding::Tt2000)? {
            NativeTime::Int(v) => epochs.push(v),
            other => return Err(format!("unexpected tt2000 value {other:?}").into()),
        }
    }

    let mut schema_fields = vec![Field::new("epoch", DataType::Int64, false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(epochs))];
    for (name, values) in fields {
        schema_fields.push(Field::new(*name, DataType::Float32, true));
        columns.push(Arc::new(Float32Array::from(values.clone())));
    }
    let batch = RecordBatch::try_new(Arc::new(Schema::new(schema_fields)), columns)?;

    let file = fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

pub fn csv_config(template: &str, fields: &[&str], sentinel: Option<f64>) -> BackendConfig {
    BackendConfig {
        kind: BackendFormat::DailyDelimited,
        path_template: Some(template.to_string()),
        path_templates: Vec::new(),
        time_field: "time".to_string(),
        time_encoding: TimeEncoding::Calendar,
        fields: fields.iter().map(|f| f.to_string()).collect(),
        fill_sentinel: sentinel,
        block_hours: None,
        delimiter: None,
        comment: Some('#'),
    }
}

pub fn orchestrator(
    root: &Path,
    registry: BackendRegistry,
    config: CacheConfig,
) -> RequestOrchestrator {
    let pipeline = IngestionPipeline::new(DataLocation::local(root), Arc::new(registry), &config);
    RequestOrchestrator::new(
        Arc::new(CoverageTracker::new()),
        Arc::new(ProductStore::new()),
        Arc::new(pipeline),
        config,
    )
}
