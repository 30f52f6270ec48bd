use std::{fs, path::Path, sync::Arc};

use arrow::datatypes::{Field, Schema};
use arrow_array::{ArrayRef, RecordBatch};
use bytes::Bytes;
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

use crate::time::{NativeTime, Tick, TimeEncoding, TimeRange, denormalize, normalize};

pub(crate) type TestResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn record_batch(
    columns: Vec<(&str, ArrayRef)>,
) -> Result<RecordBatch, arrow::error::ArrowError> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, array)| array).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
}

pub(crate) fn parquet_bytes(
    batch: &RecordBatch,
    props: Option<WriterProperties>,
) -> Result<Bytes, Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), props)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(Bytes::from(buf))
}

pub(crate) fn write_parquet(path: &Path, batch: &RecordBatch) -> TestResult {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, parquet_bytes(batch, None)?)?;
    Ok(())
}

pub(crate) fn write_text(path: &Path, text: &str) -> TestResult {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

pub(crate) fn tick(s: &str) -> Tick {
    normalize(NativeTime::Text(s), TimeEncoding::Calendar).expect("valid calendar time")
}

pub(crate) fn range(start: &str, end: &str) -> TimeRange {
    TimeRange::parse(start, end).expect("valid range")
}

pub(crate) fn day_range(day: &str) -> TimeRange {
    let start = tick(day);
    TimeRange::new(start, start + crate::time::NANOS_PER_DAY).expect("valid day")
}

pub(crate) fn tt2000_at(s: &str) -> i64 {
    match denormalize(tick(s), TimeEncoding::Tt2000) {
        Ok(NativeTime::Int(v)) => v,
        other => panic!("unexpected tt2000 conversion: {other:?}"),
    }
}
