//! Reader for per-day delimited text files.
//!
//! Layout: optional comment lines, one header line naming the columns, then
//! one record per line. Every cell is read as text; the time cell is
//! normalized through the backend's encoding and data cells are parsed as
//! `f64` (empty, missing or unparseable cells become nulls). Records with
//! fewer cells than the header are padded with nulls.
//!
//! The boundary pre-check looks only at the first and last data lines, so
//! it assumes a file's records are in time order. A file whose first and
//! last records both fall outside the request is skipped even if records in
//! between would fall inside it.

use std::{io::Cursor, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, StringArray},
    compute::cast,
    datatypes::{DataType, Field, Schema},
};
use arrow_csv::{ReaderBuilder, reader::Format};
use log::debug;
use snafu::prelude::*;

use crate::{
    config::DelimitedOptions,
    formats::{ColumnValues, DecodedFile, FileDecode, span_intersects},
    ingest::{ArrowSnafu, EmptyDelimitedSnafu, FileReadError, MissingTimeColumnSnafu, NotUtf8Snafu},
    time::{NativeTime, Tick, TimeEncoding, TimeRange, normalize},
};

fn is_content(line: &str, comment: Option<char>) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty() && comment.is_none_or(|c| !trimmed.starts_with(c))
}

fn split_cells(line: &str, delimiter: char) -> impl Iterator<Item = &str> {
    line.split(delimiter)
        .map(|cell| cell.trim().trim_matches('"').trim())
}

fn cell_time(line: &str, delimiter: char, index: usize, encoding: TimeEncoding) -> Option<Tick> {
    let cell = split_cells(line, delimiter).nth(index)?;
    normalize(NativeTime::Text(cell), encoding).ok()
}

fn strings(array: &ArrayRef) -> Result<StringArray, FileReadError> {
    let utf8 = cast(array, &DataType::Utf8).context(ArrowSnafu)?;
    Ok(utf8
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .unwrap_or_else(|| StringArray::from(Vec::<Option<&str>>::new())))
}

/// Decode a delimited file, skipping it when its first and last records lie
/// outside `range`.
pub fn decode(
    data: &[u8],
    options: DelimitedOptions,
    time_field: &str,
    encoding: TimeEncoding,
    fields: &[String],
    range: TimeRange,
) -> Result<FileDecode, FileReadError> {
    let text = std::str::from_utf8(data).context(NotUtf8Snafu)?;
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| is_content(line, options.comment))
        .collect();
    let (header, records) = lines.split_first().context(EmptyDelimitedSnafu)?;

    let names: Vec<&str> = split_cells(header, options.delimiter).collect();
    let time_idx = names
        .iter()
        .position(|name| *name == time_field)
        .context(MissingTimeColumnSnafu { column: time_field })?;

    if let (Some(first_line), Some(last_line)) = (records.first(), records.last()) {
        let first = cell_time(first_line, options.delimiter, time_idx, encoding);
        let last = cell_time(last_line, options.delimiter, time_idx, encoding);
        if let (Some(first), Some(last)) = (first, last) {
            if !span_intersects(first, last, range) {
                return Ok(FileDecode::Skipped {
                    first: first.min(last),
                    last: first.max(last),
                });
            }
        } else {
            debug!("could not parse boundary records; reading the whole file");
        }
    }

    let mut projection = vec![time_idx];
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for field in fields {
        match names.iter().position(|name| name == field) {
            Some(idx) => {
                projection.push(idx);
                present.push(field.clone());
            }
            None => missing.push(field.clone()),
        }
    }

    let schema = Schema::new(
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Field::new(format!("{i}:{name}"), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    );
    let format = Format::default()
        .with_header(true)
        .with_delimiter(options.delimiter as u8);
    let body = lines.join("\n");
    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .with_truncated_rows(true)
        .with_projection(projection)
        .build(Cursor::new(body.into_bytes()))
        .context(ArrowSnafu)?;

    let mut out = DecodedFile {
        missing,
        ..DecodedFile::default()
    };
    for name in &present {
        out.columns
            .insert(name.clone(), ColumnValues::F64(Vec::new()));
    }

    for batch_res in reader {
        let batch = batch_res.context(ArrowSnafu)?;

        // Projected columns arrive in projection order: time first.
        let times = strings(batch.column(0))?;
        out.times.extend(
            times
                .iter()
                .map(|cell| cell.and_then(|s| normalize(NativeTime::Text(s.trim()), encoding).ok())),
        );

        for (offset, name) in present.iter().enumerate() {
            let cells = strings(batch.column(offset + 1))?;
            let values = cells
                .iter()
                .map(|cell| cell.and_then(|s| s.trim().trim_matches('"').parse::<f64>().ok()));
            if let Some(ColumnValues::F64(column)) = out.columns.get_mut(name) {
                column.extend(values);
            }
        }
    }

    Ok(FileDecode::Decoded(out))
}
