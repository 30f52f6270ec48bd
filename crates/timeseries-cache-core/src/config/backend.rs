//! Backend descriptors: how one product's files are named and laid out.
//!
//! A descriptor is written in configuration as a [`BackendConfig`] and
//! validated into a [`BackendDescriptor`] exactly once, when the registry is
//! built. The pipeline only ever sees validated descriptors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    config::{ConfigError, InvalidDescriptorSnafu, UnknownFieldSnafu},
    helpers::path_template::PathTemplate,
    product::ProductKey,
    time::TimeEncoding,
};

/// File format family of a backend, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFormat {
    /// Binary columnar instrument files (Parquet).
    BinaryColumnar,
    /// Per-day delimited text files with a header row.
    DailyDelimited,
}

/// Parsing options for delimited text backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimitedOptions {
    /// Column separator.
    pub delimiter: char,
    /// Lines starting with this character are ignored.
    pub comment: Option<char>,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            comment: None,
        }
    }
}

/// Validated backend kind, carrying the options specific to each format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Parquet files.
    BinaryColumnar,
    /// Delimited text files.
    DailyDelimited(DelimitedOptions),
}

/// Backend descriptor in its configuration form.
///
/// ```json
/// {
///   "kind": "daily_delimited",
///   "path_template": "omni/{YYYY}/omni_{YYYY}{MM}{DD}.csv",
///   "time_field": "time",
///   "time_encoding": "calendar",
///   "fields": ["bx", "by", "bz"],
///   "fill_sentinel": -9999.0
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// File format family.
    pub kind: BackendFormat,
    /// Single path template (shorthand for a one-element `path_templates`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_template: Option<String>,
    /// Path templates tried in order for every slot; the first existing
    /// rendering wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_templates: Vec<String>,
    /// Name of the time column.
    pub time_field: String,
    /// Encoding of the time column.
    pub time_encoding: TimeEncoding,
    /// Data fields the backend provides.
    pub fields: Vec<String>,
    /// Value marking missing samples, replaced by NaN on ingest.
    #[serde(default)]
    pub fill_sentinel: Option<f64>,
    /// Files hold blocks of this many hours instead of whole days.
    #[serde(default)]
    pub block_hours: Option<u32>,
    /// Column separator (delimited backends only, default `,`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    /// Comment marker (delimited backends only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<char>,
}

/// A validated backend descriptor, resolved once per product.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    kind: BackendKind,
    templates: Vec<PathTemplate>,
    time_field: String,
    time_encoding: TimeEncoding,
    fields: Vec<String>,
    fill_sentinel: Option<f64>,
    block_hours: Option<u32>,
}

impl BackendDescriptor {
    /// File format and its options.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Path templates, in fallback order.
    pub fn templates(&self) -> &[PathTemplate] {
        &self.templates
    }

    /// Name of the time column.
    pub fn time_field(&self) -> &str {
        &self.time_field
    }

    /// Encoding of the time column.
    pub fn time_encoding(&self) -> TimeEncoding {
        self.time_encoding
    }

    /// Declared data fields, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Fill sentinel, if the backend uses one.
    pub fn fill_sentinel(&self) -> Option<f64> {
        self.fill_sentinel
    }

    /// Sub-day block length in hours, `None` for daily files.
    pub fn block_hours(&self) -> Option<u32> {
        self.block_hours
    }

    /// Resolve a requested field list against the declared fields.
    ///
    /// An empty request selects every declared field. Duplicates are
    /// dropped, keeping the first occurrence.
    pub fn project(&self, key: &ProductKey, requested: &[&str]) -> Result<Vec<String>, ConfigError> {
        if requested.is_empty() {
            return Ok(self.fields.clone());
        }

        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(requested.len());
        for &field in requested {
            ensure!(
                self.fields.iter().any(|f| f == field),
                UnknownFieldSnafu {
                    key: key.clone(),
                    field,
                }
            );
            if seen.insert(field) {
                out.push(field.to_string());
            }
        }
        Ok(out)
    }
}

impl TryFrom<BackendConfig> for BackendDescriptor {
    type Error = ConfigError;

    fn try_from(config: BackendConfig) -> Result<Self, Self::Error> {
        let BackendConfig {
            kind,
            path_template,
            path_templates,
            time_field,
            time_encoding,
            fields,
            fill_sentinel,
            block_hours,
            delimiter,
            comment,
        } = config;

        let templates = path_template
            .into_iter()
            .chain(path_templates)
            .map(|t| PathTemplate::parse(&t))
            .collect::<Result<Vec<_>, _>>()?;
        ensure!(
            !templates.is_empty(),
            InvalidDescriptorSnafu {
                detail: "at least one path template is required",
            }
        );

        ensure!(
            !time_field.trim().is_empty(),
            InvalidDescriptorSnafu {
                detail: "time_field is empty",
            }
        );
        ensure!(
            !fields.is_empty(),
            InvalidDescriptorSnafu {
                detail: "fields is empty",
            }
        );
        let mut seen = BTreeSet::new();
        for field in &fields {
            ensure!(
                field != &time_field,
                InvalidDescriptorSnafu {
                    detail: format!("time field {time_field:?} is listed as a data field"),
                }
            );
            ensure!(
                seen.insert(field.as_str()),
                InvalidDescriptorSnafu {
                    detail: format!("field {field:?} is listed twice"),
                }
            );
        }

        if let Some(sentinel) = fill_sentinel {
            ensure!(
                sentinel.is_finite(),
                InvalidDescriptorSnafu {
                    detail: format!("fill_sentinel must be finite, got {sentinel}"),
                }
            );
        }

        match block_hours {
            Some(hours) => {
                ensure!(
                    hours > 0 && 24 % hours == 0,
                    InvalidDescriptorSnafu {
                        detail: format!("block_hours must divide 24, got {hours}"),
                    }
                );
                if hours < 24 {
                    if let Some(t) = templates.iter().find(|t| !t.is_sub_day()) {
                        return InvalidDescriptorSnafu {
                            detail: format!(
                                "template {t} has no {{hh}} or {{block}} placeholder but block_hours is {hours}"
                            ),
                        }
                        .fail();
                    }
                }
            }
            None => {
                if let Some(t) = templates.iter().find(|t| t.is_sub_day()) {
                    return InvalidDescriptorSnafu {
                        detail: format!("template {t} uses a sub-day placeholder without block_hours"),
                    }
                    .fail();
                }
            }
        }

        let kind = match kind {
            BackendFormat::BinaryColumnar => {
                ensure!(
                    delimiter.is_none() && comment.is_none(),
                    InvalidDescriptorSnafu {
                        detail: "delimiter and comment only apply to daily_delimited backends",
                    }
                );
                BackendKind::BinaryColumnar
            }
            BackendFormat::DailyDelimited => {
                let delimiter = delimiter.unwrap_or(',');
                ensure!(
                    delimiter.is_ascii() && !matches!(delimiter, '"' | '\n' | '\r'),
                    InvalidDescriptorSnafu {
                        detail: format!("unsupported delimiter {delimiter:?}"),
                    }
                );
                if let Some(c) = comment {
                    ensure!(
                        c.is_ascii() && c != delimiter,
                        InvalidDescriptorSnafu {
                            detail: format!("unsupported comment marker {c:?}"),
                        }
                    );
                }
                BackendKind::DailyDelimited(DelimitedOptions { delimiter, comment })
            }
        };

        Ok(Self {
            kind,
            templates,
            time_field,
            time_encoding,
            fields,
            fill_sentinel,
            block_hours,
        })
    }
}
