//! Path templates naming the file that holds one time slot.
//!
//! A template is a relative path with `{...}` placeholders:
//!
//! | placeholder | expands to                                  |
//! |-------------|---------------------------------------------|
//! | `{YYYY}`    | four-digit year                             |
//! | `{YY}`      | two-digit year                              |
//! | `{MM}`      | two-digit month                             |
//! | `{DD}`      | two-digit day of month                      |
//! | `{DOY}`     | three-digit day of year                     |
//! | `{hh}`      | two-digit starting hour of a sub-day block  |
//! | `{block}`   | index of the sub-day block within the day   |
//! | `{key}`     | the product key                             |
//!
//! Templates are parsed once when the registry is loaded, so malformed
//! templates surface as configuration errors before any file is touched.

use std::{fmt, path::PathBuf};

use chrono::Datelike;

use crate::{config::ConfigError, helpers::time_slot::TimeSlot, product::ProductKey};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Year4,
    Year2,
    Month,
    Day,
    DayOfYear,
    Hour,
    Block,
    Key,
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    parts: Vec<Part>,
}

impl PathTemplate {
    /// Parse a template, rejecting unknown placeholders and unbalanced
    /// braces.
    ///
    /// ```
    /// use timeseries_cache_core::helpers::path_template::PathTemplate;
    ///
    /// assert!(PathTemplate::parse("mfi/{YYYY}/mfi_{YYYY}{MM}{DD}.parquet").is_ok());
    /// assert!(PathTemplate::parse("mfi/{YYYY/x").is_err());
    /// assert!(PathTemplate::parse("mfi/{week}.parquet").is_err());
    /// ```
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let invalid = |detail: &str| ConfigError::InvalidTemplate {
            template: template.to_string(),
            detail: detail.to_string(),
        };

        if template.trim().is_empty() {
            return Err(invalid("template is empty"));
        }

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(idx) = rest.find(['{', '}']) {
            literal.push_str(&rest[..idx]);
            if rest[idx..].starts_with('}') {
                return Err(invalid("unmatched '}'"));
            }

            let after = &rest[idx + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let name = &after[..close];
            if name.contains('{') {
                return Err(invalid("nested '{'"));
            }

            let part = match name {
                "YYYY" => Part::Year4,
                "YY" => Part::Year2,
                "MM" => Part::Month,
                "DD" => Part::Day,
                "DOY" => Part::DayOfYear,
                "hh" => Part::Hour,
                "block" => Part::Block,
                "key" => Part::Key,
                other => return Err(invalid(&format!("unknown placeholder {{{other}}}"))),
            };

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(part);
            rest = &after[close + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            raw: template.to_string(),
            parts,
        })
    }

    /// The template text as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if the template distinguishes sub-day blocks (`{hh}` or
    /// `{block}`).
    pub fn is_sub_day(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Hour | Part::Block))
    }

    /// Render the relative path of the file holding `slot`.
    pub fn render(&self, slot: &TimeSlot, key: &ProductKey) -> PathBuf {
        let mut out = String::with_capacity(self.raw.len() + 8);
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Year4 => out.push_str(&format!("{:04}", slot.date.year())),
                Part::Year2 => out.push_str(&format!("{:02}", slot.date.year().rem_euclid(100))),
                Part::Month => out.push_str(&format!("{:02}", slot.date.month())),
                Part::Day => out.push_str(&format!("{:02}", slot.date.day())),
                Part::DayOfYear => out.push_str(&format!("{:03}", slot.date.ordinal())),
                Part::Hour => out.push_str(&format!("{:02}", slot.hour)),
                Part::Block => out.push_str(&slot.block.to_string()),
                Part::Key => out.push_str(key.as_str()),
            }
        }
        PathBuf::from(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
