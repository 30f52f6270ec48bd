//! Enumerate the files backing a time range.

use std::path::PathBuf;

use log::warn;

use crate::{
    config::BackendDescriptor,
    helpers::time_slot::slots_for_range,
    ingest::Degradation,
    product::ProductKey,
    storage::{self, DataLocation},
    time::TimeRange,
};

/// A file that exists for one slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocatedFile {
    pub(crate) slot: TimeRange,
    pub(crate) path: PathBuf,
}

/// Result of walking the slots of a request.
#[derive(Debug, Default)]
pub(crate) struct Located {
    pub(crate) files: Vec<LocatedFile>,
    pub(crate) notices: Vec<Degradation>,
}

/// Render every slot of `range` and keep the first existing rendering.
///
/// Absent slots become [`Degradation::MissingFile`]; a slot whose existence
/// check itself fails becomes [`Degradation::FileFailed`]. Files are returned
/// in slot order.
pub(crate) async fn locate_files(
    location: &DataLocation,
    key: &ProductKey,
    descriptor: &BackendDescriptor,
    range: TimeRange,
) -> Located {
    let mut out = Located::default();

    'slots: for slot in slots_for_range(range, descriptor.block_hours()) {
        let mut last_error = None;
        for template in descriptor.templates() {
            let rel = template.render(&slot, key);
            match storage::exists(location, &rel).await {
                Ok(true) => {
                    out.files.push(LocatedFile {
                        slot: slot.range,
                        path: rel,
                    });
                    continue 'slots;
                }
                Ok(false) => {}
                Err(e) => last_error = Some((rel, e)),
            }
        }

        if let Some((path, e)) = last_error {
            warn!("Existence check failed for {key} slot {}: {e}", slot.range);
            out.notices.push(Degradation::FileFailed {
                slot: slot.range,
                path,
                reason: e.to_string(),
            });
            continue;
        }

        let path = descriptor
            .templates()
            .first()
            .map(|t| t.render(&slot, key))
            .unwrap_or_default();
        warn!(
            "No file for {key} on {} (expected {})",
            slot.date,
            location.join(&path).display()
        );
        out.notices.push(Degradation::MissingFile {
            slot: slot.range,
            path,
        });
    }

    out
}
