//! Filesystem access for instrument archives.
//!
//! This module centralizes all filesystem-related logic for the cache. Data
//! files are addressed as paths relative to a [`DataLocation`] root, which
//! keeps path conventions (templates, fallbacks) independent of where the
//! archive is mounted.
//!
//! Only the local filesystem is supported. The API is shaped so that other
//! adapters (for example, object storage) can be introduced without
//! touching the ingestion pipeline.

use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::{Backtrace, IntoError, prelude::*};
use tokio::fs;

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root of an instrument archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataLocation {
    /// Files stored on the local filesystem under the given directory.
    Local(PathBuf),
}

impl DataLocation {
    /// Creates a new `DataLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        DataLocation::Local(root.into())
    }

    /// Absolute (or root-relative) path of `rel` under this location.
    pub fn join(&self, rel: &Path) -> PathBuf {
        match self {
            DataLocation::Local(root) => root.join(rel),
        }
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLocation::Local(root) => write!(f, "{}", root.display()),
        }
    }
}

/// Errors produced by the storage backend implementation.
///
/// Backend-specific I/O errors are wrapped in this enum so higher layers can
/// map them into `StorageError` variants with additional context.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// An I/O error occurred on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

fn classify(abs: &Path, e: io::Error) -> StorageError {
    let path = abs.display().to_string();
    if e.kind() == io::ErrorKind::NotFound {
        NotFoundSnafu { path }.into_error(BackendError::Local(e))
    } else {
        OtherIoSnafu { path }.into_error(BackendError::Local(e))
    }
}

/// True if `rel_path` names an existing regular file under `location`.
///
/// Directories and other non-file entries report `false`. Permission and
/// other I/O problems surface as `StorageError::OtherIo`.
pub async fn exists(location: &DataLocation, rel_path: &Path) -> StorageResult<bool> {
    match location {
        DataLocation::Local(_) => {
            let abs = location.join(rel_path);
            match fs::metadata(&abs).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e)
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: abs.display().to_string(),
                    }),
            }
        }
    }
}

/// Read the whole file at `rel_path` into memory.
///
/// A missing file yields `StorageError::NotFound`; other filesystem problems
/// produce `StorageError::OtherIo`.
pub async fn read_all_bytes(location: &DataLocation, rel_path: &Path) -> StorageResult<Bytes> {
    match location {
        DataLocation::Local(_) => {
            let abs = location.join(rel_path);
            fs::read(&abs)
                .await
                .map(Bytes::from)
                .map_err(|e| classify(&abs, e))
        }
    }
}

/// Open the file at `rel_path` for ranged reads.
///
/// Columnar readers use the handle to fetch the footer and only the column
/// chunks they need instead of loading the whole file.
pub async fn open_file(location: &DataLocation, rel_path: &Path) -> StorageResult<std::fs::File> {
    match location {
        DataLocation::Local(_) => {
            let abs = location.join(rel_path);
            let file = fs::File::open(&abs)
                .await
                .map_err(|e| classify(&abs, e))?;
            Ok(file.into_std().await)
        }
    }
}

/// Read the file at `rel_path` and return its contents as a `String`.
pub async fn read_to_string(location: &DataLocation, rel_path: &Path) -> StorageResult<String> {
    match location {
        DataLocation::Local(_) => {
            let abs = location.join(rel_path);
            fs::read_to_string(&abs)
                .await
                .map_err(|e| classify(&abs, e))
        }
    }
}
