//! Spreadsheet export: sanitizing names, building the workbook, and
//! uploading it to object storage.

#[cfg(feature = "s3")]
pub mod s3;
pub mod sanitize;
pub mod tool;
pub mod uploader;
pub mod workbook;

use serde::Serialize;
use thiserror::Error;

#[cfg(feature = "s3")]
pub use s3::S3Store;
pub use tool::{EXPORT_TOOL_NAME, ExportTool};
pub use uploader::{ObjectStore, UploadPolicy, Uploader};

/// MIME type of xlsx workbooks.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A stored export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportArtifact {
    /// Key within the bucket.
    pub object_key: String,
    /// Download URL.
    pub url: String,
    /// Stored file name.
    pub filename: String,
    /// Workbook size in bytes.
    pub byte_size: usize,
}

/// Errors raised by object stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage request failed.
    #[error("object store request failed: {0}")]
    Request(String),
}
