//! The `excel_export` tool.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::sanitize::{sanitize_file_name, sanitize_sheet_name, stamped_file_name};
use super::uploader::Uploader;
use super::workbook::build_workbook;
use super::{ExportArtifact, XLSX_CONTENT_TYPE};
use crate::error::AgentError;

/// Tool name exposed to the model.
pub const EXPORT_TOOL_NAME: &str = "excel_export";

/// Default workbook size ceiling (50 MB).
pub const DEFAULT_EXPORT_MAX_BYTES: usize = 52_428_800;

#[derive(Debug, Deserialize)]
struct ExportArgs {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default, rename = "sheetName", alias = "sheet_name")]
    sheet_name: Option<String>,
}

/// Serializes rows to a workbook and uploads it. Bound to one turn's data
/// source.
#[derive(Debug, Clone)]
pub struct ExportTool {
    uploader: Option<Uploader>,
    data_source: String,
    max_bytes: usize,
}

impl ExportTool {
    /// Creates the tool. `uploader: None` means no store is configured and
    /// every call reports that.
    #[must_use]
    pub fn new(uploader: Option<Uploader>, data_source: &str) -> Self {
        Self {
            uploader,
            data_source: sanitize_file_name(data_source),
            max_bytes: DEFAULT_EXPORT_MAX_BYTES,
        }
    }

    /// Sets the workbook size ceiling.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Extra time the upload may need on top of the per-call tool bound.
    /// Zero when no store is configured.
    #[must_use]
    pub fn upload_budget(&self) -> Duration {
        self.uploader
            .as_ref()
            .map_or(Duration::ZERO, |u| u.policy().worst_case())
    }

    /// Sanitized data-source label used as the key prefix.
    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Runs the tool on raw JSON arguments and returns the `{url, filename}`
    /// observation.
    pub async fn call(&self, arguments: &str) -> Result<String, AgentError> {
        let artifact = self.export(arguments).await?;
        Ok(json!({ "url": artifact.url, "filename": artifact.filename }).to_string())
    }

    /// Validates, serializes, size-checks, and uploads.
    ///
    /// # Errors
    ///
    /// - [`AgentError::ToolArgument`] for malformed `data`.
    /// - [`AgentError::ToolExecution`] when no store is configured, the
    ///   workbook cannot be built, or it exceeds the size ceiling.
    /// - [`AgentError::UploadFailure`] when every upload attempt fails.
    pub async fn export(&self, arguments: &str) -> Result<ExportArtifact, AgentError> {
        let args: ExportArgs =
            serde_json::from_str(arguments).map_err(|e| argument_error(format!("invalid JSON: {e}")))?;
        let rows = rows_from(args.data)?;

        let Some(uploader) = &self.uploader else {
            return Err(execution_error(
                "no object store is configured; set ASKDB_S3_BUCKET to enable exports",
            ));
        };

        let sheet = sanitize_sheet_name(args.sheet_name.as_deref().unwrap_or_default());
        let filename = stamped_file_name(
            args.filename.as_deref(),
            chrono::Utc::now().timestamp_millis(),
        );

        let bytes = build_workbook(&rows, &sheet)
            .map_err(|e| execution_error(format!("workbook serialization failed: {e}")))?;
        if bytes.len() > self.max_bytes {
            return Err(execution_error(format!(
                "workbook is {} bytes, over the {} byte limit; export fewer rows",
                bytes.len(),
                self.max_bytes
            )));
        }

        let object_key = format!("{}/reports/{filename}", self.data_source);
        debug!(key = %object_key, rows = rows.len(), bytes = bytes.len(), "uploading export");
        let url = uploader.upload(&bytes, &object_key, XLSX_CONTENT_TYPE).await?;

        Ok(ExportArtifact {
            object_key,
            url,
            filename,
            byte_size: bytes.len(),
        })
    }
}

fn rows_from(data: Option<Value>) -> Result<Vec<Map<String, Value>>, AgentError> {
    let items = match data {
        None | Some(Value::Null) => return Err(argument_error("`data` is required")),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(argument_error("`data` must be an array of row objects")),
    };
    if items.is_empty() {
        return Err(argument_error("`data` is empty; there is nothing to export"));
    }
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(argument_error(format!("row {i} of `data` is not an object"))),
        })
        .collect()
}

fn argument_error(message: impl Into<String>) -> AgentError {
    AgentError::ToolArgument {
        name: EXPORT_TOOL_NAME.to_string(),
        message: message.into(),
    }
}

fn execution_error(message: impl Into<String>) -> AgentError {
    AgentError::ToolExecution {
        name: EXPORT_TOOL_NAME.to_string(),
        message: message.into(),
    }
}
