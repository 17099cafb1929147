//! Driver-agnostic connection seam and the per-turn live connection.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::DbError;
use super::config::{ConnectionConfig, Dialect};

/// Liveness probe issued right after connecting, for every dialect.
pub const PROBE_QUERY: &str = "SELECT 1 AS test";

/// Tabular result of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Column names in result order. Empty when the result has no rows.
    pub columns: Vec<String>,
    /// Row values, one inner vec per row.
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    /// Creates an output from columns and rows.
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Returns `true` when there are no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Converts up to `limit` rows into JSON objects keyed by column name.
    #[must_use]
    pub fn row_objects(&self, limit: usize) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Renders a header line followed by tab-separated rows.
    ///
    /// This is the textual form drivers hand to the introspector and the
    /// form sample rows are shown to the model in.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = self.columns.join("\t");
        for row in &self.rows {
            out.push('\n');
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            out.push_str(&cells.join("\t"));
        }
        out
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.replace(['\t', '\n', '\r'], " "),
        other => other.to_string(),
    }
}

/// An open database handle.
///
/// Implementations wrap a driver pool or client and must be shareable
/// across the await points of a single turn.
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Dialect this handle speaks.
    fn dialect(&self) -> Dialect;

    /// Runs a statement and collects the full result.
    async fn query(&self, sql: &str) -> Result<QueryOutput, DbError>;

    /// Runs a statement and returns its textual tabular rendering.
    async fn query_text(&self, sql: &str) -> Result<String, DbError> {
        Ok(self.query(sql).await?.to_text())
    }

    /// Plans a statement without executing it.
    async fn validate(&self, sql: &str) -> Result<QueryOutput, DbError> {
        self.query(&self.dialect().explain_statement(sql)).await
    }
}

/// Opens [`SqlConnection`]s for a validated config.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to the configured database.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn SqlConnection>, DbError>;
}

/// A probed connection bound to one turn, with its visible table set.
#[derive(Clone)]
pub struct LiveConnection {
    handle: Arc<dyn SqlConnection>,
    dialect: Dialect,
    target: String,
    include_tables: Option<Vec<String>>,
}

impl LiveConnection {
    /// Wraps a handle. `include_tables: None` leaves the table set unrestricted.
    #[must_use]
    pub fn new(
        handle: Arc<dyn SqlConnection>,
        config: &ConnectionConfig,
        include_tables: Option<Vec<String>>,
    ) -> Self {
        Self {
            dialect: config.dialect,
            target: config.target(),
            handle,
            include_tables,
        }
    }

    /// SQL dialect of the connection.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Credential-free description of the target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Tables confirmed to exist, or `None` when unrestricted.
    #[must_use]
    pub fn include_tables(&self) -> Option<&[String]> {
        self.include_tables.as_deref()
    }

    /// Whether `name` is in the visible set. Always `true` when unrestricted.
    #[must_use]
    pub fn is_table_visible(&self, name: &str) -> bool {
        self.include_tables
            .as_ref()
            .is_none_or(|tables| tables.iter().any(|t| t.eq_ignore_ascii_case(name)))
    }

    /// Runs the liveness probe.
    pub async fn probe(&self) -> Result<(), DbError> {
        self.handle.query(PROBE_QUERY).await.map(|_| ())
    }

    /// Runs a statement.
    pub async fn query(&self, sql: &str) -> Result<QueryOutput, DbError> {
        self.handle.query(sql).await
    }

    /// Runs a statement and returns its textual rendering.
    pub async fn query_text(&self, sql: &str) -> Result<String, DbError> {
        self.handle.query_text(sql).await
    }

    /// Plans a statement without running it.
    pub async fn validate(&self, sql: &str) -> Result<QueryOutput, DbError> {
        self.handle.validate(sql).await
    }

    /// Underlying handle.
    #[must_use]
    pub fn handle(&self) -> &dyn SqlConnection {
        self.handle.as_ref()
    }
}

impl fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConnection")
            .field("dialect", &self.dialect)
            .field("target", &self.target)
            .field("include_tables", &self.include_tables)
            .finish_non_exhaustive()
    }
}
