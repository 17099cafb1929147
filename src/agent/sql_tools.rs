//! SQL tools bound to one turn's [`LiveConnection`].

use std::fmt::Write;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::tool::{EXECUTE_QUERY, INTROSPECT_SCHEMA, VALIDATE_QUERY};
use crate::db::LiveConnection;
use crate::db::introspect::{columns_query, list_base_tables, sample_rows_query};
use crate::error::AgentError;

/// Default cap on rows returned by `execute_query`.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 200;
/// Default sample rows per table in `introspect_schema`.
pub const DEFAULT_SAMPLE_ROWS: usize = 3;
/// Maximum tables per `introspect_schema` call.
const MAX_INTROSPECT_TABLES: usize = 50;

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

#[derive(Deserialize)]
struct IntrospectArgs {
    tables: Vec<String>,
}

/// `list_tables`, `introspect_schema`, `execute_query`, and `validate_query`
/// over a single connection.
#[derive(Debug, Clone)]
pub struct SqlTools {
    conn: LiveConnection,
    max_result_rows: usize,
    sample_rows: usize,
}

impl SqlTools {
    /// Binds the tools to a connection with default limits.
    #[must_use]
    pub const fn new(conn: LiveConnection) -> Self {
        Self {
            conn,
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }

    /// Sets the `execute_query` row cap.
    #[must_use]
    pub const fn with_max_result_rows(mut self, n: usize) -> Self {
        self.max_result_rows = n;
        self
    }

    /// Sets the sample rows per introspected table.
    #[must_use]
    pub const fn with_sample_rows(mut self, n: usize) -> Self {
        self.sample_rows = n;
        self
    }

    /// The bound connection.
    #[must_use]
    pub const fn connection(&self) -> &LiveConnection {
        &self.conn
    }

    /// Comma-separated visible tables. Runs the catalog listing live when
    /// the table set is unrestricted.
    pub async fn list_tables(&self) -> Result<String, AgentError> {
        let tables = match self.conn.include_tables() {
            Some(tables) => tables.to_vec(),
            None => list_base_tables(self.conn.handle(), self.conn.dialect()).await,
        };
        if tables.is_empty() {
            return Ok("No tables found.".to_string());
        }
        Ok(tables.join(", "))
    }

    /// Columns and sample rows for each requested table.
    pub async fn introspect_schema(&self, arguments: &str) -> Result<String, AgentError> {
        let args: IntrospectArgs = parse_args(INTROSPECT_SCHEMA, arguments)?;
        if args.tables.is_empty() {
            return Err(argument_error(INTROSPECT_SCHEMA, "`tables` must name at least one table"));
        }
        if args.tables.len() > MAX_INTROSPECT_TABLES {
            return Err(argument_error(
                INTROSPECT_SCHEMA,
                format!(
                    "too many tables ({}, max {MAX_INTROSPECT_TABLES})",
                    args.tables.len()
                ),
            ));
        }

        let dialect = self.conn.dialect();
        let mut out = String::new();
        for table in &args.tables {
            if !self.conn.is_table_visible(table) {
                let _ = writeln!(out, "Table {table}: unknown table, not available in this database.\n");
                continue;
            }

            let _ = writeln!(out, "Table {table}:");
            match self.conn.query(&columns_query(dialect, table)).await {
                Ok(columns) if columns.is_empty() => {
                    let _ = writeln!(out, "  (no columns found)");
                }
                Ok(columns) => {
                    for row in &columns.rows {
                        let cell = |i: usize| row.get(i).map_or_else(String::new, plain);
                        let nullable = if cell(2).eq_ignore_ascii_case("yes") {
                            "nullable"
                        } else {
                            "not null"
                        };
                        let _ = writeln!(out, "  - {} {} ({nullable})", cell(0), cell(1));
                    }
                }
                Err(e) => {
                    let _ = writeln!(out, "  columns unavailable: {e}");
                }
            }

            if self.sample_rows > 0 {
                match self
                    .conn
                    .query_text(&sample_rows_query(dialect, table, self.sample_rows))
                    .await
                {
                    Ok(text) if text.contains('\n') => {
                        let _ = writeln!(out, "  Sample rows:\n{text}");
                    }
                    Ok(_) => {
                        let _ = writeln!(out, "  Sample rows: (table is empty)");
                    }
                    Err(e) => {
                        let _ = writeln!(out, "  sample rows unavailable: {e}");
                    }
                }
            }
            out.push('\n');
        }
        Ok(out.trim_end().to_string())
    }

    /// Runs a query and returns `{columns, rows, row_count, truncated}`.
    pub async fn execute_query(&self, arguments: &str) -> Result<String, AgentError> {
        let args: QueryArgs = parse_args(EXECUTE_QUERY, arguments)?;
        let sql = required_query(EXECUTE_QUERY, &args.query)?;
        debug!(dialect = %self.conn.dialect(), sql, "executing query");

        let output = self
            .conn
            .query(sql)
            .await
            .map_err(|e| execution_error(EXECUTE_QUERY, e.to_string()))?;

        let row_count = output.rows.len();
        let result = json!({
            "columns": output.columns,
            "rows": output.row_objects(self.max_result_rows),
            "row_count": row_count,
            "truncated": row_count > self.max_result_rows,
        });
        Ok(result.to_string())
    }

    /// Plans a query without executing it.
    pub async fn validate_query(&self, arguments: &str) -> Result<String, AgentError> {
        let args: QueryArgs = parse_args(VALIDATE_QUERY, arguments)?;
        let sql = required_query(VALIDATE_QUERY, &args.query)?;

        let plan = self
            .conn
            .validate(sql)
            .await
            .map_err(|e| execution_error(VALIDATE_QUERY, format!("query is invalid: {e}")))?;

        if plan.is_empty() {
            Ok("Query is valid.".to_string())
        } else {
            Ok(format!("Query is valid. Plan:\n{}", plan.to_text()))
        }
    }
}

fn plain(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), String::from)
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: &str) -> Result<T, AgentError> {
    serde_json::from_str(arguments).map_err(|e| argument_error(tool, format!("invalid arguments: {e}")))
}

fn required_query<'a>(tool: &str, query: &'a str) -> Result<&'a str, AgentError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(argument_error(tool, "`query` must not be empty"));
    }
    Ok(query)
}

fn argument_error(tool: &str, message: impl Into<String>) -> AgentError {
    AgentError::ToolArgument {
        name: tool.to_string(),
        message: message.into(),
    }
}

fn execution_error(tool: &str, message: impl Into<String>) -> AgentError {
    AgentError::ToolExecution {
        name: tool.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::db::{ConnectionConfig, Dialect, SqlConnection, SqlxConnection};
    use serde_json::Value;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::sync::Arc;

    async fn shop(include: Option<Vec<String>>) -> (tempfile::TempDir, SqlTools) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("shop.db");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
            .await
            .unwrap_or_else(|e| panic!("connect failed: {e}"));
        let handle = SqlxConnection::Sqlite(pool);
        for sql in [
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT NOT NULL, total REAL)",
            "INSERT INTO orders (status, total) VALUES ('shipped', 10), ('shipped', 5), ('pending', 7)",
        ] {
            handle
                .query(sql)
                .await
                .unwrap_or_else(|e| panic!("setup failed: {e}"));
        }
        let config = ConnectionConfig {
            dialect: Dialect::Sqlite,
            host: None,
            port: None,
            database: path.display().to_string(),
            username: None,
            password: None,
        };
        let live = LiveConnection::new(Arc::new(handle), &config, include);
        (dir, SqlTools::new(live))
    }

    #[tokio::test]
    async fn test_list_tables_restricted_and_live() {
        let (_dir, tools) = shop(Some(vec!["orders".to_string()])).await;
        assert_eq!(tools.list_tables().await.unwrap_or_default(), "orders");

        let (_dir, tools) = shop(None).await;
        assert_eq!(tools.list_tables().await.unwrap_or_default(), "orders");
    }

    #[tokio::test]
    async fn test_introspect_reports_columns_and_unknown_tables() {
        let (_dir, tools) = shop(Some(vec!["orders".to_string()])).await;
        let text = tools
            .introspect_schema(r#"{"tables": ["orders", "payroll"]}"#)
            .await
            .unwrap_or_else(|e| panic!("introspect failed: {e}"));
        assert!(text.contains("- status TEXT (not null)"), "{text}");
        assert!(text.contains("- total REAL (nullable)"), "{text}");
        assert!(text.contains("Sample rows"), "{text}");
        assert!(text.contains("Table payroll: unknown table"), "{text}");
    }

    #[tokio::test]
    async fn test_execute_query_caps_rows() {
        let (_dir, tools) = shop(None).await;
        let tools = tools.with_max_result_rows(1);
        let text = tools
            .execute_query(r#"{"query": "SELECT status, total FROM orders ORDER BY id"}"#)
            .await
            .unwrap_or_else(|e| panic!("execute failed: {e}"));
        let value: Value = serde_json::from_str(&text).unwrap_or_else(|e| panic!("bad json: {e}"));
        assert_eq!(value["row_count"], 3);
        assert_eq!(value["truncated"], true);
        assert_eq!(value["rows"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["rows"][0]["status"], "shipped");
    }

    #[tokio::test]
    async fn test_execute_query_database_error_is_tool_error() {
        let (_dir, tools) = shop(None).await;
        let result = tools.execute_query(r#"{"query": "SELECT nope FROM orders"}"#).await;
        assert!(matches!(result, Err(AgentError::ToolExecution { .. })));
    }

    #[tokio::test]
    async fn test_execute_query_rejects_bad_arguments() {
        let (_dir, tools) = shop(None).await;
        assert!(matches!(
            tools.execute_query(r#"{"sql": "SELECT 1"}"#).await,
            Err(AgentError::ToolArgument { .. })
        ));
        assert!(matches!(
            tools.execute_query(r#"{"query": "   "}"#).await,
            Err(AgentError::ToolArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_query() {
        let (_dir, tools) = shop(None).await;
        let ok = tools
            .validate_query(r#"{"query": "SELECT count(*) FROM orders GROUP BY status"}"#)
            .await
            .unwrap_or_else(|e| panic!("validate failed: {e}"));
        assert!(ok.starts_with("Query is valid."));

        let bad = tools
            .validate_query(r#"{"query": "SELECT * FROM missing"}"#)
            .await;
        assert!(matches!(bad, Err(AgentError::ToolExecution { .. })));
    }
}
