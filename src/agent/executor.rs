//! Tool executor that dispatches tool calls to the SQL and export tools.
//!
//! Every outcome, including argument errors, database errors, unknown
//! tools, and timeouts, is folded into a [`ToolResult`]. Nothing here
//! ends a turn.

use std::time::Duration;

use tracing::debug;

use super::sql_tools::SqlTools;
use super::tool::{EXECUTE_QUERY, INTROSPECT_SCHEMA, LIST_TABLES, ToolCall, ToolResult, ToolSet, VALIDATE_QUERY};
use crate::error::AgentError;
use crate::export::{EXPORT_TOOL_NAME, ExportTool};

/// Maximum raw byte length of SQL tool argument JSON from the LLM.
const MAX_TOOL_ARGS_LEN: usize = 100_000;
/// Maximum raw byte length of `excel_export` argument JSON.
const MAX_EXPORT_ARGS_LEN: usize = 20_000_000;
/// Default per-call time bound in seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

/// Executes tool calls for one turn.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    sql: SqlTools,
    export: Option<ExportTool>,
    timeout: Duration,
}

impl ToolExecutor {
    /// Creates an executor over the SQL tools, with or without export.
    #[must_use]
    pub const fn new(sql: SqlTools, export: Option<ExportTool>) -> Self {
        Self {
            sql,
            export,
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }

    /// Sets the per-call time bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Definitions of the tools this executor can run.
    #[must_use]
    pub fn tool_set(&self) -> ToolSet {
        if self.export.is_some() {
            ToolSet::sql_agent_tools()
        } else {
            ToolSet::sql_tools()
        }
    }

    /// The SQL tools.
    #[must_use]
    pub const fn sql(&self) -> &SqlTools {
        &self.sql
    }

    /// Dispatches a tool call.
    ///
    /// Validates raw argument size before dispatch to prevent oversized payloads.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let limit = if call.name == EXPORT_TOOL_NAME {
            MAX_EXPORT_ARGS_LEN
        } else {
            MAX_TOOL_ARGS_LEN
        };
        if call.arguments.len() > limit {
            return ToolResult {
                tool_call_id: call.id.clone(),
                content: format!(
                    "tool arguments too large ({} bytes, max {limit})",
                    call.arguments.len()
                ),
                is_error: true,
            };
        }

        let bound = self.bound_for(call);
        let result = match tokio::time::timeout(bound, self.dispatch(call)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout {
                operation: call.name.clone(),
                seconds: bound.as_secs(),
            }),
        };

        match result {
            Ok(content) => ToolResult {
                tool_call_id: call.id.clone(),
                content,
                is_error: false,
            },
            Err(e) => {
                debug!(tool = %call.name, error = %e, "tool returned an error observation");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: e.to_string(),
                    is_error: true,
                }
            }
        }
    }

    /// Time bound for `call`. Exports get the upload's full retry budget
    /// on top of the per-call bound.
    fn bound_for(&self, call: &ToolCall) -> Duration {
        match (&self.export, call.name.as_str()) {
            (Some(export), EXPORT_TOOL_NAME) => self.timeout.saturating_add(export.upload_budget()),
            _ => self.timeout,
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<String, AgentError> {
        match call.name.as_str() {
            LIST_TABLES => self.sql.list_tables().await,
            INTROSPECT_SCHEMA => self.sql.introspect_schema(&call.arguments).await,
            EXECUTE_QUERY => self.sql.execute_query(&call.arguments).await,
            VALIDATE_QUERY => self.sql.validate_query(&call.arguments).await,
            EXPORT_TOOL_NAME => match &self.export {
                Some(export) => export.call(&call.arguments).await,
                None => Err(AgentError::ToolExecution {
                    name: EXPORT_TOOL_NAME.to_string(),
                    message: "export is not available for this turn".to_string(),
                }),
            },
            other => Err(AgentError::ToolExecution {
                name: other.to_string(),
                message: "unknown tool".to_string(),
            }),
        }
    }
}
