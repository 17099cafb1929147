//! Tool type definitions for function-calling.
//!
//! Provides provider-agnostic types for tool definitions, calls, and
//! results, plus the schemas of the tools the SQL agent is offered.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::export::EXPORT_TOOL_NAME;

/// Lists the visible tables.
pub const LIST_TABLES: &str = "list_tables";
/// Describes columns and sample rows of named tables.
pub const INTROSPECT_SCHEMA: &str = "introspect_schema";
/// Runs a SQL statement.
pub const EXECUTE_QUERY: &str = "execute_query";
/// Plans a SQL statement without running it.
pub const VALIDATE_QUERY: &str = "validate_query";

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match dispatch table in executor).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result content (JSON or text on success, error message on failure).
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

/// A set of tool definitions offered to the model for one turn.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    definitions: Vec<ToolDefinition>,
}

impl ToolSet {
    /// Returns the tool definitions in this set.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns `true` if this set contains no tools.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns the number of tools in this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.definitions.len()
    }

    /// The four SQL tools.
    #[must_use]
    pub fn sql_tools() -> Self {
        Self {
            definitions: vec![
                def_list_tables(),
                def_introspect_schema(),
                def_execute_query(),
                def_validate_query(),
            ],
        }
    }

    /// SQL tools plus `excel_export`.
    #[must_use]
    pub fn sql_agent_tools() -> Self {
        let mut set = Self::sql_tools();
        set.definitions.push(def_excel_export());
        set
    }

    /// Returns `true` when a tool of that name is in the set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name == name)
    }

    /// Consumes the set into its definitions.
    #[must_use]
    pub fn into_definitions(self) -> Vec<ToolDefinition> {
        self.definitions
    }
}

// ---------------------------------------------------------------------------
// Tool schema definitions
// ---------------------------------------------------------------------------

fn def_list_tables() -> ToolDefinition {
    ToolDefinition {
        name: LIST_TABLES.to_string(),
        description: "List the tables available in the connected database, comma-separated."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

fn def_introspect_schema() -> ToolDefinition {
    ToolDefinition {
        name: INTROSPECT_SCHEMA.to_string(),
        description: "Describe the columns (name, type, nullability) of the given tables, \
                      with a few sample rows from each. Call this before writing queries \
                      against a table."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "tables": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": "Names of the tables to describe."
                }
            },
            "required": ["tables"],
            "additionalProperties": false
        }),
    }
}

fn def_execute_query() -> ToolDefinition {
    ToolDefinition {
        name: EXECUTE_QUERY.to_string(),
        description: "Run a SQL query and return its columns and rows as JSON. Large results \
                      are truncated; use aggregation or LIMIT where possible."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL statement in the database's dialect."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_validate_query() -> ToolDefinition {
    ToolDefinition {
        name: VALIDATE_QUERY.to_string(),
        description: "Check a SQL query without running it. Returns the query plan, or the \
                      database error if the query is invalid."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL statement to check."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_excel_export() -> ToolDefinition {
    ToolDefinition {
        name: EXPORT_TOOL_NAME.to_string(),
        description: "Export rows to an Excel spreadsheet and return a download URL. Use only \
                      when the user asks for a spreadsheet, Excel file, or download."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "array",
                    "items": { "type": "object" },
                    "minItems": 1,
                    "description": "Rows to export, one object per row keyed by column name."
                },
                "filename": {
                    "type": "string",
                    "description": "File name for the workbook. Defaults to report.xlsx."
                },
                "sheetName": {
                    "type": "string",
                    "description": "Worksheet name. Defaults to Report."
                }
            },
            "required": ["data"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_agent_tools() {
        let ts = ToolSet::sql_agent_tools();
        assert_eq!(ts.len(), 5);
        for name in [LIST_TABLES, INTROSPECT_SCHEMA, EXECUTE_QUERY, VALIDATE_QUERY, EXPORT_TOOL_NAME] {
            assert!(ts.contains(name), "missing {name}");
        }
        assert!(!ToolSet::sql_tools().contains(EXPORT_TOOL_NAME));
    }

    #[test]
    fn test_default_set_is_empty() {
        let ts = ToolSet::default();
        assert!(ts.is_empty());
        assert_eq!(ts.len(), 0);
    }

    #[test]
    fn test_all_definitions_have_valid_schemas() {
        for def in ToolSet::sql_agent_tools().definitions() {
            assert!(!def.description.is_empty());
            assert_eq!(def.parameters["type"], "object");
        }
    }

    #[test]
    fn test_tool_call_serialization() {
        let call = ToolCall {
            id: "call_123".to_string(),
            name: EXECUTE_QUERY.to_string(),
            arguments: r#"{"query":"SELECT 1"}"#.to_string(),
        };
        let json = serde_json::to_string(&call).unwrap_or_default();
        assert!(json.contains("call_123"));
        assert!(json.contains("execute_query"));
    }
}
