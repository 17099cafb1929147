//! Output formatting for CLI commands.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::progress::ProgressEvent;
use crate::agent::registry::ModelBackend;
use crate::agent::turn::TurnResult;

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// One compact JSON document per line.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Serializes `value` for this format.
    ///
    /// `Text` falls back to pretty JSON.
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        let rendered = match self {
            Self::Ndjson => serde_json::to_string(value),
            Self::Text | Self::Json => serde_json::to_string_pretty(value),
        };
        rendered.unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {e}"}}"#))
    }
}

/// One progress line for stderr.
#[must_use]
pub fn format_progress(event: &ProgressEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("[{:>3}%] {}: {}", event.percent, event.step, event.message),
        OutputFormat::Json | OutputFormat::Ndjson => OutputFormat::Ndjson.to_json(event),
    }
}

/// Formats a finished turn.
#[must_use]
pub fn format_turn_result(result: &TurnResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            if let Some(error) = &result.error {
                let _ = writeln!(output, "Error: {}", error.message);
            } else {
                output.push_str(&result.answer_text);
                output.push('\n');
            }

            let tools: Vec<String> = result
                .tool_invocations
                .iter()
                .map(|t| {
                    if t.is_error {
                        format!("{} (error)", t.tool_name)
                    } else {
                        t.tool_name.clone()
                    }
                })
                .collect();
            let _ = write!(
                output,
                "\n---\nProvider: {} | Tools: {} | Tokens: {}",
                result.provider.as_deref().unwrap_or("-"),
                if tools.is_empty() {
                    "none".to_string()
                } else {
                    tools.join(", ")
                },
                result.usage.total_tokens,
            );
            output.push('\n');
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format.to_json(result),
    }
}

/// Formats the backend listing.
#[must_use]
pub fn format_providers(backends: &[ModelBackend], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            for (i, backend) in backends.iter().enumerate() {
                let marker = if i == 0 { " (default)" } else { "" };
                let _ = writeln!(output, "{}  {}{marker}", backend.id, backend.display_name);
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format.to_json(backends),
    }
}

/// Formats the visible table listing.
#[must_use]
pub fn format_tables(target: &str, tables: &[String], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if tables.is_empty() {
                return format!("No tables found in {target}.\n");
            }
            let mut output = format!("{} table(s) in {target}:\n", tables.len());
            for table in tables {
                let _ = writeln!(output, "  {table}");
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format.to_json(&serde_json::json!({
            "target": target,
            "tables": tables,
            "count": tables.len(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::TokenUsage;
    use crate::agent::registry::ProviderFamily;
    use crate::agent::turn::{ToolInvocation, TurnError};
    use crate::error::ErrorKind;

    fn result() -> TurnResult {
        TurnResult {
            thread_id: "t-1".to_string(),
            answer_text: "There are 42 orders.".to_string(),
            tool_invocations: vec![ToolInvocation {
                call_id: "call_1".to_string(),
                tool_name: "execute_query".to_string(),
                arguments: "{}".to_string(),
                result: "{}".to_string(),
                is_error: false,
                duration_ms: 3,
            }],
            provider: Some("openai/gpt-4o".to_string()),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            error: None,
        }
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("ndjson"), OutputFormat::Ndjson);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[test]
    fn test_text_turn_result() {
        let text = format_turn_result(&result(), OutputFormat::Text);
        assert!(text.starts_with("There are 42 orders.\n"));
        assert!(text.contains("Tools: execute_query"));
        assert!(text.contains("Tokens: 15"));
    }

    #[test]
    fn test_failed_turn_result() {
        let mut failed = result();
        failed.answer_text.clear();
        failed.tool_invocations.clear();
        failed.error = Some(TurnError {
            kind: ErrorKind::Connectivity,
            message: "connectivity error: refused".to_string(),
        });
        let text = format_turn_result(&failed, OutputFormat::Text);
        assert!(text.starts_with("Error: connectivity error"));
        assert!(text.contains("Tools: none"));
    }

    #[test]
    fn test_ndjson_is_single_line() {
        let line = format_turn_result(&result(), OutputFormat::Ndjson);
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""thread_id":"t-1""#));
    }

    #[test]
    fn test_providers_marks_default() {
        let backends = vec![
            ModelBackend::new(ProviderFamily::OpenAi, "gpt-4o"),
            ModelBackend::new(ProviderFamily::Anthropic, "claude-sonnet-4-20250514"),
        ];
        let text = format_providers(&backends, OutputFormat::Text);
        let first = text.lines().next().unwrap_or_default();
        assert!(first.contains("openai/gpt-4o") && first.contains("(default)"));
    }
}
