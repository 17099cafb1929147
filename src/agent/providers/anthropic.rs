//! Anthropic Messages API provider over `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::agent::tool::{ToolCall, ToolDefinition};
use crate::error::AgentError;

/// Default API root.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl AnthropicProvider {
    /// Creates a provider for `api_key`, honoring the configured base URL
    /// and request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(api_key: &str, config: &AgentConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AgentError::configuration(format!("anthropic http client: {e}")))?;
        let base = config
            .anthropic_base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: format!("{base}/v1/messages"),
        })
    }

    fn build_request(request: &ChatRequest) -> MessagesRequest<'_> {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut messages: Vec<WireMessage> = Vec::new();
        for msg in request.messages.iter().filter(|m| m.role != Role::System) {
            let (role, blocks) = Self::convert_message(msg);
            if blocks.is_empty() {
                continue;
            }
            // The API requires alternating roles; consecutive tool results
            // travel together in one user message.
            match messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => messages.push(WireMessage {
                    role,
                    content: blocks,
                }),
            }
        }

        let tools: Vec<WireTool<'_>> = request.tools.iter().map(wire_tool).collect();
        let tool_choice = (!tools.is_empty())
            .then(|| serde_json::json!({"type": "auto", "disable_parallel_tool_use": true}));

        MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            tools,
            tool_choice,
            temperature: request.temperature,
        }
    }

    fn convert_message(msg: &ChatMessage) -> (&'static str, Vec<Block>) {
        match msg.role {
            Role::System | Role::User => ("user", text_block(&msg.content)),
            Role::Assistant => {
                let mut blocks = text_block(&msg.content);
                blocks.extend(msg.tool_calls.iter().map(|tc| Block::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: serde_json::from_str(&tc.arguments)
                        .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
                }));
                ("assistant", blocks)
            }
            Role::Tool => (
                "user",
                vec![Block::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                    is_error: msg.is_error,
                }],
            ),
        }
    }

    fn parse_response(response: MessagesResponse) -> ChatResponse {
        let mut content = Vec::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                Block::Text { text } => content.push(text),
                Block::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                Block::ToolResult { .. } | Block::Unknown => {}
            }
        }

        let usage = response.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens.saturating_add(u.output_tokens),
        });

        ChatResponse {
            content: content.join("\n"),
            usage,
            tool_calls,
            finish_reason: response.stop_reason,
        }
    }
}

fn text_block(text: &str) -> Vec<Block> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![Block::Text {
            text: text.to_string(),
        }]
    }
}

fn wire_tool(def: &ToolDefinition) -> WireTool<'_> {
    WireTool {
        name: &def.name,
        description: &def.description,
        input_schema: &def.parameters,
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let body = Self::build_request(request);
        debug!(model = body.model, messages = body.messages.len(), "anthropic request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::ApiRequest {
                message: format!("anthropic returned {status}: {text}"),
                status: Some(status.as_u16()),
            });
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| AgentError::ResponseParse {
                    message: e.to_string(),
                })?;
        Ok(Self::parse_response(parsed))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::{
        assistant_tool_calls_message, system_message, tool_message, tool_result_message,
        user_message,
    };
    use crate::agent::tool::{ToolResult, ToolSet};

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "execute_query".to_string(),
            arguments: r#"{"query":"SELECT 1"}"#.to_string(),
        }
    }

    #[test]
    fn test_tool_error_reaches_tool_result_block() {
        let failed = tool_result_message(&ToolResult {
            tool_call_id: "a".to_string(),
            content: "relation \"missing\" does not exist".to_string(),
            is_error: true,
        });
        let (role, blocks) = AnthropicProvider::convert_message(&failed);
        assert_eq!(role, "user");
        let json = serde_json::to_value(&blocks).unwrap_or_else(|e| panic!("serialize: {e}"));
        assert_eq!(json[0]["type"], "tool_result");
        assert_eq!(json[0]["tool_use_id"], "a");
        assert_eq!(json[0]["is_error"], true);

        let (_, ok) = AnthropicProvider::convert_message(&tool_message("b", "2"));
        let json = serde_json::to_value(&ok).unwrap_or_else(|e| panic!("serialize: {e}"));
        assert!(json[0].get("is_error").is_none());
    }

    #[test]
    fn test_build_request_merges_tool_results() {
        let request = ChatRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![
                system_message("You write SQL."),
                user_message("How many orders?"),
                assistant_tool_calls_message(String::new(), vec![call("a"), call("b")]),
                tool_message("a", "1"),
                tool_message("b", "2"),
            ],
            temperature: Some(0.0),
            max_tokens: Some(512),
            tools: ToolSet::sql_tools().into_definitions(),
        };

        let built = AnthropicProvider::build_request(&request);
        assert_eq!(built.system.as_deref(), Some("You write SQL."));
        assert_eq!(built.messages.len(), 3);
        assert_eq!(built.messages[1].role, "assistant");
        assert_eq!(built.messages[1].content.len(), 2);
        assert_eq!(built.messages[2].role, "user");
        assert_eq!(built.messages[2].content.len(), 2);
        assert!(built.tool_choice.is_some());

        let json = serde_json::to_value(&built).unwrap_or_else(|e| panic!("serialize: {e}"));
        assert_eq!(json["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(json["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(json["messages"][1]["content"][0]["input"]["query"], "SELECT 1");
        assert_eq!(json["messages"][2]["content"][0]["type"], "tool_result");
    }

    #[test]
    fn test_parse_response_with_tool_use() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "Checking the tables."},
                {"type": "tool_use", "id": "toolu_1", "name": "list_tables", "input": {}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 8}
        }"#;
        let response: MessagesResponse =
            serde_json::from_str(raw).unwrap_or_else(|e| panic!("parse: {e}"));
        let parsed = AnthropicProvider::parse_response(response);
        assert_eq!(parsed.content, "Checking the tables.");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].arguments, "{}");
        assert_eq!(parsed.usage.total_tokens, 20);
        assert_eq!(parsed.finish_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = AnthropicProvider::new("sk-ant-secret", &AgentConfig::default())
            .unwrap_or_else(|e| panic!("new: {e}"));
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("api.anthropic.com/v1/messages"));
    }
}
