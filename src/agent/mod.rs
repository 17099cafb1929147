//! Tool-calling SQL agent.
//!
//! Turns a natural-language question into SQL by letting an LLM call
//! database tools until it can answer. Uses a pluggable provider
//! abstraction backed by `OpenAI`-compatible and Anthropic APIs.
//!
//! # Architecture
//!
//! ```text
//! TurnRequest → Orchestrator::run_turn → TurnStream
//!   ├── ConnectionResolver (validate, connect, list tables, probe)
//!   ├── ProviderRegistry::get (backend selection)
//!   ├── ToolExecutor (SQL tools, excel_export)
//!   └── AgenticLoop
//!       └── Reasoning → ToolCall → Observing → … → Finalizing → Done
//! ```

pub mod agentic_loop;
pub mod config;
pub mod executor;
pub mod message;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sql_tools;
pub mod tool;
pub mod turn;

// Re-export key types
pub use agentic_loop::{AgenticLoop, LoopFailure, LoopOutcome, TurnState};
pub use config::AgentConfig;
pub use executor::ToolExecutor;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::Orchestrator;
pub use progress::{ProgressEvent, ProgressSink, ProgressTracker};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use registry::{ModelBackend, ProviderFamily, ProviderRegistry};
pub use sql_tools::SqlTools;
pub use tool::{ToolCall, ToolDefinition, ToolResult, ToolSet};
pub use turn::{ToolInvocation, TurnError, TurnRequest, TurnResult, TurnStream, TurnUpdate};
