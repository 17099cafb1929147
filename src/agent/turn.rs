//! Turn request, result, and the update stream handed to callers.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;

use super::message::{ChatMessage, TokenUsage};
use super::progress::ProgressEvent;
use crate::db::ConnectionParams;
use crate::error::{AgentError, ErrorKind};

/// One conversational turn to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Caller's conversation identifier.
    pub thread_id: String,
    /// Connection parameters as supplied.
    pub connection: ConnectionParams,
    /// Preferred backend id or family.
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Label used to prefix export keys.
    #[serde(default)]
    pub data_source_id: Option<String>,
    /// The new user message.
    pub user_message: String,
    /// Earlier messages of the thread, oldest first.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Record of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned call id.
    pub call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Raw JSON arguments.
    pub arguments: String,
    /// Observation returned to the model.
    pub result: String,
    /// Whether the observation is an error.
    pub is_error: bool,
    /// Wall time of the call.
    pub duration_ms: u64,
}

/// Classified failure of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnError {
    /// Category.
    pub kind: ErrorKind,
    /// Description.
    pub message: String,
}

impl From<&AgentError> for TurnError {
    fn from(err: &AgentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of a turn. Carries an answer, or an error, never neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Echo of the request's thread id.
    pub thread_id: String,
    /// Final answer. Empty when `error` is set.
    pub answer_text: String,
    /// Tool calls made, in order.
    pub tool_invocations: Vec<ToolInvocation>,
    /// Backend that served the turn, when one was selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Summed token usage.
    #[serde(default)]
    pub usage: TokenUsage,
    /// Failure, when the turn did not complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnError>,
}

impl TurnResult {
    /// Whether the turn produced an answer.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Item of a [`TurnStream`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnUpdate {
    /// Intermediate or terminal progress.
    Progress(ProgressEvent),
    /// The turn result. Always the last item.
    Finished(TurnResult),
}

/// Stream of updates for a running turn. Dropping it cancels the turn.
pub struct TurnStream {
    inner: ReceiverStream<TurnUpdate>,
    _cancel_on_drop: DropGuard,
}

impl TurnStream {
    pub(crate) const fn new(inner: ReceiverStream<TurnUpdate>, guard: DropGuard) -> Self {
        Self {
            inner,
            _cancel_on_drop: guard,
        }
    }
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream").finish_non_exhaustive()
    }
}

impl Stream for TurnStream {
    type Item = TurnUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
