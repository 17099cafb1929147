//! Agentic tool-calling loop.
//!
//! Drives the LLM ↔ tool execution round-trip as an explicit state
//! machine: ask the model, run any tool calls it requests one after
//! another, feed the observations back, and repeat until it answers or the
//! iteration cap is reached.
//!
//! ```text
//! Idle → Reasoning → { ToolCall → Observing → Reasoning }* → Finalizing → Done
//!                  ↘ Errored (cap, backend failure, cancellation)
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::executor::ToolExecutor;
use super::message::{ChatRequest, TokenUsage, assistant_tool_calls_message, tool_result_message};
use super::progress::{
    MAX_NON_TERMINAL_PERCENT, ProgressSink, ProgressTracker, STEP_FINALIZING, STEP_REASONING,
};
use super::provider::LlmProvider;
use super::tool::{ToolCall, ToolResult};
use super::turn::ToolInvocation;
use crate::error::AgentError;

/// First percentage handed out by the loop.
const LOOP_START_PERCENT: usize = 10;
/// Percentage budget spread across the iterations.
const LOOP_SPAN_PERCENT: usize = 80;

/// State of a running turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Not started.
    Idle,
    /// Waiting on the model.
    Reasoning,
    /// Running the next pending tool call.
    ToolCall,
    /// Recording a tool observation.
    Observing,
    /// The model answered.
    Finalizing,
    /// Answer ready.
    Done,
    /// Absorbing failure state.
    Errored,
}

/// Answer produced by a completed loop.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Final answer text.
    pub answer: String,
    /// Tool calls made, in order.
    pub invocations: Vec<ToolInvocation>,
    /// Summed usage over every reasoning step.
    pub usage: TokenUsage,
}

/// Failure of a loop, with the work done before it.
#[derive(Debug)]
pub struct LoopFailure {
    /// What ended the loop.
    pub error: AgentError,
    /// Tool calls made before the failure.
    pub invocations: Vec<ToolInvocation>,
    /// Usage accumulated before the failure.
    pub usage: TokenUsage,
}

/// One run of the reasoning loop.
pub struct AgenticLoop<'a> {
    provider: &'a dyn LlmProvider,
    executor: &'a ToolExecutor,
    sink: &'a ProgressSink,
    cancel: &'a CancellationToken,
    max_iterations: usize,
    time_limit: Option<Duration>,
    state: TurnState,
    iteration: usize,
    pending: VecDeque<ToolCall>,
    observation: Option<(ToolCall, ToolResult, u64)>,
    answer: String,
    invocations: Vec<ToolInvocation>,
    usage: TokenUsage,
}

impl<'a> AgenticLoop<'a> {
    /// Prepares a loop. Nothing runs until [`AgenticLoop::run`].
    #[must_use]
    pub fn new(
        provider: &'a dyn LlmProvider,
        executor: &'a ToolExecutor,
        max_iterations: usize,
        sink: &'a ProgressSink,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            provider,
            executor,
            sink,
            cancel,
            max_iterations,
            time_limit: None,
            state: TurnState::Idle,
            iteration: 0,
            pending: VecDeque::new(),
            observation: None,
            answer: String::new(),
            invocations: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Bounds the whole run. On expiry the loop fails with
    /// [`AgentError::Timeout`] and keeps the invocations completed so far.
    #[must_use]
    pub const fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// Runs to `Done` or `Errored`.
    ///
    /// `request` carries the prompt and tool definitions and is extended
    /// in place with assistant and tool messages.
    ///
    /// # Errors
    ///
    /// Returns a [`LoopFailure`] carrying [`AgentError::LoopBoundExceeded`],
    /// [`AgentError::Cancelled`], [`AgentError::Timeout`], or the backend
    /// error.
    pub async fn run(
        mut self,
        request: &mut ChatRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<LoopOutcome, LoopFailure> {
        let deadline = self
            .time_limit
            .map(|limit| (tokio::time::Instant::now() + limit, limit));

        loop {
            let step = match deadline {
                Some((at, limit)) => tokio::select! {
                    biased;
                    () = tokio::time::sleep_until(at) => Err(AgentError::Timeout {
                        operation: "turn".to_string(),
                        seconds: limit.as_secs(),
                    }),
                    step = self.advance(request, tracker) => step,
                },
                None => self.advance(request, tracker).await,
            };

            match step {
                Ok(TurnState::Done) => {
                    self.state = TurnState::Done;
                    return Ok(LoopOutcome {
                        answer: self.answer,
                        invocations: self.invocations,
                        usage: self.usage,
                    });
                }
                Ok(next) => {
                    trace!(from = ?self.state, to = ?next, "loop transition");
                    self.state = next;
                }
                Err(error) => {
                    self.state = TurnState::Errored;
                    debug!(iteration = self.iteration, error = %error, "agent loop errored");
                    return Err(LoopFailure {
                        error,
                        invocations: self.invocations,
                        usage: self.usage,
                    });
                }
            }
        }
    }

    async fn advance(
        &mut self,
        request: &mut ChatRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<TurnState, AgentError> {
        match self.state {
            TurnState::Idle => Ok(TurnState::Reasoning),
            TurnState::Reasoning => self.reason(request, tracker).await,
            TurnState::ToolCall => {
                let Some(call) = self.pending.pop_front() else {
                    return Ok(TurnState::Reasoning);
                };
                self.sink
                    .emit(tracker.step(
                        format!("tool_call:{}", call.name),
                        format!("Running {}", call.name),
                        self.percent(1),
                    ))
                    .await;

                let started = Instant::now();
                let result = self.executor.execute(&call).await;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                debug!(
                    iteration = self.iteration,
                    tool = %call.name,
                    call_id = %call.id,
                    is_error = result.is_error,
                    duration_ms,
                    "tool execution complete"
                );
                self.observation = Some((call, result, duration_ms));
                Ok(TurnState::Observing)
            }
            TurnState::Observing => {
                if let Some((call, result, duration_ms)) = self.observation.take() {
                    request.messages.push(tool_result_message(&result));
                    self.sink
                        .emit(tracker.step(
                            format!("tool_result:{}", call.name),
                            if result.is_error {
                                format!("{} returned an error", call.name)
                            } else {
                                format!("{} finished", call.name)
                            },
                            self.percent(2),
                        ))
                        .await;
                    self.invocations.push(ToolInvocation {
                        call_id: call.id,
                        tool_name: call.name,
                        arguments: call.arguments,
                        result: result.content,
                        is_error: result.is_error,
                        duration_ms,
                    });
                }
                if self.pending.is_empty() {
                    Ok(TurnState::Reasoning)
                } else {
                    Ok(TurnState::ToolCall)
                }
            }
            TurnState::Finalizing => {
                self.sink
                    .emit(tracker.step(
                        STEP_FINALIZING,
                        "Preparing the answer",
                        MAX_NON_TERMINAL_PERCENT,
                    ))
                    .await;
                Ok(TurnState::Done)
            }
            TurnState::Done | TurnState::Errored => Ok(TurnState::Done),
        }
    }

    async fn reason(
        &mut self,
        request: &mut ChatRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<TurnState, AgentError> {
        if self.iteration >= self.max_iterations {
            return Err(AgentError::LoopBoundExceeded {
                max_iterations: self.max_iterations,
            });
        }
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        self.sink
            .emit(tracker.step(
                STEP_REASONING,
                if self.iteration == 0 {
                    "Thinking about the question".to_string()
                } else {
                    format!("Reasoning step {}", self.iteration + 1)
                },
                self.percent(0),
            ))
            .await;

        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(AgentError::Cancelled),
            response = self.provider.chat(request) => response?,
        };
        self.iteration += 1;
        self.usage += response.usage;

        if response.tool_calls.is_empty() {
            debug!(
                iteration = self.iteration,
                "agentic loop completed with final text response"
            );
            if response.content.trim().is_empty() {
                return Err(AgentError::ResponseParse {
                    message: "model returned neither an answer nor a tool call".to_string(),
                });
            }
            self.answer = response.content;
            return Ok(TurnState::Finalizing);
        }

        debug!(
            iteration = self.iteration,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );
        request.messages.push(assistant_tool_calls_message(
            response.content,
            response.tool_calls.clone(),
        ));
        self.pending = response.tool_calls.into();
        Ok(TurnState::ToolCall)
    }

    /// Percentage for `phase` (0 reasoning, 1 tool start, 2 tool end) of
    /// the current iteration.
    fn percent(&self, phase: usize) -> u8 {
        let span = LOOP_SPAN_PERCENT / self.max_iterations.max(1);
        let base = if phase == 0 {
            self.iteration
        } else {
            self.iteration.saturating_sub(1)
        };
        let value = LOOP_START_PERCENT + base * span + phase * span / 3;
        u8::try_from(value.min(usize::from(MAX_NON_TERMINAL_PERCENT)))
            .unwrap_or(MAX_NON_TERMINAL_PERCENT)
    }
}

impl std::fmt::Debug for AgenticLoop<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgenticLoop")
            .field("provider", &self.provider.name())
            .field("state", &self.state)
            .field("iteration", &self.iteration)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}
