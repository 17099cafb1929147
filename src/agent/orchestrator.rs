//! Turn driver.
//!
//! Runs one conversational turn end to end: validate the connection,
//! resolve it, pick a backend, assemble the tools and prompt, then hand
//! off to the [`AgenticLoop`]. Every turn ends with exactly one terminal
//! progress event followed by the [`TurnResult`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use super::agentic_loop::AgenticLoop;
use super::config::AgentConfig;
use super::executor::ToolExecutor;
use super::message::{ChatMessage, ChatRequest, Role, TokenUsage, system_message, user_message};
use super::progress::{ProgressSink, ProgressTracker, STEP_CONNECTING};
use super::prompt::{PromptSet, build_system_prompt};
use super::registry::ProviderRegistry;
use super::sql_tools::SqlTools;
use super::turn::{ToolInvocation, TurnError, TurnRequest, TurnResult, TurnStream, TurnUpdate};
use crate::db::ConnectionResolver;
use crate::error::AgentError;
use crate::export::{ExportTool, ObjectStore, Uploader};

/// Capacity of the per-turn update channel.
const UPDATE_BUFFER: usize = 64;
/// Maximum byte length of a user message.
const MAX_USER_MESSAGE_LEN: usize = 10_000;

/// Drives turns against a shared registry, connector, and object store.
///
/// Cheap to clone; every turn runs on its own copy.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    resolver: ConnectionResolver,
    store: Option<Arc<dyn ObjectStore>>,
    config: AgentConfig,
    prompts: PromptSet,
}

/// Work done by a turn, kept when the turn fails part way.
#[derive(Default)]
struct Progress {
    provider: Option<String>,
    invocations: Vec<ToolInvocation>,
    usage: TokenUsage,
}

impl Orchestrator {
    /// Creates an orchestrator with the default database connector and no
    /// object store.
    ///
    /// Loads prompt templates from the directory specified in
    /// [`AgentConfig::prompt_dir`], falling back to compiled-in defaults.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, config: AgentConfig) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let resolver = ConnectionResolver::default()
            .with_probe_timeout(config.probe_timeout)
            .with_strict_introspection(config.strict_introspection);
        Self {
            registry,
            resolver,
            store: None,
            config,
            prompts,
        }
    }

    /// Replaces the connection resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ConnectionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Enables spreadsheet export through `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the prompt templates.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// The backend registry.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The resolver used to open connections.
    #[must_use]
    pub const fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    /// Whether turns are offered `excel_export`.
    #[must_use]
    pub const fn export_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Starts a turn on a spawned task and returns its update stream.
    ///
    /// Must be called from within a tokio runtime. Dropping the stream
    /// cancels the turn.
    pub fn run_turn(&self, request: TurnRequest) -> TurnStream {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let this = self.clone();

        tokio::spawn(async move {
            let sink = ProgressSink::new(tx);
            let result = this.execute_turn(request, &sink, &cancel).await;
            sink.send(TurnUpdate::Finished(result)).await;
        });

        TurnStream::new(ReceiverStream::new(rx), guard)
    }

    /// Runs a turn inline, reporting progress to `sink`.
    ///
    /// Never fails: errors are classified into [`TurnResult::error`] after a
    /// terminal `error` event is emitted.
    pub async fn execute_turn(
        &self,
        request: TurnRequest,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> TurnResult {
        let span = info_span!(
            "turn",
            thread_id = %request.thread_id,
            provider = tracing::field::Empty,
        );

        async {
            let mut tracker = ProgressTracker::new();
            let mut progress = Progress::default();

            let outcome = self
                .drive(&request, sink, cancel, &mut tracker, &mut progress)
                .await;

            let error = match outcome {
                Ok(ref answer) => {
                    sink.emit(tracker.done("Answer ready")).await;
                    info!(
                        tools = progress.invocations.len(),
                        tokens = progress.usage.total_tokens,
                        answer_len = answer.len(),
                        "turn complete"
                    );
                    None
                }
                Err(ref err) => {
                    sink.emit(tracker.error(err.to_string())).await;
                    warn!(kind = ?err.kind(), error = %err, "turn failed");
                    Some(TurnError::from(err))
                }
            };

            TurnResult {
                thread_id: request.thread_id.clone(),
                answer_text: outcome.unwrap_or_default(),
                tool_invocations: progress.invocations,
                provider: progress.provider,
                usage: progress.usage,
                error,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: &TurnRequest,
        sink: &ProgressSink,
        cancel: &CancellationToken,
        tracker: &mut ProgressTracker,
        progress: &mut Progress,
    ) -> Result<String, AgentError> {
        sink.emit(tracker.step(STEP_CONNECTING, "Connecting to the database", 5))
            .await;

        let config = request.connection.validate()?;
        let question = request.user_message.trim();
        if question.is_empty() {
            return Err(AgentError::configuration("user message cannot be empty"));
        }
        if question.len() > MAX_USER_MESSAGE_LEN {
            return Err(AgentError::configuration(format!(
                "user message exceeds maximum length ({} bytes, max {MAX_USER_MESSAGE_LEN})",
                question.len()
            )));
        }

        let conn = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            conn = self.resolver.resolve(&config) => conn?,
        };

        let (backend, provider) = self.registry.get(request.provider_id.as_deref())?;
        Span::current().record("provider", backend.id.as_str());
        progress.provider = Some(backend.id.clone());

        let dialect = conn.dialect();
        let tables = conn.include_tables().map(<[String]>::to_vec);

        let sql = SqlTools::new(conn)
            .with_max_result_rows(self.config.max_result_rows)
            .with_sample_rows(self.config.sample_rows);
        let data_source = request
            .data_source_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.config.default_database);
        let export = self.store.as_ref().map(|store| {
            ExportTool::new(
                Some(Uploader::new(Arc::clone(store), self.config.upload)),
                data_source,
            )
            .with_max_bytes(self.config.export_max_bytes)
        });
        let export_available = export.is_some();
        let executor = ToolExecutor::new(sql, export).with_timeout(self.config.tool_timeout);

        let system = build_system_prompt(
            &self.prompts.sql_agent,
            dialect,
            tables.as_deref(),
            export_available,
        );
        let messages = assemble_messages(&system, &request.history, question);
        debug!(
            backend = %backend.id,
            history = request.history.len(),
            export = export_available,
            "starting agent loop"
        );

        let mut chat = ChatRequest {
            model: backend.model.clone(),
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            tools: executor.tool_set().into_definitions(),
        };

        let agent_loop = AgenticLoop::new(
            provider.as_ref(),
            &executor,
            self.config.max_iterations,
            sink,
            cancel,
        )
        .with_time_limit(self.config.turn_timeout);
        match agent_loop.run(&mut chat, tracker).await {
            Ok(outcome) => {
                progress.invocations = outcome.invocations;
                progress.usage = outcome.usage;
                Ok(outcome.answer)
            }
            Err(failure) => {
                progress.invocations = failure.invocations;
                progress.usage = failure.usage;
                Err(failure.error)
            }
        }
    }
}

/// System prompt, then prior history without system messages, then the
/// new question.
fn assemble_messages(system: &str, history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(system_message(system));
    messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());
    messages.push(user_message(question));
    messages
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("resolver", &self.resolver)
            .field("export", &self.store.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
