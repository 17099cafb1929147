//! CLI command implementations.
//!
//! Each command builds what it needs from [`AgentConfig`] and returns its
//! stdout text. Async work runs on a runtime created per command.

// Allow certain patterns that improve readability in CLI output formatting
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]

use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::warn;

use crate::agent::config::AgentConfig;
use crate::agent::message::ChatMessage;
use crate::agent::orchestrator::Orchestrator;
use crate::agent::prompt::PromptSet;
use crate::agent::registry::ProviderRegistry;
use crate::agent::turn::{TurnRequest, TurnResult, TurnUpdate};
use crate::cli::output::{
    OutputFormat, format_progress, format_providers, format_tables, format_turn_result,
};
use crate::cli::parser::{Cli, Commands, ConnectionArgs};
use crate::db::ConnectionResolver;
use crate::error::{CommandError, Result};
use crate::export::ObjectStore;

/// Region used for the export bucket when none is configured.
#[cfg(feature = "s3")]
const DEFAULT_S3_REGION: &str = "us-east-1";

/// Parameters of `askdb query`.
struct QueryParams<'a> {
    message: &'a str,
    connection: &'a ConnectionArgs,
    provider: Option<&'a str>,
    data_source: Option<&'a str>,
    history: Option<&'a Path>,
    thread_id: Option<&'a str>,
    prompt_dir: Option<&'a Path>,
}

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Query {
            message,
            connection,
            provider,
            data_source,
            history,
            thread_id,
            prompt_dir,
        } => {
            let params = QueryParams {
                message,
                connection,
                provider: provider.as_deref(),
                data_source: data_source.as_deref(),
                history: history.as_deref(),
                thread_id: thread_id.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_query(&params, format)
        }
        Commands::Providers => cmd_providers(&load_config(None)?, format),
        Commands::Tables { connection } => cmd_tables(&load_config(None)?, connection, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

fn load_config(prompt_dir: Option<&Path>) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder();
    if let Some(dir) = prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.from_env().build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}"))
    })?;
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })?;
    Ok(rt)
}

fn cmd_query(params: &QueryParams<'_>, format: OutputFormat) -> Result<String> {
    let config = load_config(params.prompt_dir)?;
    let registry = Arc::new(ProviderRegistry::from_config(&config)?);
    let history = match params.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    let request = TurnRequest {
        thread_id: params
            .thread_id
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from),
        connection: params.connection.to_params(),
        provider_id: params.provider.map(String::from),
        data_source_id: params.data_source.map(String::from),
        user_message: params.message.to_string(),
        history,
    };

    let rt = runtime()?;
    let result = rt.block_on(async {
        let mut orchestrator = Orchestrator::new(registry, config.clone());
        if let Some(store) = build_store(&config).await {
            orchestrator = orchestrator.with_store(store);
        }
        stream_turn(&orchestrator, request, format).await
    })?;

    if let Some(error) = &result.error {
        if format == OutputFormat::Text {
            return Err(CommandError::ExecutionFailed(error.message.clone()).into());
        }
    }
    Ok(format_turn_result(&result, format))
}

/// Runs a turn, writing progress to stderr, and returns its result.
async fn stream_turn(
    orchestrator: &Orchestrator,
    request: TurnRequest,
    format: OutputFormat,
) -> Result<TurnResult> {
    let mut stream = orchestrator.run_turn(request);
    let mut stderr = io::stderr();
    let mut finished = None;

    while let Some(update) = stream.next().await {
        match update {
            TurnUpdate::Progress(event) => {
                let _ = writeln!(stderr, "{}", format_progress(&event, format));
            }
            TurnUpdate::Finished(result) => finished = Some(result),
        }
    }

    finished.ok_or_else(|| {
        CommandError::ExecutionFailed("turn ended without a result".to_string()).into()
    })
}

#[cfg(feature = "s3")]
async fn build_store(config: &AgentConfig) -> Option<Arc<dyn ObjectStore>> {
    let bucket = config.s3_bucket.clone()?;
    let region = config
        .s3_region
        .clone()
        .unwrap_or_else(|| DEFAULT_S3_REGION.to_string());
    tracing::debug!(%bucket, %region, "spreadsheet export enabled");
    Some(Arc::new(crate::export::S3Store::from_env(bucket, region).await))
}

#[cfg(not(feature = "s3"))]
#[allow(clippy::unused_async)]
async fn build_store(config: &AgentConfig) -> Option<Arc<dyn ObjectStore>> {
    if config.s3_bucket.is_some() {
        warn!("ASKDB_S3_BUCKET is set but this build has no s3 support; export disabled");
    }
    None
}

/// Reads a JSON array of chat messages.
fn load_history(path: &Path) -> Result<Vec<ChatMessage>> {
    let text = std::fs::read_to_string(path)?;
    let history: Vec<ChatMessage> = serde_json::from_str(&text).map_err(|e| {
        CommandError::InvalidInput(format!("history file {}: {e}", path.display()))
    })?;
    Ok(history)
}

fn cmd_providers(config: &AgentConfig, format: OutputFormat) -> Result<String> {
    let registry = ProviderRegistry::from_config(config)?;
    Ok(format_providers(&registry.list_available(), format))
}

fn cmd_tables(config: &AgentConfig, args: &ConnectionArgs, format: OutputFormat) -> Result<String> {
    let connection = args.to_params().validate()?;
    let resolver = ConnectionResolver::default()
        .with_probe_timeout(config.probe_timeout)
        .with_strict_introspection(config.strict_introspection);

    let rt = runtime()?;
    let live = rt.block_on(resolver.resolve(&connection))?;
    let tables = live.include_tables().map(<[String]>::to_vec).unwrap_or_else(|| {
        warn!(db = %connection.target(), "catalog listed no tables");
        Vec::new()
    });
    Ok(format_tables(&connection.target(), &tables, format))
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ))
            } else {
                let mut output = format!(
                    "Wrote {} prompt template(s) to: {}\n",
                    written.len(),
                    target_dir.display()
                );
                for path in &written {
                    output.push_str(&format!(
                        "  {}\n",
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("unknown")
                    ));
                }
                output.push_str("\nEdit these files to customize the agent system prompt.\n");
                Ok(output)
            }
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}
