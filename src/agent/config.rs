//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::agent::executor::DEFAULT_TOOL_TIMEOUT_SECS;
use crate::agent::sql_tools::{DEFAULT_MAX_RESULT_ROWS, DEFAULT_SAMPLE_ROWS};
use crate::db::resolver::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::error::AgentError;
use crate::export::UploadPolicy;
use crate::export::tool::DEFAULT_EXPORT_MAX_BYTES;
use crate::export::uploader::{DEFAULT_ATTEMPT_TIMEOUT_SECS, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

/// Default `OpenAI` model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
/// Default max tokens per completion.
const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default maximum reasoning iterations per turn.
const DEFAULT_MAX_ITERATIONS: usize = 10;
/// Default whole-turn bound in seconds.
const DEFAULT_TURN_TIMEOUT_SECS: u64 = 600;
/// Default label for exports when a request names no data source.
const DEFAULT_DATABASE_LABEL: &str = "default";

/// Configuration for the agent system.
#[derive(Clone)]
pub struct AgentConfig {
    /// `OpenAI` API key. The backend is registered only when set.
    pub openai_api_key: Option<String>,
    /// Base URL override for `OpenAI`-compatible APIs.
    pub openai_base_url: Option<String>,
    /// `OpenAI` model.
    pub openai_model: String,
    /// Anthropic API key. The backend is registered only when set.
    pub anthropic_api_key: Option<String>,
    /// Base URL override for the Anthropic API.
    pub anthropic_base_url: Option<String>,
    /// Anthropic model.
    pub anthropic_model: String,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Reasoning steps allowed before a turn fails.
    pub max_iterations: usize,
    /// Bound on each tool call.
    pub tool_timeout: Duration,
    /// Bound on a whole turn.
    pub turn_timeout: Duration,
    /// Bound on the connection liveness probe.
    pub probe_timeout: Duration,
    /// Row cap for `execute_query` observations.
    pub max_result_rows: usize,
    /// Sample rows per table in `introspect_schema`.
    pub sample_rows: usize,
    /// Upload retry policy.
    pub upload: UploadPolicy,
    /// Workbook size ceiling in bytes.
    pub export_max_bytes: usize,
    /// Export key prefix when a request names no data source.
    pub default_database: String,
    /// Fail the turn when no tables can be listed.
    pub strict_introspection: bool,
    /// Bucket for exports. Export is unavailable when unset.
    pub s3_bucket: Option<String>,
    /// Region of the export bucket.
    pub s3_region: Option<String>,
    /// Directory containing prompt template files.
    ///
    /// When set, the system prompt is loaded from a markdown file in this
    /// directory, falling back to the compiled-in default.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] for out-of-range values.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfigBuilder::default().resolve()
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("AgentConfig")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("anthropic_model", &self.anthropic_model)
            .field("max_iterations", &self.max_iterations)
            .field("tool_timeout", &self.tool_timeout)
            .field("turn_timeout", &self.turn_timeout)
            .field("upload", &self.upload)
            .field("s3_bucket", &self.s3_bucket)
            .field("strict_introspection", &self.strict_introspection)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Clone, Default)]
pub struct AgentConfigBuilder {
    openai_api_key: Option<String>,
    openai_base_url: Option<String>,
    openai_model: Option<String>,
    anthropic_api_key: Option<String>,
    anthropic_base_url: Option<String>,
    anthropic_model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    request_timeout: Option<Duration>,
    max_iterations: Option<usize>,
    tool_timeout: Option<Duration>,
    turn_timeout: Option<Duration>,
    probe_timeout: Option<Duration>,
    max_result_rows: Option<usize>,
    sample_rows: Option<usize>,
    upload_max_attempts: Option<u32>,
    upload_base_delay: Option<Duration>,
    upload_timeout: Option<Duration>,
    export_max_bytes: Option<usize>,
    default_database: Option<String>,
    strict_introspection: Option<bool>,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
    prompt_dir: Option<PathBuf>,
}

impl std::fmt::Debug for AgentConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("AgentConfigBuilder")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("anthropic_model", &self.anthropic_model)
            .field("max_iterations", &self.max_iterations)
            .field("turn_timeout", &self.turn_timeout)
            .field("s3_bucket", &self.s3_bucket)
            .field("prompt_dir", &self.prompt_dir)
            .finish_non_exhaustive()
    }
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(self) -> Self {
        self.from_lookup(|name| std::env::var(name).ok())
    }

    /// Populates unset fields from `lookup`, which maps a variable name to
    /// its value.
    #[must_use]
    pub fn from_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        fill(&mut self.openai_api_key, || text("OPENAI_API_KEY"));
        fill(&mut self.openai_base_url, || text("OPENAI_BASE_URL"));
        fill(&mut self.openai_model, || text("ASKDB_OPENAI_MODEL"));
        fill(&mut self.anthropic_api_key, || text("ANTHROPIC_API_KEY"));
        fill(&mut self.anthropic_base_url, || text("ANTHROPIC_BASE_URL"));
        fill(&mut self.anthropic_model, || text("ASKDB_ANTHROPIC_MODEL"));
        fill(&mut self.s3_bucket, || text("ASKDB_S3_BUCKET"));
        fill(&mut self.s3_region, || {
            text("ASKDB_S3_REGION").or_else(|| text("AWS_REGION"))
        });
        fill(&mut self.upload_max_attempts, || text("ASKDB_UPLOAD_MAX_ATTEMPTS").and_then(|v| parse_value(&v)));
        fill(&mut self.upload_base_delay, || {
            text("ASKDB_UPLOAD_BASE_DELAY_MS").and_then(|v| parse_value(&v)).map(Duration::from_millis)
        });
        fill(&mut self.upload_timeout, || {
            text("ASKDB_UPLOAD_TIMEOUT_SECS").and_then(|v| parse_value(&v)).map(Duration::from_secs)
        });
        fill(&mut self.default_database, || text("ASKDB_DEFAULT_DATABASE"));
        fill(&mut self.max_iterations, || text("ASKDB_MAX_ITERATIONS").and_then(|v| parse_value(&v)));
        fill(&mut self.tool_timeout, || {
            text("ASKDB_TOOL_TIMEOUT_SECS").and_then(|v| parse_value(&v)).map(Duration::from_secs)
        });
        fill(&mut self.turn_timeout, || {
            text("ASKDB_TURN_TIMEOUT_SECS").and_then(|v| parse_value(&v)).map(Duration::from_secs)
        });
        fill(&mut self.prompt_dir, || text("ASKDB_PROMPT_DIR").map(PathBuf::from));
        self
    }

    /// Sets the `OpenAI` API key.
    #[must_use]
    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    /// Sets the `OpenAI` base URL override.
    #[must_use]
    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = Some(url.into());
        self
    }

    /// Sets the `OpenAI` model.
    #[must_use]
    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.openai_model = Some(model.into());
        self
    }

    /// Sets the Anthropic API key.
    #[must_use]
    pub fn anthropic_api_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_api_key = Some(key.into());
        self
    }

    /// Sets the Anthropic base URL override.
    #[must_use]
    pub fn anthropic_base_url(mut self, url: impl Into<String>) -> Self {
        self.anthropic_base_url = Some(url.into());
        self
    }

    /// Sets the Anthropic model.
    #[must_use]
    pub fn anthropic_model(mut self, model: impl Into<String>) -> Self {
        self.anthropic_model = Some(model.into());
        self
    }

    /// Sets the max tokens per completion.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Sets the maximum reasoning iterations.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the per-tool-call timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, duration: Duration) -> Self {
        self.tool_timeout = Some(duration);
        self
    }

    /// Sets the whole-turn timeout.
    #[must_use]
    pub const fn turn_timeout(mut self, duration: Duration) -> Self {
        self.turn_timeout = Some(duration);
        self
    }

    /// Sets the liveness probe timeout.
    #[must_use]
    pub const fn probe_timeout(mut self, duration: Duration) -> Self {
        self.probe_timeout = Some(duration);
        self
    }

    /// Sets the `execute_query` row cap.
    #[must_use]
    pub const fn max_result_rows(mut self, n: usize) -> Self {
        self.max_result_rows = Some(n);
        self
    }

    /// Sets the sample rows per introspected table.
    #[must_use]
    pub const fn sample_rows(mut self, n: usize) -> Self {
        self.sample_rows = Some(n);
        self
    }

    /// Sets the upload attempt count.
    #[must_use]
    pub const fn upload_max_attempts(mut self, n: u32) -> Self {
        self.upload_max_attempts = Some(n);
        self
    }

    /// Sets the base upload backoff.
    #[must_use]
    pub const fn upload_base_delay(mut self, delay: Duration) -> Self {
        self.upload_base_delay = Some(delay);
        self
    }

    /// Sets the per-attempt upload timeout.
    #[must_use]
    pub const fn upload_timeout(mut self, duration: Duration) -> Self {
        self.upload_timeout = Some(duration);
        self
    }

    /// Sets the workbook size ceiling.
    #[must_use]
    pub const fn export_max_bytes(mut self, n: usize) -> Self {
        self.export_max_bytes = Some(n);
        self
    }

    /// Sets the default data-source label.
    #[must_use]
    pub fn default_database(mut self, label: impl Into<String>) -> Self {
        self.default_database = Some(label.into());
        self
    }

    /// Makes an empty table listing fatal.
    #[must_use]
    pub const fn strict_introspection(mut self, strict: bool) -> Self {
        self.strict_introspection = Some(strict);
        self
    }

    /// Sets the export bucket.
    #[must_use]
    pub fn s3_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.s3_bucket = Some(bucket.into());
        self
    }

    /// Sets the export bucket region.
    #[must_use]
    pub fn s3_region(mut self, region: impl Into<String>) -> Self {
        self.s3_region = Some(region.into());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] when `max_iterations` or
    /// `max_tokens` is zero.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let config = self.resolve();
        if config.max_iterations == 0 {
            return Err(AgentError::configuration("max_iterations must be at least 1"));
        }
        if config.max_tokens == 0 {
            return Err(AgentError::configuration("max_tokens must be at least 1"));
        }
        Ok(config)
    }

    fn resolve(self) -> AgentConfig {
        AgentConfig {
            openai_api_key: self.openai_api_key,
            openai_base_url: self.openai_base_url,
            openai_model: self
                .openai_model
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            anthropic_api_key: self.anthropic_api_key,
            anthropic_base_url: self.anthropic_base_url,
            anthropic_model: self
                .anthropic_model
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(0.0),
            request_timeout: self
                .request_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            tool_timeout: self
                .tool_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            turn_timeout: self
                .turn_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TURN_TIMEOUT_SECS)),
            probe_timeout: self
                .probe_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS)),
            max_result_rows: self.max_result_rows.unwrap_or(DEFAULT_MAX_RESULT_ROWS),
            sample_rows: self.sample_rows.unwrap_or(DEFAULT_SAMPLE_ROWS),
            upload: UploadPolicy {
                max_attempts: self.upload_max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                base_delay: self
                    .upload_base_delay
                    .unwrap_or(Duration::from_millis(DEFAULT_BASE_DELAY_MS)),
                attempt_timeout: self
                    .upload_timeout
                    .unwrap_or(Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS)),
            },
            export_max_bytes: self.export_max_bytes.unwrap_or(DEFAULT_EXPORT_MAX_BYTES),
            default_database: self
                .default_database
                .unwrap_or_else(|| DEFAULT_DATABASE_LABEL.to_string()),
            strict_introspection: self.strict_introspection.unwrap_or(false),
            s3_bucket: self.s3_bucket,
            s3_region: self.s3_region,
            prompt_dir: self.prompt_dir,
        }
    }
}

fn fill<T>(slot: &mut Option<T>, value: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = value();
    }
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}
