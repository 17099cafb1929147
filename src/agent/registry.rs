//! Provider registry.
//!
//! Maps backend ids to concrete [`LlmProvider`] implementations. Built once
//! at startup and shared read-only between turns.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::{AnthropicProvider, OpenAiProvider};
use crate::error::AgentError;

/// Vendor family of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// `OpenAI` chat completions.
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

impl ProviderFamily {
    /// Lowercase family name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderFamily {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(AgentError::UnsupportedProvider {
                name: other.to_string(),
            }),
        }
    }
}

/// Credential-free description of a registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelBackend {
    /// Stable id, `family/model`.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Vendor family.
    pub family: ProviderFamily,
    /// Model the backend sends requests to.
    pub model: String,
    /// Whether the backend can serve turns.
    pub available: bool,
}

impl ModelBackend {
    /// Describes an available backend for `model`.
    #[must_use]
    pub fn new(family: ProviderFamily, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            id: format!("{}/{model}", family.as_str()),
            display_name: format!("{} ({model})", family.label()),
            family,
            model,
            available: true,
        }
    }

    fn matches(&self, provider_id: &str) -> bool {
        self.id == provider_id || self.family.as_str() == provider_id.to_ascii_lowercase()
    }
}

struct Entry {
    backend: ModelBackend,
    provider: Arc<dyn LlmProvider>,
}

/// Immutable set of backends in priority order.
pub struct ProviderRegistry {
    entries: Vec<Entry>,
}

impl ProviderRegistry {
    /// Starts an empty registry.
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Registers every backend with a configured key, `OpenAI` first.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoBackend`] when no key is configured, or
    /// [`AgentError::Configuration`] when a provider client cannot be built.
    pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        let mut builder = Self::builder();

        if let Some(key) = config.openai_api_key.as_deref() {
            builder = builder.register(
                ModelBackend::new(ProviderFamily::OpenAi, &config.openai_model),
                Arc::new(OpenAiProvider::new(key, config)?),
            )?;
        }
        if let Some(key) = config.anthropic_api_key.as_deref() {
            builder = builder.register(
                ModelBackend::new(ProviderFamily::Anthropic, &config.anthropic_model),
                Arc::new(AnthropicProvider::new(key, config)?),
            )?;
        }

        builder.build()
    }

    /// Selects a backend.
    ///
    /// `provider_id` may be a backend id or a family name. When it names
    /// nothing available, the first available backend is used.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoBackend`] when no backend is available.
    pub fn get(
        &self,
        provider_id: Option<&str>,
    ) -> Result<(&ModelBackend, Arc<dyn LlmProvider>), AgentError> {
        let available = || self.entries.iter().filter(|e| e.backend.available);

        if let Some(id) = provider_id.map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(entry) = available().find(|e| e.backend.matches(id)) {
                return Ok((&entry.backend, Arc::clone(&entry.provider)));
            }
            debug!(requested = id, "requested backend unavailable, using fallback");
        }

        available()
            .next()
            .map(|e| (&e.backend, Arc::clone(&e.provider)))
            .ok_or(AgentError::NoBackend)
    }

    /// Available backends in priority order.
    #[must_use]
    pub fn list_available(&self) -> Vec<ModelBackend> {
        self.entries
            .iter()
            .filter(|e| e.backend.available)
            .map(|e| e.backend.clone())
            .collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.backend.id))
            .finish()
    }
}

/// Builder for [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    entries: Vec<Entry>,
}

impl ProviderRegistryBuilder {
    /// Appends a backend after those already registered.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] if a backend of the same
    /// family is already registered.
    pub fn register(
        mut self,
        backend: ModelBackend,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, AgentError> {
        if self.entries.iter().any(|e| e.backend.family == backend.family) {
            return Err(AgentError::configuration(format!(
                "backend family {} registered twice",
                backend.family
            )));
        }
        self.entries.push(Entry { backend, provider });
        Ok(self)
    }

    /// Freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoBackend`] when nothing was registered.
    pub fn build(self) -> Result<ProviderRegistry, AgentError> {
        if self.entries.is_empty() {
            return Err(AgentError::NoBackend);
        }
        Ok(ProviderRegistry {
            entries: self.entries,
        })
    }
}
