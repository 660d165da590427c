//! Provider factory pattern for building providers from configuration.
//!
//! Each [`ProviderConfig`] names a `kind`; the registry maps kinds to
//! factories. Adding a backend means registering a factory, not editing an
//! enum.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create(&ProviderConfig::together())?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{LlmProvider, ProviderError};
use crate::config::ProviderConfig;

/// Factory for creating LLM providers from configuration.
pub trait ProviderFactory: Send + Sync {
    /// Value of `ProviderConfig::kind` this factory serves.
    fn kind(&self) -> &'static str;

    /// Create a provider instance. Fails with `NotConfigured` when no
    /// credential can be resolved.
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate configuration without creating a provider.
    fn validate_config(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        if !config.has_credentials() {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{}'",
                config.id
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "LLM Provider"
    }
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory, replacing any factory of the same kind.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.kind().to_string(), factory);
    }

    /// Create a provider from its configuration.
    pub fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(&config.kind)?.create(config)
    }

    /// Validate configuration for a provider.
    pub fn validate(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        self.factory(&config.kind)?.validate_config(config)
    }

    /// List available provider kinds.
    pub fn available_kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    fn factory(&self, kind: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(kind).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider kind: '{}'. Available: {:?}",
                kind,
                self.available_kinds()
            ))
        })
    }

    /// Create a registry with all built-in providers registered.
    #[cfg(feature = "openai")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }

    /// Create a registry with all built-in providers registered.
    #[cfg(not(feature = "openai"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.available_kinds())
            .finish()
    }
}
