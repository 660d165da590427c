//! Request orchestration.
//!
//! The orchestrator owns one request end to end:
//! - cache lookup by fingerprint
//! - breaker pre-check across the routed providers
//! - prompt rendering and routed provider calls
//! - normalization and schema validation of each response
//! - cache write of the validated result
//!
//! Nothing partial is ever cached or returned.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use whisperfire_core::{accept_response, fingerprint, AnalysisRequest, Fingerprint, NormalizedResult};

use crate::cache::ResponseCache;
use crate::config::{ConfigError, RuntimeConfig};
use crate::prompts::{PromptRenderer, WhisperfirePrompts};
use crate::providers::{LlmProvider, ProviderError, ProviderId, ProviderRegistry};
use crate::resilience::{BreakerSnapshot, CircuitBreaker};
use crate::router::{ProviderFailure, ProviderRouter, ProviderSlot, RouterError};

/// Errors from the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// No routed provider has credentials. Retrying will not help.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every routed, configured provider is refusing calls.
    #[error("Circuit open for {}", join_ids(.providers))]
    CircuitOpen { providers: Vec<ProviderId> },

    #[error("All providers failed: primary {primary}{}", fallback_suffix(.fallback))]
    AllProvidersFailed {
        primary: ProviderFailure,
        fallback: Option<ProviderFailure>,
    },
}

fn join_ids(ids: &[ProviderId]) -> String {
    ids.iter().map(ProviderId::as_str).collect::<Vec<_>>().join(", ")
}

fn fallback_suffix(fallback: &Option<ProviderFailure>) -> String {
    match fallback {
        Some(failure) => format!("; fallback {}", failure),
        None => String::new(),
    }
}

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Provider { id: ProviderId, model: String },
}

impl ResultSource {
    /// Value for the caller's `model_used` field.
    pub fn model_used(&self) -> &str {
        match self {
            ResultSource::Cache => "cache",
            ResultSource::Provider { model, .. } => model,
        }
    }
}

/// A result plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub result: NormalizedResult,
    pub source: ResultSource,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub id: ProviderId,
    pub model: String,
    pub configured: bool,
    pub ready: bool,
    pub breaker: BreakerSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub providers: Vec<ProviderHealth>,
    pub primary: ProviderId,
    pub fallback: Option<ProviderId>,
    pub cache_entries: u64,
}

/// Runs analysis requests against the configured providers.
pub struct Orchestrator {
    router: ProviderRouter,
    cache: ResponseCache,
    prompts: Arc<dyn PromptRenderer>,
    routing_primary: ProviderId,
    routing_fallback: Option<ProviderId>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Build with the default provider registry.
    pub fn from_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        Self::builder().config(config).build()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.router.breaker()
    }

    /// Analyze one request.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<NormalizedResult, OrchestratorError> {
        self.run_detailed(request).await.map(|outcome| outcome.result)
    }

    /// Analyze one request, reporting where the result came from.
    pub async fn run_detailed(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisOutcome, OrchestratorError> {
        let started = Instant::now();
        let tab = request.tab();
        let key = fingerprint(request);

        if let Some(entry) = self.cache.get(&key).await {
            tracing::debug!(tab = %tab, fingerprint = key.short(), "Cache hit");
            return Ok(AnalysisOutcome {
                result: entry.value.as_ref().clone(),
                source: ResultSource::Cache,
                fingerprint: key,
            });
        }
        tracing::debug!(tab = %tab, fingerprint = key.short(), "Cache miss");

        self.check_breakers(request)?;

        let messages = self.prompts.render(request);
        let routed = self
            .router
            .route(tab, &messages, |raw| accept_response(raw, request))
            .await
            .map_err(|e| self.router_error(request, e))?;

        self.cache.insert(key.clone(), routed.value.clone()).await;

        tracing::info!(
            tab = %tab,
            fingerprint = key.short(),
            provider = %routed.provider,
            model = %routed.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            result: routed.value,
            source: ResultSource::Provider {
                id: routed.provider,
                model: routed.model,
            },
            fingerprint: key,
        })
    }

    /// Refuse up front when nothing routed can be called.
    fn check_breakers(&self, request: &AnalysisRequest) -> Result<(), OrchestratorError> {
        let (primary, fallback) = self.router.plan(request.tab());
        let configured: Vec<ProviderId> = std::iter::once(primary)
            .chain(fallback)
            .filter(|id| self.router.is_configured(id))
            .collect();

        if configured.is_empty() {
            return Err(not_configured(request));
        }

        let breaker = self.router.breaker();
        if configured.iter().all(|id| breaker.is_blocked(id)) {
            tracing::warn!(tab = %request.tab(), providers = %join_ids(&configured), "Circuit open for every routed provider");
            return Err(OrchestratorError::CircuitOpen {
                providers: configured,
            });
        }

        Ok(())
    }

    fn router_error(&self, request: &AnalysisRequest, err: RouterError) -> OrchestratorError {
        match err {
            RouterError::NotConfigured { .. } => not_configured(request),
            // Lost a race for the half-open trial: nobody was contacted.
            ref e @ RouterError::Exhausted { .. } if e.nothing_attempted() => {
                let (primary, fallback) = self.router.plan(request.tab());
                OrchestratorError::CircuitOpen {
                    providers: std::iter::once(primary)
                        .chain(fallback)
                        .filter(|id| self.router.is_configured(id))
                        .collect(),
                }
            }
            RouterError::Exhausted { primary, fallback } => {
                tracing::error!(
                    tab = %request.tab(),
                    primary = %primary,
                    fallback = ?fallback.as_ref().map(|f| f.to_string()),
                    "All providers failed"
                );
                OrchestratorError::AllProvidersFailed { primary, fallback }
            }
        }
    }

    /// Per-provider readiness and breaker state.
    pub async fn health(&self) -> HealthReport {
        let mut providers = Vec::new();
        for slot in self.router.slots() {
            let ready = match &slot.provider {
                Some(provider) => provider.health_check().await,
                None => false,
            };
            providers.push(ProviderHealth {
                id: slot.id.clone(),
                model: slot.completion.model.clone(),
                configured: slot.is_configured(),
                ready,
                breaker: self.router.breaker().snapshot(&slot.id),
            });
        }

        self.cache.sync().await;

        HealthReport {
            providers,
            primary: self.routing_primary.clone(),
            fallback: self.routing_fallback.clone(),
            cache_entries: self.cache.entry_count(),
        }
    }
}

fn not_configured(request: &AnalysisRequest) -> OrchestratorError {
    OrchestratorError::Configuration(format!(
        "no provider with credentials is routed for tab '{}'",
        request.tab()
    ))
}

/// Builder for [`Orchestrator`].
///
/// Providers are created from the registry unless one is injected for the
/// same id. Cache and breaker may be shared across orchestrators.
pub struct OrchestratorBuilder {
    config: RuntimeConfig,
    registry: ProviderRegistry,
    providers: BTreeMap<ProviderId, Arc<dyn LlmProvider>>,
    prompts: Arc<dyn PromptRenderer>,
    breaker: Option<Arc<CircuitBreaker>>,
    cache: Option<ResponseCache>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            registry: ProviderRegistry::with_defaults(),
            providers: BTreeMap::new(),
            prompts: Arc::new(WhisperfirePrompts),
            breaker: None,
            cache: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use `provider` for the configured provider `id`.
    pub fn provider(mut self, id: impl Into<ProviderId>, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    pub fn prompts(mut self, prompts: Arc<dyn PromptRenderer>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(mut self) -> Result<Orchestrator, ConfigError> {
        self.config.validate()?;

        if let Some(id) = self
            .providers
            .keys()
            .find(|id| self.config.provider(id).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "injected provider '{}' has no config entry",
                id
            )));
        }

        let mut slots = Vec::with_capacity(self.config.providers.len());
        for provider_config in &self.config.providers {
            let provider = match self.providers.remove(&provider_config.id) {
                Some(provider) => Some(provider),
                None => match self.registry.create(provider_config) {
                    Ok(provider) => Some(provider),
                    Err(ProviderError::NotConfigured(reason)) => {
                        tracing::warn!(provider = %provider_config.id, reason = %reason, "Provider not configured");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(provider = %provider_config.id, error = %e, "Provider unavailable");
                        None
                    }
                },
            };

            slots.push(ProviderSlot {
                id: provider_config.id.clone(),
                completion: provider_config.completion_config(),
                provider,
            });
        }

        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(self.config.circuit_breaker.clone())));
        let cache = self
            .cache
            .unwrap_or_else(|| ResponseCache::from(&self.config.cache));

        let routing = self.config.routing.clone();
        Ok(Orchestrator {
            routing_primary: routing.primary.clone(),
            routing_fallback: routing.fallback.clone(),
            router: ProviderRouter::new(slots, routing, self.config.retry, breaker),
            cache,
            prompts: self.prompts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderRegistry;

    fn keyless_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        for provider in &mut config.providers {
            provider.api_key = None;
            provider.api_key_env = vec![format!("WHISPERFIRE_TEST_UNSET_{}", provider.id)];
        }
        config
    }

    fn scan() -> AnalysisRequest {
        AnalysisRequest::scan(
            whisperfire_core::Relationship::Partner,
            whisperfire_core::Tone::Savage,
            whisperfire_core::ContentType::Dm,
            "You're overreacting; it was a joke.",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_credentials_is_configuration_error() {
        let orchestrator = Orchestrator::builder()
            .config(keyless_config())
            .build()
            .unwrap();

        let err = orchestrator.run(&scan()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
        assert!(err.to_string().contains("scan"));
    }

    #[tokio::test]
    async fn test_health_reports_unconfigured_providers() {
        let orchestrator = Orchestrator::builder()
            .config(keyless_config())
            .registry(ProviderRegistry::with_defaults())
            .build()
            .unwrap();

        let report = orchestrator.health().await;
        assert_eq!(report.providers.len(), 2);
        assert!(report.providers.iter().all(|p| !p.configured && !p.ready));
        assert_eq!(report.primary, ProviderId::from("together"));
        assert_eq!(report.cache_entries, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["providers"][0]["breaker"]["state"], "closed");
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let mut config = keyless_config();
        config.cache.max_entries = 0;
        assert!(Orchestrator::builder().config(config).build().is_err());
    }

    #[test]
    fn test_result_source_model_used() {
        assert_eq!(ResultSource::Cache.model_used(), "cache");
        let source = ResultSource::Provider {
            id: ProviderId::from("openai"),
            model: "gpt-4o-mini".into(),
        };
        assert_eq!(source.model_used(), "gpt-4o-mini");
        assert_eq!(serde_json::to_value(&source).unwrap()["source"], "provider");
    }
}
