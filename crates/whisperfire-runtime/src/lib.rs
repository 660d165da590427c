//! # whisperfire-runtime
//!
//! The networked half of Whisperfire: provider calls and everything that
//! keeps them affordable and available.
//!
//! - [`ResponseCache`]: validated results by request fingerprint (moka)
//! - [`CircuitBreaker`]: per-provider failure containment
//! - [`RetryPolicy`]: bounded linear backoff (backon)
//! - [`ProviderRouter`]: primary plus one fallback hop
//! - [`Orchestrator`]: the request lifecycle tying these together
//!
//! Normalization and schema validation live in `whisperfire-core` and are
//! deterministic.
//!
//! ## Example
//!
//! ```rust,ignore
//! use whisperfire_runtime::{Orchestrator, RuntimeConfig};
//!
//! let orchestrator = Orchestrator::from_config(RuntimeConfig::from_env()?)?;
//! let outcome = orchestrator.run_detailed(&request).await?;
//! println!("{} via {}", outcome.result.headline, outcome.source.model_used());
//! ```

pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod router;

pub use cache::{CacheEntry, ResponseCache};
pub use config::{CacheConfig, ConfigError, ProviderConfig, RoutingConfig, RuntimeConfig};
pub use orchestrator::{
    AnalysisOutcome, HealthReport, Orchestrator, OrchestratorBuilder, OrchestratorError,
    ProviderHealth, ResultSource,
};
pub use prompts::{PromptRenderer, WhisperfirePrompts};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, ProviderId,
    ProviderRegistry, TokenUsage,
};
pub use resilience::{
    BreakerSnapshot, BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    RetryPolicy,
};
pub use router::{HopError, ProviderFailure, ProviderRouter, ProviderSlot, Routed, RouterError};
