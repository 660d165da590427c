//! Runtime configuration.
//!
//! Loaded from YAML (durations in humantime notation such as `30s` or `5m`),
//! then adjusted by environment overrides. Defaults reproduce the production
//! deployment: Together-hosted DeepSeek as primary, OpenAI as fallback.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use whisperfire_core::Tab;

use crate::cache::ResponseCache;
use crate::providers::{ApiCredential, CompletionConfig, ProviderError, ProviderId};
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}={value:?}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for humantime durations (`"200ms"`, `"5m"`).
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// One OpenAI-compatible backend.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,

    /// Factory key in the [`ProviderRegistry`](crate::providers::ProviderRegistry)
    #[serde(default = "default_kind")]
    pub kind: String,

    pub model: String,

    pub base_url: String,

    /// Inline key. Prefer `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variables consulted in order
    #[serde(default)]
    pub api_key_env: Vec<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,

    #[serde(default = "default_true")]
    pub json_mode: bool,
}

fn default_kind() -> String {
    "openai".to_string()
}

fn default_max_tokens() -> u32 {
    1800
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Together-hosted DeepSeek, the default primary.
    pub fn together() -> Self {
        Self {
            id: ProviderId::from("together"),
            kind: default_kind(),
            model: "deepseek-ai/DeepSeek-V3".to_string(),
            base_url: "https://api.together.ai/v1".to_string(),
            api_key: None,
            api_key_env: vec!["TOGETHER_API_KEY".into(), "DEEPSEEK_API_KEY".into()],
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout: default_timeout(),
            json_mode: true,
        }
    }

    /// OpenAI, the default fallback.
    pub fn openai() -> Self {
        Self {
            id: ProviderId::from("openai"),
            kind: default_kind(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: vec!["OPENAI_API_KEY".into()],
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout: default_timeout(),
            json_mode: true,
        }
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: 1.0,
            timeout: self.timeout,
            json_mode: self.json_mode,
        }
    }

    /// Whether a non-blank key is reachable for this provider.
    pub fn has_credentials(&self) -> bool {
        ApiCredential::is_available(self.api_key.as_deref(), &self.api_key_env)
    }

    pub fn credential(&self) -> Result<ApiCredential, ProviderError> {
        ApiCredential::resolve(
            self.api_key.as_deref(),
            &self.api_key_env,
            &format!("{} API key", self.id),
        )
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

/// Which provider serves which tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub primary: ProviderId,

    #[serde(default)]
    pub fallback: Option<ProviderId>,

    /// Per-tab override of the first provider tried
    #[serde(default)]
    pub forced: BTreeMap<Tab, ProviderId>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary: ProviderId::from("together"),
            fallback: Some(ProviderId::from("openai")),
            forced: BTreeMap::new(),
        }
    }
}

/// Response cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub providers: Vec<ProviderConfig>,
    pub routing: RoutingConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            providers: vec![ProviderConfig::together(), ProviderConfig::openai()],
            routing: RoutingConfig::default(),
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Defaults plus process environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`. Unset or blank variables are ignored;
    /// unparseable ones are errors.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("PRIMARY_MODEL") {
            let primary = self.routing.primary.clone();
            if let Some(provider) = self.provider_mut(&primary) {
                provider.model = model.trim().to_string();
            }
        }
        if let Some(model) = get("FALLBACK_MODEL") {
            if let Some(fallback) = self.routing.fallback.clone() {
                if let Some(provider) = self.provider_mut(&fallback) {
                    provider.model = model.trim().to_string();
                }
            }
        }
        if let Some(value) = get("CB_FAILS") {
            self.circuit_breaker.failure_threshold = parse_env("CB_FAILS", &value)?;
        }
        if let Some(value) = get("CB_RESET_MS") {
            self.circuit_breaker.reset_window =
                Duration::from_millis(parse_env("CB_RESET_MS", &value)?);
        }
        if let Some(value) = get("CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_env("CACHE_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = get("CACHE_TTL_MS") {
            self.cache.ttl = Duration::from_millis(parse_env("CACHE_TTL_MS", &value)?);
        }
        if let Some(value) = get("RETRY_ATTEMPTS") {
            self.retry.attempts = parse_env("RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = get("RETRY_BASE_MS") {
            self.retry.base_delay = Duration::from_millis(parse_env("RETRY_BASE_MS", &value)?);
        }
        if let Some(value) = get("FORCE_PROVIDER_TABS") {
            self.routing.forced = parse_forced_tabs(&value)?;
        }

        Ok(())
    }

    pub fn provider(&self, id: &ProviderId) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| &p.id == id)
    }

    fn provider_mut(&mut self, id: &ProviderId) -> Option<&mut ProviderConfig> {
        self.providers.iter_mut().find(|p| &p.id == id)
    }

    /// Reject configurations the runtime cannot operate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for provider in &self.providers {
            if provider.id.as_str().trim().is_empty() {
                return Err(ConfigError::Invalid("provider id must not be empty".into()));
            }
            if !seen.insert(&provider.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
            if provider.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has no model",
                    provider.id
                )));
            }
            if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
            {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}': base_url must start with http:// or https://",
                    provider.id
                )));
            }
            if provider.max_tokens == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}': max_tokens must be positive",
                    provider.id
                )));
            }
        }

        let known = |id: &ProviderId| self.provider(id).is_some();
        if !known(&self.routing.primary) {
            return Err(ConfigError::Invalid(format!(
                "routing.primary '{}' is not a configured provider",
                self.routing.primary
            )));
        }
        if let Some(fallback) = &self.routing.fallback {
            if !known(fallback) {
                return Err(ConfigError::Invalid(format!(
                    "routing.fallback '{}' is not a configured provider",
                    fallback
                )));
            }
            if fallback == &self.routing.primary {
                return Err(ConfigError::Invalid(
                    "routing.fallback must differ from routing.primary".into(),
                ));
            }
        }
        for (tab, id) in &self.routing.forced {
            if !known(id) {
                return Err(ConfigError::Invalid(format!(
                    "routing.forced.{} '{}' is not a configured provider",
                    tab, id
                )));
            }
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be positive".into()));
        }
        if self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid("cache.ttl must be positive".into()));
        }
        if self.cache.ttl > ResponseCache::MAX_TTL {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl must not exceed {}",
                humantime::format_duration(ResponseCache::MAX_TTL)
            )));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be positive".into(),
            ));
        }
        if self.circuit_breaker.reset_window.is_zero() {
            return Err(ConfigError::Invalid(
                "circuit_breaker.reset_window must be positive".into(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `"pattern=openai, comeback=openai"`
fn parse_forced_tabs(value: &str) -> Result<BTreeMap<Tab, ProviderId>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnv {
        var: "FORCE_PROVIDER_TABS",
        value: value.to_string(),
        reason,
    };

    let mut forced = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (tab, provider) = pair
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected tab=provider, got '{}'", pair)))?;
        let tab: Tab = tab.parse().map_err(invalid)?;
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(invalid(format!("missing provider for tab '{}'", tab)));
        }
        forced.insert(tab, ProviderId::from(provider));
    }
    Ok(forced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_match_production() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());

        let primary = config.provider(&config.routing.primary).unwrap();
        assert_eq!(primary.model, "deepseek-ai/DeepSeek-V3");
        assert_eq!(primary.api_key_env, vec!["TOGETHER_API_KEY", "DEEPSEEK_API_KEY"]);

        let fallback = config
            .provider(config.routing.fallback.as_ref().unwrap())
            .unwrap();
        assert_eq!(fallback.model, "gpt-4o-mini");

        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.reset_window, Duration::from_secs(30));
        assert_eq!(config.retry.attempts, 1);
        assert_eq!(config.retry.base_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_yaml_with_humantime_durations() {
        let yaml = r#"
providers:
  - id: local
    model: llama-3.1-8b
    base_url: http://localhost:8080/v1
    api_key: local-dev
    timeout: 5s
  - id: openai
    model: gpt-4o-mini
    base_url: https://api.openai.com/v1
    api_key_env: [OPENAI_API_KEY]
routing:
  primary: local
  fallback: openai
  forced:
    pattern: openai
cache:
  max_entries: 50
  ttl: 90s
circuit_breaker:
  failure_threshold: 2
  reset_window: 1m
retry:
  attempts: 2
  base_delay: 50ms
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        let local = config.provider(&ProviderId::from("local")).unwrap();
        assert_eq!(local.kind, "openai");
        assert_eq!(local.timeout, Duration::from_secs(5));
        assert_eq!(local.max_tokens, 1800);
        assert!(local.json_mode);

        assert_eq!(config.routing.forced[&Tab::Pattern], ProviderId::from("openai"));
        assert_eq!(config.cache.ttl, Duration::from_secs(90));
        assert_eq!(config.circuit_breaker.reset_window, Duration::from_secs(60));
        assert_eq!(config.retry.base_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = RuntimeConfig::from_yaml("cache:\n  max_entries: 10\n  ttl: 1m\n").unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(env(&[
                ("PRIMARY_MODEL", "deepseek-ai/DeepSeek-R1"),
                ("FALLBACK_MODEL", "gpt-4o"),
                ("CB_FAILS", "3"),
                ("CB_RESET_MS", "1500"),
                ("CACHE_MAX_ENTRIES", "42"),
                ("CACHE_TTL_MS", "60000"),
                ("RETRY_ATTEMPTS", "0"),
                ("RETRY_BASE_MS", "10"),
                ("FORCE_PROVIDER_TABS", "pattern=openai, comeback=openai"),
            ]))
            .unwrap();

        assert_eq!(
            config.provider(&"together".into()).unwrap().model,
            "deepseek-ai/DeepSeek-R1"
        );
        assert_eq!(config.provider(&"openai".into()).unwrap().model, "gpt-4o");
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.reset_window, Duration::from_millis(1500));
        assert_eq!(config.cache.max_entries, 42);
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.retry.attempts, 0);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.routing.forced.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_overrides(env(&[("CB_FAILS", "five")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "CB_FAILS", .. }));

        let err = config
            .apply_overrides(env(&[("FORCE_PROVIDER_TABS", "timeline=openai")]))
            .unwrap_err();
        assert!(err.to_string().contains("FORCE_PROVIDER_TABS"));
    }

    #[test]
    fn test_blank_env_value_is_ignored() {
        let mut config = RuntimeConfig::default();
        config.apply_overrides(env(&[("CB_FAILS", "  ")])).unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_validate_rejects_bad_routing() {
        let mut config = RuntimeConfig::default();
        config.routing.fallback = Some(config.routing.primary.clone());
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.routing.primary = ProviderId::from("anthropic");
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.routing.forced.insert(Tab::Scan, ProviderId::from("nobody"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = RuntimeConfig::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_cache_ttl() {
        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(env(&[("CACHE_TTL_MS", "40000000000000")]))
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("cache.ttl")));

        config.cache.ttl = ResponseCache::MAX_TTL;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inline_key_not_in_debug_or_yaml() {
        let mut provider = ProviderConfig::openai();
        provider.api_key = Some("sk-inline-secret".into());

        assert!(!format!("{:?}", provider).contains("sk-inline-secret"));
        assert!(!serde_yaml::to_string(&provider).unwrap().contains("sk-inline-secret"));
        assert!(provider.has_credentials());
    }
}
