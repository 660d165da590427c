//! Shared fixtures for runtime integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use whisperfire_core::{AnalysisRequest, ContentType, Relationship, Tone};
use whisperfire_runtime::{
    ChatMessage, CircuitBreaker, CircuitBreakerConfig, CompletionConfig, CompletionResponse,
    LlmProvider, Orchestrator, ProviderError, ProviderRegistry, ResponseCache, RetryPolicy,
    RuntimeConfig, TokenUsage,
};

pub const SCAN_REPLY: &str = r#"{
  "context": {"tab": "scan", "relationship": "Partner", "tone": "savage", "content_type": "dm", "subject_name": null},
  "headline": "Calling it a joke after the hit lands",
  "core_take": "Minimizes your reaction instead of owning the comment.",
  "tactic": {"label": "gaslighting", "confidence": 0.82},
  "motives": "Avoid accountability",
  "targeting": "Your confidence in your own read",
  "power_play": "Reframe you as the problem",
  "receipts": ["You're overreacting", "it was a joke"],
  "next_moves": "Name the comment, not the joke",
  "suggested_reply": {"style": "one-liner", "text": "Jokes are funny. That wasn't."},
  "safety": {"risk_level": "medium", "notes": "Watch for repetition"},
  "metrics": {"red_flag": 71, "certainty": "80%", "viral_potential": 64},
  "pattern": {"cycle": "should be dropped", "prognosis": "should be dropped"},
  "ambiguity": {"warning": null, "missing_evidence": ["tone of voice"]}
}"#;

pub const PATTERN_REPLY: &str = r#"```json
{
  "headline": "Hot, cold, hot again",
  "tactic": {"label": "Hoovering", "confidence": 77},
  "receipts": ["I miss you", "Fine, forget it", "Why are you ignoring me"],
  "pattern": {"cycle": "Affection, withdrawal, guilt", "prognosis": "Repeats within weeks"},
  "suggested_reply": {"style": "monologue", "text": "I'm stepping back for good."}
}
```"#;

/// Provider replaying a script; the last reply repeats once the script runs out.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<Result<String, ProviderError>>>,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
        Self::with_delay(name, script, Duration::ZERO)
    }

    pub fn with_delay(
        name: &str,
        script: Vec<Result<&str, ProviderError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into_iter().map(|r| r.map(str::to_string)).collect()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            delay,
        })
    }

    pub fn always(name: &str, reply: &str) -> Arc<Self> {
        Self::new(name, vec![Ok(reply)])
    }

    pub fn failing(name: &str, error: ProviderError) -> Arc<Self> {
        Self::new(name, vec![Err(error)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().pop_front();
        let reply = match next {
            Some(reply) => {
                *self.last.lock() = Some(reply.clone());
                reply
            }
            None => self
                .last
                .lock()
                .clone()
                .unwrap_or_else(|| Err(ProviderError::Http("script exhausted".into()))),
        };

        reply.map(|content| CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 400,
                completion_tokens: 250,
            },
            model: config.model.clone(),
            stop_reason: Some("stop".into()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Default config with fast retries and no reachable credentials.
pub fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    for provider in &mut config.providers {
        provider.api_key = None;
        provider.api_key_env = vec![format!("WHISPERFIRE_IT_UNSET_{}", provider.id)];
    }
    config.retry = RetryPolicy::new(1, Duration::from_millis(10));
    config.circuit_breaker = CircuitBreakerConfig {
        failure_threshold: 2,
        reset_window: Duration::from_secs(30),
    };
    config
}

/// Orchestrator over scripted providers with fresh cache and breaker.
pub fn orchestrator(
    config: RuntimeConfig,
    together: Option<Arc<ScriptedProvider>>,
    openai: Option<Arc<ScriptedProvider>>,
) -> Orchestrator {
    let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let cache = ResponseCache::from(&config.cache);

    let mut builder = Orchestrator::builder()
        .config(config)
        .registry(ProviderRegistry::new())
        .breaker(breaker)
        .cache(cache);
    if let Some(p) = together {
        builder = builder.provider("together", p);
    }
    if let Some(p) = openai {
        builder = builder.provider("openai", p);
    }
    builder.build().expect("test orchestrator builds")
}

pub fn scan_request() -> AnalysisRequest {
    serde_json::from_str(
        r#"{
            "tab": "scan",
            "relationship": "Partner",
            "tone": "savage",
            "content_type": "dm",
            "subject_name": null,
            "message": "You're overreacting; it was a joke."
        }"#,
    )
    .expect("valid scan request")
}

pub fn pattern_request() -> AnalysisRequest {
    AnalysisRequest::pattern(
        Relationship::Ex,
        Tone::Clinical,
        ContentType::Dm,
        vec![
            "I miss you".into(),
            "Why are you ignoring me".into(),
            "Fine, forget it".into(),
        ],
    )
    .expect("valid pattern request")
}
