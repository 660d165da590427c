//! Provider routing with a single fallback hop.
//!
//! For each request the router picks a primary and at most one fallback,
//! runs the primary under the retry policy, and moves to the fallback only
//! when the primary is blocked, unconfigured or exhausted. The circuit
//! breaker sees exactly one outcome per provider actually attempted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use whisperfire_core::{ParseError, ResponseError, Tab, ValidationError};

use crate::config::RoutingConfig;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError, ProviderId};
use crate::resilience::{CircuitBreaker, RetryPolicy};

/// Why one provider hop did not produce a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HopError {
    #[error("circuit open")]
    CircuitOpen,

    #[error("no credentials configured")]
    NotConfigured,

    #[error(transparent)]
    Transport(#[from] ProviderError),

    #[error(transparent)]
    Parse(ParseError),

    #[error(transparent)]
    Validation(ValidationError),
}

impl HopError {
    /// Whether the same provider is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            HopError::Transport(e) => e.is_retryable(),
            HopError::Parse(_) => true,
            HopError::CircuitOpen | HopError::NotConfigured | HopError::Validation(_) => false,
        }
    }

    /// Whether the provider was never contacted.
    pub fn is_skip(&self) -> bool {
        matches!(self, HopError::CircuitOpen | HopError::NotConfigured)
    }

    /// Short label for logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            HopError::CircuitOpen => "circuit_open",
            HopError::NotConfigured => "not_configured",
            HopError::Transport(_) => "transport",
            HopError::Parse(_) => "no_json",
            HopError::Validation(_) => "bad_schema",
        }
    }
}

impl From<ResponseError> for HopError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Parse(e) => HopError::Parse(e),
            ResponseError::Validation(e) => HopError::Validation(e),
        }
    }
}

/// A hop failure attributed to its provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub cause: HopError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.cause)
    }
}

/// Errors from routing a request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    #[error("No routed provider has credentials (tried {})", join_ids(.providers))]
    NotConfigured { providers: Vec<ProviderId> },

    #[error("All providers failed: primary {primary}{}", fallback_suffix(.fallback))]
    Exhausted {
        primary: ProviderFailure,
        fallback: Option<ProviderFailure>,
    },
}

impl RouterError {
    /// True when no provider was contacted because every one was skipped.
    pub fn nothing_attempted(&self) -> bool {
        match self {
            RouterError::NotConfigured { .. } => true,
            RouterError::Exhausted { primary, fallback } => {
                primary.cause.is_skip() && fallback.as_ref().map_or(true, |f| f.cause.is_skip())
            }
        }
    }
}

fn fallback_suffix(fallback: &Option<ProviderFailure>) -> String {
    match fallback {
        Some(failure) => format!("; fallback {}", failure),
        None => String::new(),
    }
}

fn join_ids(ids: &[ProviderId]) -> String {
    ids.iter().map(ProviderId::as_str).collect::<Vec<_>>().join(", ")
}

/// A routed value and who produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed<T> {
    pub value: T,
    pub provider: ProviderId,
    /// Model reported by the backend
    pub model: String,
}

/// One configured provider. `provider` is `None` when no credentials
/// were found; such a slot is never attempted.
#[derive(Clone)]
pub struct ProviderSlot {
    pub id: ProviderId,
    pub completion: CompletionConfig,
    pub provider: Option<Arc<dyn LlmProvider>>,
}

impl ProviderSlot {
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }
}

impl fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("id", &self.id)
            .field("model", &self.completion.model)
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// Routes completions across a primary and one fallback.
#[derive(Debug)]
pub struct ProviderRouter {
    slots: BTreeMap<ProviderId, ProviderSlot>,
    routing: RoutingConfig,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl ProviderRouter {
    pub fn new(
        slots: impl IntoIterator<Item = ProviderSlot>,
        routing: RoutingConfig,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            slots: slots.into_iter().map(|s| (s.id.clone(), s)).collect(),
            routing,
            retry,
            breaker,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn slots(&self) -> impl Iterator<Item = &ProviderSlot> {
        self.slots.values()
    }

    pub fn is_configured(&self, id: &ProviderId) -> bool {
        self.slots.get(id).is_some_and(ProviderSlot::is_configured)
    }

    /// Primary and fallback for `tab`.
    ///
    /// A forced provider goes first. When it is the configured fallback the
    /// pair swaps; any other forced provider falls back to the primary.
    pub fn plan(&self, tab: Tab) -> (ProviderId, Option<ProviderId>) {
        let primary = self.routing.primary.clone();
        let fallback = self.routing.fallback.clone();

        match self.routing.forced.get(&tab) {
            None => (primary, fallback),
            Some(forced) if *forced == primary => (primary, fallback),
            Some(forced) => (forced.clone(), Some(primary)),
        }
    }

    /// Run `messages` through the planned providers until `accept` takes a
    /// response.
    pub async fn route<T, A>(
        &self,
        tab: Tab,
        messages: &[ChatMessage],
        accept: A,
    ) -> Result<Routed<T>, RouterError>
    where
        A: Fn(&str) -> Result<T, ResponseError> + Sync,
        T: Send,
    {
        let (primary, fallback) = self.plan(tab);

        let routed: Vec<ProviderId> = std::iter::once(primary.clone())
            .chain(fallback.clone())
            .collect();
        if !routed.iter().any(|id| self.is_configured(id)) {
            return Err(RouterError::NotConfigured { providers: routed });
        }

        let primary_failure = match self.hop(&primary, tab, messages, &accept).await {
            Ok(routed) => return Ok(routed),
            Err(cause) => ProviderFailure {
                provider: primary,
                cause,
            },
        };

        let Some(fallback) = fallback else {
            return Err(RouterError::Exhausted {
                primary: primary_failure,
                fallback: None,
            });
        };

        tracing::info!(
            tab = %tab,
            from = %primary_failure.provider,
            to = %fallback,
            reason = primary_failure.cause.outcome(),
            "Falling back to secondary provider"
        );

        match self.hop(&fallback, tab, messages, &accept).await {
            Ok(routed) => Ok(routed),
            Err(cause) => Err(RouterError::Exhausted {
                primary: primary_failure,
                fallback: Some(ProviderFailure {
                    provider: fallback,
                    cause,
                }),
            }),
        }
    }

    /// One provider, retried per policy, with one breaker update.
    async fn hop<T, A>(
        &self,
        id: &ProviderId,
        tab: Tab,
        messages: &[ChatMessage],
        accept: &A,
    ) -> Result<Routed<T>, HopError>
    where
        A: Fn(&str) -> Result<T, ResponseError> + Sync,
        T: Send,
    {
        let Some((slot, provider)) = self
            .slots
            .get(id)
            .and_then(|slot| slot.provider.as_ref().map(|p| (slot, p)))
        else {
            tracing::warn!(provider = %id, tab = %tab, "Provider skipped: no credentials");
            return Err(HopError::NotConfigured);
        };

        if !self.breaker.can_call(id) {
            tracing::warn!(provider = %id, tab = %tab, "Provider skipped: circuit open");
            return Err(HopError::CircuitOpen);
        }

        let completion = &slot.completion;
        let result = self
            .retry
            .run(
                || {
                    let provider = provider.clone();
                    let messages = messages.to_vec();
                    async move {
                        let outcome = call(provider.as_ref(), messages, completion, accept).await;
                        match &outcome {
                            Ok((_, model)) => {
                                tracing::info!(provider = %id, tab = %tab, model = %model, outcome = "ok", "Model call finished");
                            }
                            Err(e) => {
                                tracing::warn!(provider = %id, tab = %tab, outcome = e.outcome(), error = %e, "Model call failed");
                            }
                        }
                        outcome
                    }
                },
                HopError::is_retryable,
            )
            .await;

        match result {
            Ok((value, model)) => {
                self.breaker.record_success(id);
                Ok(Routed {
                    value,
                    provider: id.clone(),
                    model,
                })
            }
            Err(e) => {
                self.breaker.record_failure(id);
                Err(e)
            }
        }
    }
}

async fn call<T, A>(
    provider: &dyn LlmProvider,
    messages: Vec<ChatMessage>,
    completion: &CompletionConfig,
    accept: &A,
) -> Result<(T, String), HopError>
where
    A: Fn(&str) -> Result<T, ResponseError>,
{
    let response = provider.complete(messages, completion).await?;
    let value = accept(&response.content)?;
    Ok((value, response.model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, TokenUsage};
    use crate::resilience::{BreakerStatus, CircuitBreakerConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use whisperfire_core::{accept_response, AnalysisRequest, ContentType, Relationship, Tone};

    const GOOD: &str = r#"{"headline": "Minimizing your feelings", "tactic": {"label": "gaslighting", "confidence": 80}}"#;

    /// Replays scripted replies, repeating the last one when the script runs out.
    struct Scripted {
        name: String,
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        last: Mutex<Option<Result<String, ProviderError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(name: &str, script: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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
                    .unwrap_or_else(|| Err(ProviderError::Http("empty script".into()))),
            };
            reply.map(|content| CompletionResponse {
                content,
                usage: TokenUsage::default(),
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

    fn slot(id: &str, model: &str, provider: Option<Arc<Scripted>>) -> ProviderSlot {
        ProviderSlot {
            id: ProviderId::from(id),
            completion: CompletionConfig {
                model: model.to_string(),
                ..Default::default()
            },
            provider: provider.map(|p| p as Arc<dyn LlmProvider>),
        }
    }

    fn router(
        primary: Option<Arc<Scripted>>,
        fallback: Option<Arc<Scripted>>,
        retry: RetryPolicy,
    ) -> ProviderRouter {
        ProviderRouter::new(
            [
                slot("together", "deepseek-ai/DeepSeek-V3", primary),
                slot("openai", "gpt-4o-mini", fallback),
            ],
            RoutingConfig::default(),
            retry,
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 5,
                reset_window: Duration::from_secs(30),
            })),
        )
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::scan(
            Relationship::Partner,
            Tone::Savage,
            ContentType::Dm,
            "You're overreacting; it was a joke.",
        )
        .unwrap()
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::user("MESSAGE: hi")]
    }

    fn together() -> ProviderId {
        ProviderId::from("together")
    }

    fn openai() -> ProviderId {
        ProviderId::from("openai")
    }

    #[test]
    fn test_plan_defaults_and_forced() {
        let mut r = router(None, None, RetryPolicy::none());
        assert_eq!(r.plan(Tab::Scan), (together(), Some(openai())));

        r.routing.forced.insert(Tab::Pattern, openai());
        r.routing.forced.insert(Tab::Comeback, together());
        assert_eq!(r.plan(Tab::Pattern), (openai(), Some(together())));
        assert_eq!(r.plan(Tab::Comeback), (together(), Some(openai())));

        r.routing.forced.insert(Tab::Scan, ProviderId::from("local"));
        assert_eq!(r.plan(Tab::Scan), (ProviderId::from("local"), Some(together())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_success() {
        let primary = Scripted::new("together", vec![Ok(GOOD)]);
        let fallback = Scripted::new("openai", vec![Ok(GOOD)]);
        let r = router(Some(primary.clone()), Some(fallback.clone()), RetryPolicy::default());
        let req = request();

        let routed = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap();

        assert_eq!(routed.provider, together());
        assert_eq!(routed.model, "deepseek-ai/DeepSeek-V3");
        assert_eq!(routed.value.headline, "Minimizing your feelings");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_fails_over_with_one_breaker_update() {
        let primary = Scripted::new("together", vec![Err(ProviderError::Http("reset".into()))]);
        let fallback = Scripted::new("openai", vec![Ok(GOOD)]);
        let r = router(Some(primary.clone()), Some(fallback.clone()), RetryPolicy::default());
        let req = request();

        let routed = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap();

        assert_eq!(routed.provider, openai());
        assert_eq!(primary.calls(), 2);
        assert_eq!(r.breaker().snapshot(&together()).consecutive_failures, 1);
        assert_eq!(r.breaker().snapshot(&openai()).consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_failure_is_retried_in_place() {
        let primary = Scripted::new("together", vec![Ok("I'd rather not."), Ok(GOOD)]);
        let fallback = Scripted::new("openai", vec![Ok(GOOD)]);
        let r = router(Some(primary.clone()), Some(fallback.clone()), RetryPolicy::default());
        let req = request();

        let routed = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap();

        assert_eq!(routed.provider, together());
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(r.breaker().snapshot(&together()).state, BreakerStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_is_not_retried() {
        let primary = Scripted::new("together", vec![Ok(r#"{"core_take": "no headline"}"#)]);
        let fallback = Scripted::new("openai", vec![Ok(GOOD)]);
        let r = router(Some(primary.clone()), Some(fallback.clone()), RetryPolicy::new(3, Duration::from_millis(10)));
        let req = request();

        let routed = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap();

        assert_eq!(routed.provider, openai());
        assert_eq!(primary.calls(), 1);
        assert_eq!(r.breaker().snapshot(&together()).consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let primary = Scripted::new("together", vec![Err(ProviderError::Auth)]);
        let fallback = Scripted::new("openai", vec![Ok(GOOD)]);
        let r = router(Some(primary.clone()), Some(fallback), RetryPolicy::new(3, Duration::from_millis(10)));
        let req = request();

        r.route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap();
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_fail_carries_both_causes() {
        let primary = Scripted::new("together", vec![Err(ProviderError::Timeout(Duration::from_secs(30)))]);
        let fallback = Scripted::new("openai", vec![Ok("{}")]);
        let r = router(Some(primary), Some(fallback), RetryPolicy::none());
        let req = request();

        let err = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap_err();

        match &err {
            RouterError::Exhausted { primary, fallback } => {
                assert_eq!(primary.provider, together());
                assert!(matches!(primary.cause, HopError::Transport(ProviderError::Timeout(_))));
                let fallback = fallback.as_ref().unwrap();
                assert_eq!(fallback.cause, HopError::Parse(ParseError::EmptyObject));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!err.nothing_attempted());
        assert!(err.to_string().contains("together"));
        assert!(err.to_string().contains("openai"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_primary_is_skipped_and_not_counted() {
        let fallback = Scripted::new("openai", vec![Ok(GOOD)]);
        let r = router(None, Some(fallback.clone()), RetryPolicy::default());
        let req = request();

        let routed = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap();

        assert_eq!(routed.provider, openai());
        assert!(r.breaker().snapshots().get(&together()).is_none());
    }

    #[tokio::test]
    async fn test_nothing_configured() {
        let r = router(None, None, RetryPolicy::default());
        let req = request();

        let err = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RouterError::NotConfigured {
                providers: vec![together(), openai()]
            }
        );
        assert!(err.nothing_attempted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_is_skipped() {
        let primary = Scripted::new("together", vec![Ok(GOOD)]);
        let fallback = Scripted::new("openai", vec![Ok(GOOD)]);
        let r = router(Some(primary.clone()), Some(fallback), RetryPolicy::none());
        for _ in 0..5 {
            r.breaker().record_failure(&together());
        }
        let req = request();

        let routed = r
            .route(Tab::Scan, &messages(), |raw| accept_response(raw, &req))
            .await
            .unwrap();
        assert_eq!(routed.provider, openai());
        assert_eq!(primary.calls(), 0);
        assert_eq!(r.breaker().snapshot(&together()).consecutive_failures, 5);
    }

    #[test]
    fn test_hop_error_labels() {
        assert_eq!(HopError::Parse(ParseError::NoJsonObject).outcome(), "no_json");
        assert_eq!(
            HopError::Validation(ValidationError::Shape("x".into())).outcome(),
            "bad_schema"
        );
        assert_eq!(HopError::Transport(ProviderError::Auth).outcome(), "transport");
        assert!(HopError::Parse(ParseError::EmptyResponse).is_retryable());
        assert!(!HopError::Validation(ValidationError::Shape("x".into())).is_retryable());
    }
}
