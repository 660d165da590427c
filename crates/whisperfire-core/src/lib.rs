//! # whisperfire-core
//!
//! Deterministic pieces of the Whisperfire analysis pipeline.
//!
//! This crate owns everything that does not touch the network:
//! - the validated request model ([`AnalysisRequest`])
//! - content-addressed cache keys ([`fingerprint`])
//! - normalization of loosely-shaped model output ([`normalize`])
//! - the JSON Schema gate ([`SchemaValidator`])
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same request and same raw text always yield the same result
//! 2. **No I/O**: provider calls, caching and retries live in `whisperfire-runtime`
//! 3. **Schema-exact**: a [`NormalizedResult`] only exists after validation passes
//!
//! ## Example
//!
//! ```rust
//! use whisperfire_core::{accept_response, AnalysisRequest, ContentType, Relationship, Tone};
//!
//! let request = AnalysisRequest::scan(
//!     Relationship::Partner,
//!     Tone::Savage,
//!     ContentType::Dm,
//!     "You're overreacting; it was a joke.",
//! )?;
//!
//! let raw = r#"{"headline": "Textbook minimization", "tactic": {"label": "gaslighting", "confidence": 0.8}}"#;
//! let result = accept_response(raw, &request)?;
//! assert_eq!(result.tactic.confidence, 80);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod fingerprint;
pub mod normalize;
pub mod result;
pub mod schema;
pub mod types;

pub use fingerprint::{fingerprint, Fingerprint, InvalidFingerprint};
pub use normalize::{normalize, Candidate, ParseError};
pub use result::{
    Ambiguity, Forecast, Metrics, NormalizedResult, PatternReading, ReplyStyle, RiskLevel, Safety,
    SuggestedReply, TabExtras, Tactic, TacticLabel,
};
pub use schema::{SchemaValidator, ValidationError};
pub use types::{
    AnalysisRequest, ContentType, Context, Payload, Relationship, RequestError, Tab, Tone,
};

use thiserror::Error;

/// Why a raw model response was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ResponseError {
    /// Parse failures are worth another attempt; a result that normalized but
    /// still fails the schema is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResponseError::Parse(_))
    }
}

/// Normalize and validate one raw model response.
///
/// This is the whole deterministic half of the pipeline.
pub fn accept_response(
    raw: &str,
    request: &AnalysisRequest,
) -> Result<NormalizedResult, ResponseError> {
    let candidate = normalize(raw, request)?;
    let result = SchemaValidator::new().validate(candidate)?;
    Ok(result)
}
