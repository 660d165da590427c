//! JSON Schema gate for analysis results.
//!
//! Results are validated against schema/analysis.schema.json, which is
//! embedded at compile time and compiled once.

use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

use crate::normalize::Candidate;
use crate::result::NormalizedResult;

/// Embedded result schema.
const ANALYSIS_SCHEMA_JSON: &str = include_str!("../schema/analysis.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from result validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Failed to load schema: {0}")]
    SchemaLoad(String),

    #[error("Schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Result does not match the typed shape: {0}")]
    Shape(String),
}

/// Admits candidates that satisfy the result schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check a normalized candidate. On success the candidate becomes a
    /// [`NormalizedResult`].
    pub fn validate(&self, candidate: Candidate) -> Result<NormalizedResult, ValidationError> {
        let value = serde_json::to_value(candidate.peek())
            .map_err(|e| ValidationError::Shape(e.to_string()))?;
        self.check(&value)?;
        Ok(candidate.into_inner())
    }

    /// Check an arbitrary JSON value and decode it.
    pub fn validate_value(&self, value: &Value) -> Result<NormalizedResult, ValidationError> {
        self.check(value)?;
        serde_json::from_value(value.clone()).map_err(|e| ValidationError::Shape(e.to_string()))
    }

    /// Check a JSON value against the schema without decoding it.
    ///
    /// Reports every violation as `"<message> at <instance path>"`.
    pub fn check(&self, value: &Value) -> Result<(), ValidationError> {
        let violations: Vec<String> = Self::compiled()?
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Schema(violations))
        }
    }

    fn compiled() -> Result<&'static jsonschema::Validator, ValidationError> {
        COMPILED_SCHEMA
            .get_or_init(|| {
                let schema: Value = serde_json::from_str(ANALYSIS_SCHEMA_JSON)
                    .map_err(|e| format!("Invalid schema JSON: {}", e))?;
                jsonschema::options()
                    .build(&schema)
                    .map_err(|e| format!("Failed to compile schema: {}", e))
            })
            .as_ref()
            .map_err(|e| ValidationError::SchemaLoad(e.clone()))
    }
}
