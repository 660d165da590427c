//! Credential handling for LLM providers.
//!
//! Keys never appear in `Debug` or `Display` output and must be exposed
//! explicitly at the point of use.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::providers::secrets::ApiCredential;
//!
//! // Inline config value first, then each environment variable in order
//! let cred = ApiCredential::resolve(
//!     config.api_key.as_deref(),
//!     &["TOGETHER_API_KEY".into(), "DEEPSEEK_API_KEY".into()],
//!     "together API key",
//! )?;
//!
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Inline `api_key` in the config file
    Config,
    /// The named environment variable
    Environment(String),
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment(var) => write!(f, "environment ({})", var),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: String,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name: name.into(),
        }
    }

    /// Resolve from an inline value, falling back to environment variables
    /// in order. Blank values count as absent.
    pub fn resolve(
        inline: Option<&str>,
        env_vars: &[String],
        name: &str,
    ) -> Result<Self, ProviderError> {
        Self::resolve_with(inline, env_vars, name, |var| std::env::var(var).ok())
    }

    /// [`resolve`](Self::resolve) with an injectable environment lookup.
    pub fn resolve_with<F>(
        inline: Option<&str>,
        env_vars: &[String],
        name: &str,
        lookup: F,
    ) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = inline.filter(|v| !v.trim().is_empty()) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        for var in env_vars {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                return Ok(Self::new(
                    value,
                    CredentialSource::Environment(var.clone()),
                    name,
                ));
            }
        }

        Err(ProviderError::NotConfigured(if env_vars.is_empty() {
            format!("{} required: set 'api_key' in config", name)
        } else {
            format!(
                "{} required: set 'api_key' in config or one of {} in the environment",
                name,
                env_vars.join(", ")
            )
        }))
    }

    /// Check availability without building the credential.
    pub fn is_available(inline: Option<&str>, env_vars: &[String]) -> bool {
        Self::is_available_with(inline, env_vars, |var| std::env::var(var).ok())
    }

    pub fn is_available_with<F>(inline: Option<&str>, env_vars: &[String], lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        inline.is_some_and(|v| !v.trim().is_empty())
            || env_vars
                .iter()
                .any(|var| lookup(var).is_some_and(|v| !v.trim().is_empty()))
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the credential is actually needed (e.g. setting
    /// an HTTP header). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
