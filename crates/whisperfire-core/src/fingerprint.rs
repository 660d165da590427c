//! Content-addressed cache keys.
//!
//! A fingerprint covers only the fields that determine the intended output:
//! tab, relationship, tone, content type, subject name and payload. Rendered
//! prompt text, timestamps and request IDs never contribute.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::types::{AnalysisRequest, ContentType, Payload, Relationship, Tab, Tone};

/// Hex-encoded SHA-256 of a request's semantic fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(String);

/// A string that is not a lowercase hex SHA-256 digest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid fingerprint {0:?}: expected 64 lowercase hex characters")]
pub struct InvalidFingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let is_digest = value.len() == 64
            && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if is_digest {
            Ok(Self(value))
        } else {
            Err(InvalidFingerprint(value))
        }
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct FingerprintKey<'a> {
    tab: Tab,
    relationship: Relationship,
    tone: Tone,
    content_type: ContentType,
    subject_name: Option<&'a str>,
    payload: &'a Payload,
}

/// Derive the cache key for a request.
///
/// The key is rebuilt from the typed request, so the order in which a caller
/// supplied the fields never reaches the digest.
pub fn fingerprint(request: &AnalysisRequest) -> Fingerprint {
    let key = FingerprintKey {
        tab: request.tab(),
        relationship: request.relationship(),
        tone: request.tone(),
        content_type: request.content_type(),
        subject_name: request.subject_name(),
        payload: request.payload(),
    };

    // Serializing plain enums, strings and lists into a Value cannot fail.
    let canonical = serde_json::to_value(&key)
        .map(|value| value.to_string())
        .unwrap_or_default();

    let digest = Sha256::digest(canonical.as_bytes());
    Fingerprint(format!("{:x}", digest))
}
