//! Request model for Whisperfire analyses.
//!
//! An [`AnalysisRequest`] is validated once, at construction, and is
//! immutable afterwards. Deserialization goes through the same checks, so a
//! request that exists is always well-formed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when a request breaks the payload invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Pattern tab requires messages array with at least 2 messages (got {0})")]
    TooFewMessages(usize),

    #[error("Scan/comeback tabs require non-empty message string")]
    EmptyMessage,

    #[error("Tab '{tab}' takes a single message, not a message list")]
    UnexpectedMessageList { tab: Tab },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Which analysis the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    /// Read a single message for manipulation tactics
    Scan,
    /// Draft a reply to a single message
    Comeback,
    /// Read a timeline of messages for a recurring cycle
    Pattern,
}

impl Tab {
    /// All tabs in declaration order.
    pub const ALL: [Tab; 3] = [Tab::Scan, Tab::Comeback, Tab::Pattern];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Scan => "scan",
            Tab::Comeback => "comeback",
            Tab::Pattern => "pattern",
        }
    }

    /// Inclusive bounds on the number of receipts a result must carry.
    pub fn receipt_bounds(&self) -> (usize, usize) {
        match self {
            Tab::Scan | Tab::Comeback => (2, 4),
            Tab::Pattern => (3, 4),
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(Tab::Scan),
            "comeback" => Ok(Tab::Comeback),
            "pattern" => Ok(Tab::Pattern),
            other => Err(format!(
                "Invalid tab '{}': must be scan, comeback, or pattern",
                other
            )),
        }
    }
}

/// Relationship between the user and the message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relationship {
    Partner,
    Ex,
    Date,
    Friend,
    Coworker,
    Family,
    Roommate,
    Stranger,
}

/// Voice of the generated analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Savage,
    Soft,
    Clinical,
}

/// Where the analyzed content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Dm,
    Bio,
    Story,
    Post,
}

/// The analyzed text.
///
/// Serializes untagged: a single message is a JSON string, a timeline is a
/// JSON array. Order of messages is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Message(String),
    Messages(Vec<String>),
}

impl Payload {
    /// Messages in order, regardless of variant.
    pub fn messages(&self) -> Vec<&str> {
        match self {
            Payload::Message(m) => vec![m.as_str()],
            Payload::Messages(ms) => ms.iter().map(String::as_str).collect(),
        }
    }
}

/// The request-derived fields echoed back in every result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub tab: Tab,
    pub relationship: Relationship,
    pub tone: Tone,
    pub content_type: ContentType,
    pub subject_name: Option<String>,
}

/// A validated analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AnalysisRequestWire", into = "AnalysisRequestWire")]
pub struct AnalysisRequest {
    tab: Tab,
    relationship: Relationship,
    tone: Tone,
    content_type: ContentType,
    subject_name: Option<String>,
    payload: Payload,
}

impl AnalysisRequest {
    /// Build a request, enforcing the tab/payload invariant.
    pub fn new(
        tab: Tab,
        relationship: Relationship,
        tone: Tone,
        content_type: ContentType,
        subject_name: Option<String>,
        payload: Payload,
    ) -> Result<Self, RequestError> {
        match (&tab, &payload) {
            (Tab::Pattern, Payload::Messages(ms)) if ms.len() < 2 => {
                return Err(RequestError::TooFewMessages(ms.len()));
            }
            (Tab::Pattern, Payload::Message(_)) => return Err(RequestError::TooFewMessages(1)),
            (Tab::Pattern, Payload::Messages(_)) => {}
            (_, Payload::Message(m)) if m.trim().is_empty() => {
                return Err(RequestError::EmptyMessage);
            }
            (_, Payload::Message(_)) => {}
            (_, Payload::Messages(_)) => {
                return Err(RequestError::UnexpectedMessageList { tab });
            }
        }

        let subject_name = subject_name.filter(|s| !s.trim().is_empty());

        Ok(Self {
            tab,
            relationship,
            tone,
            content_type,
            subject_name,
            payload,
        })
    }

    /// Shorthand for a scan request.
    pub fn scan(
        relationship: Relationship,
        tone: Tone,
        content_type: ContentType,
        message: impl Into<String>,
    ) -> Result<Self, RequestError> {
        Self::new(
            Tab::Scan,
            relationship,
            tone,
            content_type,
            None,
            Payload::Message(message.into()),
        )
    }

    /// Shorthand for a pattern request.
    pub fn pattern(
        relationship: Relationship,
        tone: Tone,
        content_type: ContentType,
        messages: Vec<String>,
    ) -> Result<Self, RequestError> {
        Self::new(
            Tab::Pattern,
            relationship,
            tone,
            content_type,
            None,
            Payload::Messages(messages),
        )
    }

    /// Return a copy with the subject name set.
    pub fn with_subject_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.subject_name = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn relationship(&self) -> Relationship {
        self.relationship
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn subject_name(&self) -> Option<&str> {
        self.subject_name.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The context object a result must echo.
    pub fn context(&self) -> Context {
        Context {
            tab: self.tab,
            relationship: self.relationship,
            tone: self.tone,
            content_type: self.content_type,
            subject_name: self.subject_name.clone(),
        }
    }
}

/// Wire shape accepted from callers: `message` for scan/comeback,
/// `messages` for pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnalysisRequestWire {
    tab: Tab,
    relationship: Relationship,
    tone: Tone,
    content_type: ContentType,
    #[serde(default)]
    subject_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<String>>,
}

impl TryFrom<AnalysisRequestWire> for AnalysisRequest {
    type Error = RequestError;

    fn try_from(wire: AnalysisRequestWire) -> Result<Self, Self::Error> {
        let payload = match wire.tab {
            Tab::Pattern => Payload::Messages(
                wire.messages
                    .ok_or(RequestError::MissingField("messages"))?,
            ),
            Tab::Scan | Tab::Comeback => {
                Payload::Message(wire.message.ok_or(RequestError::MissingField("message"))?)
            }
        };

        AnalysisRequest::new(
            wire.tab,
            wire.relationship,
            wire.tone,
            wire.content_type,
            wire.subject_name,
            payload,
        )
    }
}

impl From<AnalysisRequest> for AnalysisRequestWire {
    fn from(request: AnalysisRequest) -> Self {
        let (message, messages) = match request.payload {
            Payload::Message(m) => (Some(m), None),
            Payload::Messages(ms) => (None, Some(ms)),
        };

        Self {
            tab: request.tab,
            relationship: request.relationship,
            tone: request.tone,
            content_type: request.content_type,
            subject_name: request.subject_name,
            message,
            messages,
        }
    }
}
