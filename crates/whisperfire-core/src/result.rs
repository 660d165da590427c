//! The canonical analysis result.
//!
//! Every response that leaves the system has exactly this shape. Values are
//! produced by the normalizer and admitted by the schema validator; nothing
//! else constructs them on the hot path.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Context;

/// Maximum lengths (in characters) of free-text fields.
pub mod limits {
    pub const HEADLINE: usize = 120;
    pub const CORE_TAKE: usize = 500;
    pub const MOTIVES: usize = 200;
    pub const TARGETING: usize = 120;
    pub const POWER_PLAY: usize = 120;
    pub const NEXT_MOVES: usize = 120;
    pub const RECEIPT: usize = 200;
    pub const RECEIPT_BACKFILL: usize = 120;
    pub const REPLY_TEXT: usize = 300;
    pub const SAFETY_NOTES: usize = 200;
    pub const PATTERN_TEXT: usize = 200;
    pub const AMBIGUITY_TEXT: usize = 200;
    pub const MISSING_EVIDENCE_ITEMS: usize = 5;
    pub const TAG: usize = 120;
    pub const ALT_REPLY: usize = 200;
    pub const PATTERN_QUOTE: usize = 200;
    pub const CONTRADICTION_ITEMS: usize = 4;
    pub const ARSENAL_ITEMS: usize = 5;
    pub const FORECAST_ITEMS: usize = 4;
    pub const FORECAST_WINDOW: usize = 40;
    pub const FORECAST_EVENT: usize = 120;
}

/// Canonical manipulation tactics, plus the explicit "nothing found" tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TacticLabel {
    Gaslighting,
    #[serde(rename = "Guilt Tripping")]
    GuiltTripping,
    Deflection,
    #[serde(rename = "DARVO")]
    Darvo,
    #[serde(rename = "Passive Aggression")]
    PassiveAggression,
    #[serde(rename = "Love Bombing")]
    LoveBombing,
    Breadcrumbing,
    Shaming,
    #[serde(rename = "Silent Treatment")]
    SilentTreatment,
    #[serde(rename = "Control Test")]
    ControlTest,
    Triangulation,
    #[serde(rename = "Emotional Baiting")]
    EmotionalBaiting,
    #[serde(rename = "Future Faking")]
    FutureFaking,
    Hoovering,
    #[serde(rename = "None Detected")]
    NoneDetected,
}

impl TacticLabel {
    /// Every allowed label, canonical tactics first.
    pub const ALL: [TacticLabel; 15] = [
        TacticLabel::Gaslighting,
        TacticLabel::GuiltTripping,
        TacticLabel::Deflection,
        TacticLabel::Darvo,
        TacticLabel::PassiveAggression,
        TacticLabel::LoveBombing,
        TacticLabel::Breadcrumbing,
        TacticLabel::Shaming,
        TacticLabel::SilentTreatment,
        TacticLabel::ControlTest,
        TacticLabel::Triangulation,
        TacticLabel::EmotionalBaiting,
        TacticLabel::FutureFaking,
        TacticLabel::Hoovering,
        TacticLabel::NoneDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TacticLabel::Gaslighting => "Gaslighting",
            TacticLabel::GuiltTripping => "Guilt Tripping",
            TacticLabel::Deflection => "Deflection",
            TacticLabel::Darvo => "DARVO",
            TacticLabel::PassiveAggression => "Passive Aggression",
            TacticLabel::LoveBombing => "Love Bombing",
            TacticLabel::Breadcrumbing => "Breadcrumbing",
            TacticLabel::Shaming => "Shaming",
            TacticLabel::SilentTreatment => "Silent Treatment",
            TacticLabel::ControlTest => "Control Test",
            TacticLabel::Triangulation => "Triangulation",
            TacticLabel::EmotionalBaiting => "Emotional Baiting",
            TacticLabel::FutureFaking => "Future Faking",
            TacticLabel::Hoovering => "Hoovering",
            TacticLabel::NoneDetected => "None Detected",
        }
    }
}

impl fmt::Display for TacticLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the suggested reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStyle {
    Clipped,
    OneLiner,
    ReverseUno,
    ScreenshotBait,
    Monologue,
}

/// Ordinal safety classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tactic {
    pub label: TacticLabel,
    /// 0..=100
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedReply {
    pub style: ReplyStyle,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Safety {
    pub risk_level: RiskLevel,
    pub notes: String,
}

/// Scores, each an integer in 0..=100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub red_flag: u8,
    pub certainty: u8,
    pub viral_potential: u8,
}

/// Recurring-cycle reading. Always null outside the pattern tab.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatternReading {
    pub cycle: Option<String>,
    pub prognosis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ambiguity {
    pub warning: Option<String>,
    #[serde(default)]
    pub missing_evidence: Vec<String>,
}

/// One forecast entry for the pattern tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    pub window: String,
    pub event: String,
    /// 0..=100
    pub likelihood: u8,
}

/// Optional tab-specific fields. Absent fields are omitted from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabExtras {
    // scan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identified_tactic: Option<String>,

    // comeback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savage_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_cold_dismissal: Option<String>,

    // pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contradiction_audit: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psychological_weapons_arsenal: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_shock_forecast: Option<Vec<Forecast>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_quote: Option<String>,
}

/// A schema-exact analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub context: Context,
    pub headline: String,
    pub core_take: String,
    pub tactic: Tactic,
    pub motives: String,
    pub targeting: String,
    pub power_play: String,
    pub receipts: Vec<String>,
    pub next_moves: String,
    pub suggested_reply: SuggestedReply,
    pub safety: Safety,
    pub metrics: Metrics,
    pub pattern: PatternReading,
    pub ambiguity: Ambiguity,
    #[serde(flatten)]
    pub extras: TabExtras,
}
