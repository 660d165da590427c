//! Map free-form model labels onto the closed vocabularies.
//!
//! Unknown input always lands on a safe default, never an error.

use crate::result::{ReplyStyle, RiskLevel, TacticLabel};

/// Case-fold, turn `-`, `_` and `/` into spaces, collapse whitespace and
/// strip surrounding punctuation.
fn key(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if matches!(c, '-' | '_' | '/') { ' ' } else { c })
        .collect::<String>()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn tactic(raw: &str) -> TacticLabel {
    match key(raw).as_str() {
        "gaslighting" | "gaslight" | "gaslit" | "reality distortion" | "minimizing"
        | "minimization" | "minimising" => TacticLabel::Gaslighting,
        "guilt tripping" | "guilt trip" | "guilt tripped" | "guilting" | "emotional blackmail" => {
            TacticLabel::GuiltTripping
        }
        "deflection" | "deflecting" | "blame shifting" | "whataboutism" => TacticLabel::Deflection,
        "darvo" | "playing the victim" | "victim playing" | "reverse victim" => TacticLabel::Darvo,
        "passive aggression" | "passive aggressive" | "passive aggressiveness" | "sarcasm" => {
            TacticLabel::PassiveAggression
        }
        "love bombing" | "love bomb" | "lovebombing" => TacticLabel::LoveBombing,
        "breadcrumbing" | "breadcrumb" | "breadcrumbs" => TacticLabel::Breadcrumbing,
        "shaming" | "shame" | "belittling" | "humiliation" => TacticLabel::Shaming,
        "silent treatment" | "stonewalling" | "withholding" | "ghosting" => {
            TacticLabel::SilentTreatment
        }
        "control test" | "boundary testing" | "testing boundaries" | "controlling" => {
            TacticLabel::ControlTest
        }
        "triangulation" | "triangulating" | "jealousy induction" => TacticLabel::Triangulation,
        "emotional baiting" | "baiting" | "bait" | "threat" | "threats" | "intimidation"
        | "provocation" => TacticLabel::EmotionalBaiting,
        "future faking" | "future fake" | "false promises" => TacticLabel::FutureFaking,
        "hoovering" | "hoover" | "hoovering attempt" => TacticLabel::Hoovering,
        // Conciliatory or neutral readings are not tactics.
        "none detected" | "none" | "no tactic" | "n a" | "appeasement" | "accountability"
        | "apology" | "apology and reconciliation" => TacticLabel::NoneDetected,
        _ => TacticLabel::NoneDetected,
    }
}

pub fn reply_style(raw: &str) -> ReplyStyle {
    match key(raw).as_str() {
        "one liner" | "oneliner" | "one line" => ReplyStyle::OneLiner,
        "reverse uno" | "uno reverse" | "reverse" => ReplyStyle::ReverseUno,
        "screenshot bait" | "screenshot" => ReplyStyle::ScreenshotBait,
        "monologue" | "long form" | "longform" => ReplyStyle::Monologue,
        _ => ReplyStyle::Clipped,
    }
}

pub fn risk_level(raw: &str) -> RiskLevel {
    match key(raw).as_str() {
        "moderate" | "medium" | "med" | "elevated" => RiskLevel::Moderate,
        "high" => RiskLevel::High,
        "critical" | "severe" | "extreme" | "urgent" | "emergency" => RiskLevel::Critical,
        _ => RiskLevel::Low,
    }
}
