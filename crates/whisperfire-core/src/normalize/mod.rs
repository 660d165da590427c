//! Turn raw model text into a schema-shaped candidate result.
//!
//! Normalization is total once a JSON object has been found: every field is
//! coerced, capped, aliased or defaulted. The only failure is not finding an
//! object at all.

pub mod aliases;
pub mod coerce;
pub mod extract;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::result::{
    limits, Ambiguity, Forecast, Metrics, NormalizedResult, PatternReading, Safety,
    SuggestedReply, Tactic, TabExtras,
};
use crate::types::{AnalysisRequest, Context, Tab};

pub use extract::extract_object;

/// Receipt used when neither the model nor the request has anything left to quote.
pub const RECEIPT_PLACEHOLDER: &str = "No further quotable evidence in the provided text";

/// Errors from locating JSON in model output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Model returned invalid JSON format")]
    NoJsonObject,

    #[error("Model returned an empty JSON object")]
    EmptyObject,
}

/// A normalized result that has not yet passed schema validation.
///
/// Only [`crate::schema::SchemaValidator`] turns a candidate into a
/// [`NormalizedResult`] callers can keep.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    result: NormalizedResult,
}

impl Candidate {
    /// Read-only view for inspection and logging.
    pub fn peek(&self) -> &NormalizedResult {
        &self.result
    }

    pub(crate) fn into_inner(self) -> NormalizedResult {
        self.result
    }
}

/// Extract and normalize a model response for `request`.
pub fn normalize(raw: &str, request: &AnalysisRequest) -> Result<Candidate, ParseError> {
    let object = extract_object(raw)?;
    Ok(normalize_object(&object, request))
}

/// Normalize an already-extracted JSON object.
pub fn normalize_object(json: &Map<String, Value>, request: &AnalysisRequest) -> Candidate {
    let tab = request.tab();

    let headline = coerce::text(json.get("headline"), limits::HEADLINE);
    let core_take = coerce::text(json.get("core_take"), limits::CORE_TAKE);
    let receipts = receipts(json, request, &headline, &core_take);

    let result = NormalizedResult {
        context: context(json, request),
        tactic: tactic(json),
        motives: coerce::text(json.get("motives"), limits::MOTIVES),
        targeting: coerce::text(json.get("targeting"), limits::TARGETING),
        power_play: coerce::text(json.get("power_play"), limits::POWER_PLAY),
        next_moves: coerce::text_joined(json.get("next_moves"), limits::NEXT_MOVES, " · "),
        suggested_reply: suggested_reply(json),
        safety: safety(json),
        metrics: metrics(json),
        pattern: pattern(json, tab),
        ambiguity: ambiguity(json),
        extras: extras(json, tab),
        headline,
        core_take,
        receipts,
    };

    Candidate { result }
}

fn field<'a>(json: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(json.get(*first)?, |value, key| value.get(*key))
}

/// The model's echo is kept only if it is well-formed and names the right tab.
fn context(json: &Map<String, Value>, request: &AnalysisRequest) -> Context {
    let expected = request.context();
    match json
        .get("context")
        .and_then(|v| serde_json::from_value::<Context>(v.clone()).ok())
    {
        Some(echo) if echo.tab == expected.tab => echo,
        Some(_) => {
            debug!(tab = %expected.tab, "model echoed a different tab; using request context");
            expected
        }
        None => expected,
    }
}

fn tactic(json: &Map<String, Value>) -> Tactic {
    match json.get("tactic") {
        // A bare label with no confidence attached.
        Some(Value::String(label)) => Tactic {
            label: aliases::tactic(label),
            confidence: 0,
        },
        _ => Tactic {
            label: aliases::tactic(coerce::label(field(json, &["tactic", "label"]))),
            confidence: coerce::score(field(json, &["tactic", "confidence"])),
        },
    }
}

fn suggested_reply(json: &Map<String, Value>) -> SuggestedReply {
    SuggestedReply {
        style: aliases::reply_style(coerce::label(field(json, &["suggested_reply", "style"]))),
        text: coerce::text(field(json, &["suggested_reply", "text"]), limits::REPLY_TEXT),
    }
}

fn safety(json: &Map<String, Value>) -> Safety {
    Safety {
        risk_level: aliases::risk_level(coerce::label(field(json, &["safety", "risk_level"]))),
        notes: coerce::text(field(json, &["safety", "notes"]), limits::SAFETY_NOTES),
    }
}

fn metrics(json: &Map<String, Value>) -> Metrics {
    Metrics {
        red_flag: coerce::score(field(json, &["metrics", "red_flag"])),
        certainty: coerce::score(field(json, &["metrics", "certainty"])),
        viral_potential: coerce::score(field(json, &["metrics", "viral_potential"])),
    }
}

fn pattern(json: &Map<String, Value>, tab: Tab) -> PatternReading {
    if tab != Tab::Pattern {
        return PatternReading::default();
    }
    PatternReading {
        cycle: coerce::optional_text(field(json, &["pattern", "cycle"]), limits::PATTERN_TEXT),
        prognosis: coerce::optional_text(
            field(json, &["pattern", "prognosis"]),
            limits::PATTERN_TEXT,
        ),
    }
}

fn ambiguity(json: &Map<String, Value>) -> Ambiguity {
    Ambiguity {
        warning: coerce::optional_text(
            field(json, &["ambiguity", "warning"]),
            limits::AMBIGUITY_TEXT,
        ),
        missing_evidence: coerce::string_list(
            field(json, &["ambiguity", "missing_evidence"]),
            limits::AMBIGUITY_TEXT,
            limits::MISSING_EVIDENCE_ITEMS,
        ),
    }
}

/// Model receipts first, then backfill from the headline, the core take and
/// the request's own messages until the tab minimum is met.
fn receipts(
    json: &Map<String, Value>,
    request: &AnalysisRequest,
    headline: &str,
    core_take: &str,
) -> Vec<String> {
    let (min, max) = request.tab().receipt_bounds();
    let mut receipts = coerce::string_list(json.get("receipts"), limits::RECEIPT, max);

    if receipts.len() < min {
        let hints = [headline, core_take]
            .into_iter()
            .chain(request.payload().messages());

        for hint in hints {
            if receipts.len() >= min {
                break;
            }
            let hint = coerce::truncate(hint.trim(), limits::RECEIPT_BACKFILL);
            if !hint.is_empty() && !receipts.contains(&hint) {
                receipts.push(hint);
            }
        }

        if receipts.len() < min {
            debug!(
                have = receipts.len(),
                need = min,
                "padding receipts with placeholder"
            );
        }
        while receipts.len() < min {
            receipts.push(RECEIPT_PLACEHOLDER.to_string());
        }
    }

    receipts
}

fn extras(json: &Map<String, Value>, tab: Tab) -> TabExtras {
    let mut extras = TabExtras::default();
    match tab {
        Tab::Scan => {
            extras.profile_tag = coerce::optional_text(json.get("profile_tag"), limits::TAG);
            extras.identified_tactic =
                coerce::optional_text(json.get("identified_tactic"), limits::TAG);
        }
        Tab::Comeback => {
            extras.savage_alt = coerce::optional_text(json.get("savage_alt"), limits::ALT_REPLY);
            extras.ice_cold_dismissal =
                coerce::optional_text(json.get("ice_cold_dismissal"), limits::ALT_REPLY);
        }
        Tab::Pattern => {
            extras.contradiction_audit = optional_list(
                json.get("contradiction_audit"),
                limits::CONTRADICTION_ITEMS,
            );
            extras.psychological_weapons_arsenal = optional_list(
                json.get("psychological_weapons_arsenal"),
                limits::ARSENAL_ITEMS,
            );
            extras.future_shock_forecast = forecasts(json.get("future_shock_forecast"));
            extras.pattern_quote =
                coerce::optional_text(json.get("pattern_quote"), limits::PATTERN_QUOTE);
        }
    }
    extras
}

fn optional_list(value: Option<&Value>, max_items: usize) -> Option<Vec<String>> {
    Some(coerce::string_list(value, limits::PATTERN_TEXT, max_items)).filter(|l| !l.is_empty())
}

fn forecasts(value: Option<&Value>) -> Option<Vec<Forecast>> {
    let items = value?.as_array()?;
    let forecasts: Vec<Forecast> = items
        .iter()
        .filter_map(|item| {
            let event = coerce::text(item.get("event"), limits::FORECAST_EVENT);
            if event.is_empty() {
                return None;
            }
            Some(Forecast {
                window: coerce::text(item.get("window"), limits::FORECAST_WINDOW),
                event,
                likelihood: coerce::score(item.get("likelihood")),
            })
        })
        .take(limits::FORECAST_ITEMS)
        .collect();

    Some(forecasts).filter(|f| !f.is_empty())
}
