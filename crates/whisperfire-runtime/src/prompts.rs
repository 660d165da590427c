//! Prompt rendering for analysis requests.
//!
//! The system prompt is identical for every request and states the output
//! contract. The user prompt carries the request context, the message(s) and
//! the tab policy. Nothing here affects the cache key.

use whisperfire_core::{AnalysisRequest, Payload, Tab, TacticLabel};

use crate::providers::ChatMessage;

/// Turns a request into the chat messages sent to a provider.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, request: &AnalysisRequest) -> Vec<ChatMessage>;
}

/// System prompt shared by every tab.
pub const SYSTEM_PROMPT: &str = r#"
You are WHISPERFIRE, a real-time psychological insight engine.
You return evidence-backed analysis as a SINGLE JSON object matching the Whisperfire result schema exactly.
Return valid JSON only. No extra text, no markdown.

## Core Rules
1. The schema is fixed: do not add, remove or rename fields
2. Every insight must be grounded in observable behavior from the provided text
3. Tone presets (savage / soft / clinical) change style only
4. Relationship context sets safety boundaries and risk guidance
5. If information is insufficient, lower certainty and fill the ambiguity fields

## Fields
- headline: one line naming the core red flag or dynamic (max 120 chars)
- core_take: 2-3 sentences of direct analysis (max 500 chars)
- tactic: {"label": one of TACTIC_LABELS, "confidence": 0-100}
- motives: likely intent behind the behavior
- targeting: who or what the behavior aims at
- power_play: the leverage being attempted
- receipts: 2-4 concrete quotes from the message(s)
- next_moves: concise recommendation for the user
- suggested_reply: {"style": "clipped" | "one_liner" | "reverse_uno" | "screenshot_bait" | "monologue", "text": the reply}
- safety: {"risk_level": "LOW" | "MODERATE" | "HIGH" | "CRITICAL", "notes": short reason}
- metrics: {"red_flag", "certainty", "viral_potential"} as integers 0-100
- pattern: {"cycle", "prognosis"}, pattern tab only, otherwise null
- ambiguity: {"warning": text or null, "missing_evidence": list}

## Relationship Guardrails
- Coworker: HR-safe, fact-based, no personal insult
- Family: firm but non-nuclear unless risk is severe
- Partner/Ex: specific documentation, avoid needless escalation
- Date/Stranger: clean boundaries, exit if red flags persist

## Output Format
- Output ONLY the JSON object
- Copy the provided CONTEXT object verbatim into "context"
- No identity attacks: critique behavior, not people
- Respect every length limit

If you cannot comply fully, return an empty JSON object: {}
"#;

/// Default renderer reproducing the production prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhisperfirePrompts;

impl WhisperfirePrompts {
    /// System prompt with the allowed tactic labels appended.
    pub fn system_prompt() -> String {
        let labels: Vec<&str> = TacticLabel::ALL.iter().map(|l| l.as_str()).collect();
        format!(
            "{}\nTACTIC_LABELS: {}\n",
            SYSTEM_PROMPT.trim_end(),
            labels.join(", ")
        )
    }

    /// The user turn for one request.
    pub fn user_prompt(request: &AnalysisRequest) -> String {
        // Plain enums and strings always serialize.
        let context = serde_json::to_string(&request.context()).unwrap_or_else(|_| "{}".into());

        let body = match request.payload() {
            Payload::Message(message) => format!("MESSAGE: {}", message),
            Payload::Messages(messages) => {
                let lines: Vec<String> = messages.iter().map(|m| format!("- {}", m)).collect();
                format!("MESSAGES:\n{}", lines.join("\n"))
            }
        };

        format!(
            "CONTEXT: {}\n\n{}\n\n{}\nTASK: Produce one JSON object obeying the schema and rules.",
            context,
            body,
            tab_policy(request.tab())
        )
    }
}

impl PromptRenderer for WhisperfirePrompts {
    fn render(&self, request: &AnalysisRequest) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(Self::system_prompt()),
            ChatMessage::user(Self::user_prompt(request)),
        ]
    }
}

fn tab_policy(tab: Tab) -> &'static str {
    match tab {
        Tab::Scan => {
            "SCAN POLICY:\n- receipts = 2\n- suggested_reply.style = \"clipped\"|\"one_liner\"\n- pattern.* = null"
        }
        Tab::Comeback => {
            "COMEBACK POLICY:\n- prioritize suggested_reply\n- receipts = 2\n- pattern.* = null"
        }
        Tab::Pattern => {
            "PATTERN POLICY:\n- receipts = 3-4 from timeline\n- fill pattern.cycle & prognosis\n- suggested_reply favors boundary/exit safety"
        }
    }
}
