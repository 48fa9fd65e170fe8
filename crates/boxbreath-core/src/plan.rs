//! Breathing plans proposed by the chat backend.
//!
//! A reply may carry a line such as
//! `PLAN_JSON: {"type":"4 point","timing":{"inhale":4,...}}`. The plan is
//! the first balanced JSON object after the tag; it maps onto a pattern
//! write for the matching variant.
//!
//! The backend can also summarize a whole transcript into a plan on request
//! (`POST /api/chatbot`). Its answer comes in one of three shapes:
//!
//! - `{"result": "<JSON text>"}`, the text holding a plan or
//!   `{"conversation": [...], "breathing": {...}}`
//! - `{"breathing": {...}}`
//! - `{"conversation": [...], "breathing": {...}}`

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};
use crate::integrations::{ChatApi, ConfigApi, Conversation, RemoteConfig};
use crate::pattern::{normalize, BreathingPattern, RawPattern, Variant};

/// Marker that precedes the plan object in a chat reply.
pub const PLAN_TAG: &str = "PLAN_JSON:";

/// Shown when a reply carries a plan tag that cannot be read.
pub const FALLBACK_MESSAGE: &str =
    "I couldn't read that plan, so let's start with calm box breathing.";

/// Shown when a transcript summary yields no usable plan.
pub const SUMMARY_FALLBACK_MESSAGE: &str =
    "I couldn't generate a plan. Let's try a calming 4-4-4-4.";

/// Transcript lines sent for a summary, most recent last.
pub const SUMMARY_TURNS: usize = 10;

const DEFAULT_SECS: f64 = 4.0;

/// Accept numbers, numeric strings and `null`; anything else is treated as
/// missing.
fn lenient_secs<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Phase durations in seconds as the backend writes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanTiming {
    #[serde(default, deserialize_with = "lenient_secs")]
    pub inhale: Option<f64>,
    #[serde(default, deserialize_with = "lenient_secs")]
    pub hold: Option<f64>,
    #[serde(default, deserialize_with = "lenient_secs")]
    pub exhale: Option<f64>,
    #[serde(default, deserialize_with = "lenient_secs")]
    pub hold_after_exhale: Option<f64>,
}

/// A plan object from a chat reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub emotion: String,
    /// Display name chosen by the backend, e.g. "Box breathing".
    #[serde(default)]
    pub pattern: String,
    /// `"4 point"`, `"3 point"` or anything else for two phases.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub timing: PlanTiming,
    #[serde(default)]
    pub effect: String,
    #[serde(default)]
    pub quote: String,
}

/// `value`, unless it is missing, zero or not a number.
fn or_default(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() && v != 0.0 => v,
        _ => default,
    }
}

fn cycle_part(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v}"),
        _ => "0".to_string(),
    }
}

impl Plan {
    /// The conservative plan used when nothing better is available.
    pub fn default_calm() -> Self {
        Self {
            emotion: "Calm / Relaxed".to_string(),
            pattern: "Box breathing".to_string(),
            kind: "4 point".to_string(),
            timing: PlanTiming {
                inhale: Some(4.0),
                hold: Some(4.0),
                exhale: Some(4.0),
                hold_after_exhale: Some(4.0),
            },
            effect: "Calms nervous system, reduces anxiety".to_string(),
            quote: "Breathe gently; you're not alone.".to_string(),
        }
    }

    pub fn variant(&self) -> Variant {
        match self.kind.trim() {
            "4 point" => Variant::Box,
            "3 point" => Variant::Triangular,
            _ => Variant::Dual,
        }
    }

    /// The pattern write this plan asks for.
    ///
    /// Missing or zero durations default to 4 s, except the triangular hold
    /// which defaults to none.
    pub fn to_pattern(&self) -> Result<BreathingPattern> {
        let t = &self.timing;
        let variant = self.variant();
        let values = match variant {
            Variant::Box => vec![
                or_default(t.inhale, DEFAULT_SECS),
                or_default(t.hold, DEFAULT_SECS),
                or_default(t.exhale, DEFAULT_SECS),
                or_default(t.hold_after_exhale, DEFAULT_SECS),
            ],
            Variant::Triangular => vec![
                or_default(t.inhale, DEFAULT_SECS),
                or_default(t.hold, 0.0),
                or_default(t.exhale, DEFAULT_SECS),
            ],
            Variant::Dual => vec![
                or_default(t.inhale, DEFAULT_SECS),
                or_default(t.exhale, DEFAULT_SECS),
            ],
        };
        normalize(variant, &RawPattern::from_values(variant, &values))
    }

    /// Durations as written by the backend, e.g. `"4-7-8"`.
    pub fn cycle_label(&self) -> String {
        let t = &self.timing;
        let parts = match self.variant() {
            Variant::Box => vec![t.inhale, t.hold, t.exhale, t.hold_after_exhale],
            Variant::Triangular => vec![t.inhale, t.hold, t.exhale],
            Variant::Dual => vec![t.inhale, t.exhale],
        };
        parts
            .into_iter()
            .map(cycle_part)
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn display_name(&self) -> &str {
        if !self.pattern.trim().is_empty() {
            return self.pattern.trim();
        }
        match self.variant() {
            Variant::Box => "Box breathing",
            Variant::Triangular => "Inhale-Hold-Exhale",
            Variant::Dual => "Equal breathing",
        }
    }

    /// Assistant lines confirming the plan to the user.
    pub fn confirmation(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.emotion.trim().is_empty() {
            lines.push(format!("It sounds like you're feeling {}.", self.emotion.trim()));
        }
        lines.push(format!(
            "Let's do {}, cycle {}. I'll set that up now.",
            self.display_name(),
            self.cycle_label()
        ));
        lines
    }
}

/// Slice of `text` holding the first balanced `{...}`, braces inside JSON
/// strings ignored.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Find the plan in a chat reply.
///
/// Returns `Ok(None)` when the reply carries no plan tag at all.
///
/// # Errors
///
/// Returns [`CoreError::PlanParseFailed`] when the tag is present but no
/// well-formed plan object follows it.
pub fn extract_plan(reply: &str) -> Result<Option<Plan>> {
    let Some(idx) = reply.find(PLAN_TAG) else {
        return Ok(None);
    };
    let after = &reply[idx + PLAN_TAG.len()..];
    if !after.contains('{') {
        return Err(CoreError::PlanParseFailed("no object after plan tag".into()));
    }
    let json = balanced_object(after)
        .ok_or_else(|| CoreError::PlanParseFailed("unbalanced braces in plan".into()))?;

    let mut value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CoreError::PlanParseFailed(format!("invalid plan JSON: {e}")))?;
    // Some backends wrap the plan as {"breathing": {...}}.
    if let Some(inner) = value.get_mut("breathing").filter(|v| v.is_object()) {
        value = inner.take();
    }
    if !value.is_object() {
        return Err(CoreError::PlanParseFailed("plan is not an object".into()));
    }
    let plan = serde_json::from_value(value)
        .map_err(|e| CoreError::PlanParseFailed(format!("invalid plan fields: {e}")))?;
    Ok(Some(plan))
}

/// Like [`extract_plan`], substituting [`Plan::default_calm`] for a plan
/// that cannot be read.
pub fn extract_plan_or_default(reply: &str) -> Option<Plan> {
    match extract_plan(reply) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable plan, using calm default");
            Some(Plan::default_calm())
        }
    }
}

/// A plan picked from a summarized transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    /// Closing lines from the backend, if it wrote any.
    pub conversation: Vec<String>,
    pub plan: Plan,
    /// `true` when the plan is the calm default standing in for an unusable
    /// answer.
    pub fallback: bool,
}

impl PlanSummary {
    pub fn fallback() -> Self {
        Self {
            conversation: Vec::new(),
            plan: Plan::default_calm(),
            fallback: true,
        }
    }
}

fn conversation_lines(value: &serde_json::Value) -> Vec<String> {
    value
        .get("conversation")
        .and_then(|c| c.as_array())
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn plan_from_value(value: serde_json::Value) -> Result<Plan> {
    if !value.is_object() {
        return Err(CoreError::PlanParseFailed("plan is not an object".into()));
    }
    serde_json::from_value(value)
        .map_err(|e| CoreError::PlanParseFailed(format!("invalid plan fields: {e}")))
}

/// Read a transcript summary in any of the shapes the backend answers with.
///
/// # Errors
///
/// Returns [`CoreError::PlanParseFailed`] when the answer holds no readable
/// plan.
pub fn parse_summary(body: &serde_json::Value) -> Result<PlanSummary> {
    match body.get("result") {
        Some(serde_json::Value::String(text)) if !text.trim().is_empty() => {
            let mut parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| CoreError::PlanParseFailed(format!("unreadable plan result: {e}")))?;
            let conversation = conversation_lines(&parsed);
            let plan = if parsed.get("breathing").is_some_and(|b| b.is_object()) {
                parsed["breathing"].take()
            } else {
                parsed
            };
            return Ok(PlanSummary {
                conversation,
                plan: plan_from_value(plan)?,
                fallback: false,
            });
        }
        None | Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) => {}
        Some(_) => {
            return Err(CoreError::PlanParseFailed("plan result is not text".into()));
        }
    }

    match body.get("breathing").filter(|b| b.is_object()) {
        Some(breathing) => Ok(PlanSummary {
            conversation: conversation_lines(body),
            plan: plan_from_value(breathing.clone())?,
            fallback: false,
        }),
        None => Err(CoreError::PlanParseFailed("summary carries no plan".into())),
    }
}

/// Ask the backend to pick a plan for the conversation so far.
///
/// An answer without a readable plan becomes [`PlanSummary::fallback`];
/// transport failures are returned as errors.
pub async fn summarize_plan<A: ChatApi>(api: &A, conversation: &Conversation) -> Result<PlanSummary> {
    let lines = conversation.transcript(SUMMARY_TURNS);
    match api.summarize(&lines).await {
        Ok(summary) => Ok(summary),
        Err(e @ CoreError::PlanParseFailed(_)) => {
            tracing::warn!(error = %e, "no usable plan in summary, using calm default");
            Ok(PlanSummary::fallback())
        }
        Err(e) => Err(e),
    }
}

/// Store the plan's pattern on the config server.
pub async fn apply_plan<A: ConfigApi>(api: &A, plan: &Plan) -> Result<RemoteConfig> {
    let pattern = plan.to_pattern().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "plan pattern unusable, using default");
        BreathingPattern::default_for(plan.variant())
    });
    tracing::info!(variant = %pattern.variant(), pattern = %pattern.cycle_label(), "applying plan");
    api.post_pattern(&pattern).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{ChatClient, ConfigUpdate};
    use crate::pattern::PhaseStep;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn extracts_plan_with_nested_braces() {
        let reply = "We can ground together.\nPLAN_JSON: {\"emotion\":\"Tense\",\"type\":\"3 point\",\
                     \"timing\":{\"inhale\":4,\"hold\":7,\"exhale\":8},\"quote\":\"a {brace} here\"}\nDone.";
        let plan = extract_plan(reply).unwrap().unwrap();
        assert_eq!(plan.variant(), Variant::Triangular);
        assert_eq!(plan.cycle_label(), "4-7-8");
        assert_eq!(plan.quote, "a {brace} here");
    }

    #[test]
    fn missing_tag_is_not_an_error() {
        assert_eq!(extract_plan("I'm here with you.").unwrap(), None);
    }

    #[test]
    fn malformed_plans_fail() {
        for reply in [
            "PLAN_JSON: none",
            "PLAN_JSON: {\"type\": \"4 point\"",
            "PLAN_JSON: {type: 4 point}",
        ] {
            let err = extract_plan(reply).unwrap_err();
            assert!(matches!(err, CoreError::PlanParseFailed(_)), "{reply}");
        }
    }

    #[test]
    fn unreadable_plan_falls_back_to_calm_box() {
        let plan = extract_plan_or_default("PLAN_JSON: {oops}").unwrap();
        assert_eq!(plan, Plan::default_calm());
        assert_eq!(plan.to_pattern().unwrap().cycle_label(), "4-4-4-4");
        assert!(extract_plan_or_default("hello").is_none());
    }

    #[test]
    fn breathing_wrapper_is_unwrapped() {
        let plan = extract_plan(r#"PLAN_JSON: {"breathing":{"type":"2 point","timing":{"inhale":5,"exhale":5}}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(plan.to_pattern().unwrap().cycle_label(), "5-5");
    }

    #[test]
    fn missing_durations_take_defaults() {
        let plan: Plan = serde_json::from_str(
            r#"{"type":"4 point","timing":{"inhale":"6","hold":null,"exhale":0}}"#,
        )
        .unwrap();
        assert_eq!(plan.to_pattern().unwrap().cycle_label(), "6-4-4-4");

        let tri: Plan = serde_json::from_str(r#"{"type":"3 point","timing":{}}"#).unwrap();
        let p = tri.to_pattern().unwrap();
        assert_eq!(p.duration_secs(PhaseStep::Hold1), 0.0);
        assert_eq!(p.cycle_label(), "4-0-4");
    }

    #[test]
    fn unknown_type_means_two_phases() {
        let plan: Plan = serde_json::from_str(r#"{"type":"7 point"}"#).unwrap();
        assert_eq!(plan.variant(), Variant::Dual);
        assert_eq!(plan.display_name(), "Equal breathing");
    }

    #[test]
    fn confirmation_mentions_emotion_and_cycle() {
        let lines = Plan::default_calm().confirmation();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Calm / Relaxed"));
        assert!(lines[1].contains("Box breathing, cycle 4-4-4-4"));
    }

    struct RecordingApi {
        posted: RefCell<Vec<BreathingPattern>>,
    }

    impl ConfigApi for RecordingApi {
        async fn fetch_config(&self) -> Result<RemoteConfig> {
            Ok(RemoteConfig::default())
        }

        async fn post_pattern(&self, pattern: &BreathingPattern) -> Result<RemoteConfig> {
            self.posted.borrow_mut().push(*pattern);
            Ok(RemoteConfig::default())
        }

        async fn update_config(&self, _update: &ConfigUpdate) -> Result<RemoteConfig> {
            Ok(RemoteConfig::default())
        }
    }

    #[tokio::test]
    async fn apply_plan_posts_mapped_pattern() {
        let api = RecordingApi {
            posted: RefCell::new(Vec::new()),
        };
        let plan: Plan = serde_json::from_str(
            r#"{"type":"3 point","timing":{"inhale":4,"hold":7,"exhale":8}}"#,
        )
        .unwrap();
        apply_plan(&api, &plan).await.unwrap();
        let posted = api.posted.borrow();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].variant(), Variant::Triangular);
        assert_eq!(posted[0].cycle_label(), "4-7-8");
    }

    #[test]
    fn summary_result_text_with_breathing_wrapper() {
        let body = json!({
            "result": r#"{"conversation":["Rough day.","Let's slow down."],
                          "breathing":{"emotion":"Anxious","type":"3 point",
                                       "timing":{"inhale":4,"hold":7,"exhale":8}}}"#
        });
        let summary = parse_summary(&body).unwrap();
        assert!(!summary.fallback);
        assert_eq!(summary.conversation, vec!["Rough day.", "Let's slow down."]);
        assert_eq!(summary.plan.emotion, "Anxious");
        assert_eq!(summary.plan.cycle_label(), "4-7-8");
    }

    #[test]
    fn summary_result_text_holding_the_plan_itself() {
        let body = json!({"result": r#"{"type":"2 point","timing":{"inhale":5,"exhale":6}}"#});
        let summary = parse_summary(&body).unwrap();
        assert!(summary.conversation.is_empty());
        assert_eq!(summary.plan.to_pattern().unwrap().cycle_label(), "5-6");
    }

    #[test]
    fn summary_with_bare_breathing_object() {
        let body = json!({
            "conversation": ["I'm here with you."],
            "breathing": {"emotion": "Sleepy", "type": "4 point",
                          "timing": {"inhale": 4, "hold": 4, "exhale": 6, "hold_after_exhale": 2}}
        });
        let summary = parse_summary(&body).unwrap();
        assert_eq!(summary.conversation, vec!["I'm here with you."]);
        assert_eq!(summary.plan.cycle_label(), "4-4-6-2");

        let only = parse_summary(&json!({"breathing": {"type": "2 point"}})).unwrap();
        assert_eq!(only.plan.variant(), Variant::Dual);
    }

    #[test]
    fn summary_without_plan_fails_to_parse() {
        for body in [
            json!({"result": "not json at all"}),
            json!({"result": "[1, 2]"}),
            json!({"result": 42}),
            json!({"conversation": ["hello"]}),
            json!({"breathing": "box"}),
            json!({}),
        ] {
            let err = parse_summary(&body).unwrap_err();
            assert!(matches!(err, CoreError::PlanParseFailed(_)), "{body}");
        }
    }

    #[tokio::test]
    async fn summarize_plan_sends_recent_transcript() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chatbot")
            .match_body(mockito::Matcher::Json(json!({
                "messages": ["long day", "That sounds tiring."]
            })))
            .with_status(200)
            .with_body(r#"{"breathing":{"type":"4 point","timing":{"inhale":5}}}"#)
            .create_async()
            .await;

        let client = ChatClient::new(&server.url()).unwrap();
        let mut conversation = Conversation::new();
        conversation.push(crate::integrations::Role::User, "long day");
        conversation.push(crate::integrations::Role::Assistant, "That sounds tiring.");
        let summary = summarize_plan(&client, &conversation).await.unwrap();
        mock.assert_async().await;

        assert!(!summary.fallback);
        assert_eq!(summary.plan.to_pattern().unwrap().cycle_label(), "5-4-4-4");
    }

    #[tokio::test]
    async fn summarize_plan_falls_back_to_calm_box() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chatbot")
            .with_status(200)
            .with_body(r#"{"result":"Sorry, I can't decide."}"#)
            .create_async()
            .await;

        let client = ChatClient::new(&server.url()).unwrap();
        let summary = summarize_plan(&client, &Conversation::new()).await.unwrap();
        assert_eq!(summary, PlanSummary::fallback());
        assert_eq!(summary.plan.to_pattern().unwrap().cycle_label(), "4-4-4-4");
    }

    #[tokio::test]
    async fn summarize_plan_keeps_transport_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chatbot")
            .with_status(500)
            .create_async()
            .await;

        let client = ChatClient::new(&server.url()).unwrap();
        let err = summarize_plan(&client, &Conversation::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::ChatFailed(_)));
    }
}
