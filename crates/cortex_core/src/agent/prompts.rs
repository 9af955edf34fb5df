//! Prompt composition for the two agent roles.

use serde_json::Value;

/// Input of the translator step. Doubles as the `/translate` request body.
#[derive(Debug, Clone, Default)]
pub struct TranslateRequest {
    pub user_text: String,
    pub sensory_snapshot: Value,
    pub short_brain_summary: Value,
}

/// Input of the cognitive step. Doubles as the `/cognitive` request body.
#[derive(Debug, Clone, Default)]
pub struct CognitiveRequest {
    pub post_brain_summary: Value,
    pub recent_user_text: String,
}

/// String field of a request body; absent, null or non-string is empty.
pub fn text_field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Arbitrary JSON field of a request body; absent is null.
pub fn json_field(body: &Value, key: &str) -> Value {
    body.get(key).cloned().unwrap_or(Value::Null)
}

impl TranslateRequest {
    /// Each field is taken on its own, so one bad field never drops the rest.
    pub fn from_value(body: &Value) -> Self {
        TranslateRequest {
            user_text: text_field(body, "user_text"),
            sensory_snapshot: json_field(body, "sensory_snapshot"),
            short_brain_summary: json_field(body, "short_brain_summary"),
        }
    }
}

impl CognitiveRequest {
    pub fn from_value(body: &Value) -> Self {
        CognitiveRequest {
            post_brain_summary: json_field(body, "post_brain_summary"),
            recent_user_text: text_field(body, "recent_user_text"),
        }
    }
}

fn json_or_empty(value: &Value) -> String {
    match value {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

impl TranslateRequest {
    pub fn prompt(&self) -> String {
        format!(
            r#"
You are a TRANSLATOR agent. Input: a user's text message, a sensory snapshot and a short brain summary.
Return ONLY well-formed JSON with the following fields:
- neural_inputs: an array of {{ kind: "text_embedding"|"sensory_stim", tokens?: [ints], seed_embedding?: [floats], strength?: float, receptor?: string, intensity?: float }}
- neurogenesis: an array of requested new clusters {{ label: string, cluster_size: int, seed_embedding?: [floats] }}
- memory_flags: an array of {{ summary: string, importance: float }}
No natural language outside the JSON. If you cannot produce a field, return an empty array for it.

USER_TEXT:
{}

SENSORY_SNAPSHOT:
{}

SHORT_BRAIN_SUMMARY:
{}
"#,
            self.user_text,
            json_or_empty(&self.sensory_snapshot),
            json_or_empty(&self.short_brain_summary),
        )
    }
}

impl CognitiveRequest {
    pub fn prompt(&self) -> String {
        // A string summary is already the engine's own rendering.
        let summary = match &self.post_brain_summary {
            Value::String(s) => s.clone(),
            other => json_or_empty(other),
        };
        format!(
            r#"
You are the COGNITIVE agent (higher mind). Input: a short brain summary and the user's latest message.
You MUST produce JSON with:
- user_text: text to send to the user (string)
- behavior_directives: object, e.g. {{ "motor_intent": [floats], "verbal_tone": "calm" }}
- archive: array of {{ summary: string, importance: float }}

POST_BRAIN_SUMMARY: {}
RECENT_USER_TEXT: "{}"

Return ONLY JSON, nothing else.
"#,
            summary,
            self.recent_user_text.replace('"', "\\\""),
        )
    }
}
