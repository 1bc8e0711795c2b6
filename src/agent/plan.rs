//! Practice plan extraction from final answers
//!
//! The model embeds a plan as a JSON object in its answer text when asked to
//! generate one. Extraction is best-effort: a missing or malformed block
//! yields `None` and never blocks returning the textual answer.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a practice plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Structured coaching recommendation embedded in a model answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PracticePlan {
    /// e.g. "Pitch Accuracy" or "Timing Stability"
    pub focus_area: String,
    /// Current score in the focus area, 0-100
    pub current_score: f64,
    /// e.g. "C minor"
    pub suggested_scale: String,
    /// e.g. "natural minor"
    pub suggested_scale_type: String,
    /// Suggested session length, e.g. "15-20 minutes"
    pub session_target: String,
    pub exercises: Vec<String>,
    #[serde(default)]
    pub status: PlanStatus,
    /// Session the plan was executed in, once linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_session_id: Option<String>,
}

/// Locate and parse an embedded practice plan in answer text.
///
/// Scans for balanced JSON objects that mention `"exercises"` and returns the
/// first one that deserializes cleanly.
pub fn extract_practice_plan(text: &str) -> Option<PracticePlan> {
    for candidate in balanced_objects(text) {
        if !candidate.contains("\"exercises\"") {
            continue;
        }
        if let Ok(plan) = serde_json::from_str::<PracticePlan>(candidate) {
            return Some(plan);
        }
    }
    None
}

/// All top-level balanced `{...}` spans in the text, ignoring braces inside
/// JSON string literals.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}
