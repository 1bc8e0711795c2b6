//! Chart payloads for the frontend
//!
//! When a chat answer comes with query data and the user's message signals a
//! visualization intent, the response carries a ready-to-render chart
//! configuration alongside the text.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{json, Value};

use crate::agent::types::JsonRow;
use crate::agent::PracticePlan;
use crate::query::SessionOverview;

const METRICS: [&str; 3] = ["pitch_accuracy", "scale_conformity", "timing_stability"];
const METRIC_LABELS: [&str; 3] = ["Pitch Accuracy", "Scale Conformity", "Timing Stability"];
const METRIC_COLORS: [&str; 3] = [
    "rgba(75, 192, 192, 1)",
    "rgba(153, 102, 255, 1)",
    "rgba(255, 159, 64, 1)",
];

const TREND_WORDS: [&str; 7] = [
    "progress", "trend", "over time", "chart", "graph", "visualize", "plot",
];
const COMPARISON_WORDS: [&str; 5] = ["compare", "comparison", "versus", "vs", "latest"];

/// Pick and build a chart for this turn, or nothing if the message carries
/// no visualization intent or the data has no performance metrics.
pub fn chart_for_message(
    message: &str,
    rows: &[JsonRow],
    overview: &SessionOverview,
) -> Option<Value> {
    if rows.is_empty() {
        return None;
    }
    let lowered = message.to_lowercase();
    let has_metrics = METRICS.iter().any(|m| rows[0].contains_key(*m));

    if TREND_WORDS.iter().any(|w| lowered.contains(w)) && has_metrics {
        Some(performance_trend_chart(rows))
    } else if COMPARISON_WORDS.iter().any(|w| lowered.contains(w))
        && rows[0].contains_key("pitch_accuracy")
    {
        Some(comparison_chart(&rows[0], overview))
    } else {
        None
    }
}

/// Line chart of the three performance metrics across sessions, oldest
/// first.
pub fn performance_trend_chart(rows: &[JsonRow]) -> Value {
    let mut sorted: Vec<&JsonRow> = rows.iter().collect();
    sorted.sort_by_key(|row| timestamp_of(row));

    let labels: Vec<String> = sorted
        .iter()
        .map(|row| timestamp_label(&timestamp_of(row)))
        .collect();

    let datasets: Vec<Value> = METRICS
        .iter()
        .zip(METRIC_LABELS)
        .zip(METRIC_COLORS)
        .map(|((metric, label), color)| {
            let points: Vec<f64> = sorted
                .iter()
                .map(|row| row.get(*metric).and_then(Value::as_f64).unwrap_or(0.0))
                .collect();
            json!({
                "label": label,
                "data": points,
                "borderColor": color,
                "backgroundColor": color,
                "tension": 0.4,
            })
        })
        .collect();

    json!({
        "type": "performance_trend",
        "data": {"labels": labels, "datasets": datasets},
        "options": {
            "responsive": true,
            "plugins": {
                "title": {"display": true, "text": "Performance Trend Over Time"},
                "legend": {"display": true},
            },
            "scales": {"y": {"beginAtZero": true, "max": 100}},
        },
        "title": "Performance Trend",
        "description": format!("Showing trend for {} practice sessions", sorted.len()),
    })
}

/// Bar chart comparing the latest session's metrics against the user's
/// all-time averages.
pub fn comparison_chart(latest: &JsonRow, overview: &SessionOverview) -> Value {
    let current: Vec<f64> = METRICS
        .iter()
        .map(|m| latest.get(*m).and_then(Value::as_f64).unwrap_or(0.0))
        .collect();
    let average = vec![overview.avg_pitch, overview.avg_scale, overview.avg_timing];

    json!({
        "type": "comparison",
        "data": {
            "labels": METRIC_LABELS,
            "datasets": [
                {
                    "label": "Latest Session",
                    "data": current,
                    "backgroundColor": "rgba(75, 192, 192, 0.6)",
                    "borderColor": "rgba(75, 192, 192, 1)",
                    "borderWidth": 1,
                },
                {
                    "label": "Your Average",
                    "data": average,
                    "backgroundColor": "rgba(153, 102, 255, 0.6)",
                    "borderColor": "rgba(153, 102, 255, 1)",
                    "borderWidth": 1,
                },
            ],
        },
        "options": {
            "responsive": true,
            "plugins": {
                "title": {"display": true, "text": "Latest Session vs Your Average"},
            },
            "scales": {"y": {"beginAtZero": true, "max": 100}},
        },
        "title": "Performance Comparison",
        "description": "How your latest session compares to your overall average",
    })
}

/// Chart payload carrying a freshly generated plan for the frontend's save
/// flow.
pub fn practice_plan_chart(plan: &PracticePlan, plan_id: &str) -> Value {
    json!({
        "type": "practice_plan",
        "data": plan,
        "plan_id": plan_id,
        "title": "Practice Plan",
        "description": "Your personalized practice plan",
    })
}

fn timestamp_of(row: &JsonRow) -> String {
    row.get("start_timestamp")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Short axis label for a session timestamp; falls back to the raw date
/// prefix when the value does not parse.
fn timestamp_label(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%m/%d %H:%M").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%m/%d %H:%M").to_string();
    }
    raw.chars().take(10).collect()
}
