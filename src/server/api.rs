//! Request handlers

use std::collections::HashMap;
use std::sync::RwLock;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agent::types::{ChatRequest, JsonRow, ThreadId};
use crate::agent::PracticePlan;
use crate::error::CoachError;
use crate::query::SessionOverview;

use super::{charts, AppState, PendingPlan};

/// Words accepted as confirmation of the thread's pending plan.
const CONFIRMATION_WORDS: [&str; 9] = [
    "yes", "yeah", "yep", "sure", "ok", "okay", "confirm", "save", "please",
];

const PLAN_PARKED_NOTE: &str =
    "\n\n*I've created a practice plan for you. Click 'Save Plan' to save it.*";
const PLAN_SAVED_NOTE: &str =
    "\n\n*Your practice plan has been saved! You can access it anytime from your practice history.*";
const TREND_CHART_NOTE: &str = "\n\n*I've displayed your performance trend chart below.*";
const COMPARISON_CHART_NOTE: &str = "\n\n*I've shown a comparison chart below.*";

/// Chat response as served over HTTP. Extends the agent's response with the
/// plan confirmation state, chart payload, and session context.
#[derive(Serialize)]
pub struct ChatReply {
    pub response: String,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<JsonRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PracticePlan>,
    pub model_used: String,
    pub plan_saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<Value>,
    pub session_context: Value,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let last_user_message = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();

    // A bare confirmation word saves the thread's pending plan before the
    // model sees the message
    let mut plan_saved = false;
    if let Some(thread_id) = request.thread_id.as_deref() {
        if is_confirmation(&last_user_message) {
            if let Some(pending) =
                take_pending_for_thread(&state.pending, thread_id, &request.user_id)
            {
                let practice_id = parse_plan_id(&pending.plan_id)?;
                state.plans.save(practice_id, &pending.user_id, &pending.plan).await?;
                tracing::info!(thread_id, %practice_id, "pending plan confirmed via chat");
                plan_saved = true;
            }
        }
    }

    let response = state.coach.chat(request.clone()).await?;

    let overview = state
        .stats
        .overview(&request.user_id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "session overview unavailable");
            SessionOverview::default()
        });

    let rows = response.data.as_deref().unwrap_or_default();
    let mut chart_data = charts::chart_for_message(&last_user_message, rows, &overview);

    let mut answer = response.response;

    // Park a freshly generated plan until the user confirms it; the newest
    // plan for a thread replaces any earlier one
    let pending_plan_id = response.plan.as_ref().map(|plan| {
        let plan_id = park_pending_plan(
            &state.pending,
            &response.thread_id,
            &request.user_id,
            plan.clone(),
        );
        if chart_data.is_none() {
            chart_data = Some(charts::practice_plan_chart(plan, &plan_id));
        }
        answer.push_str(PLAN_PARKED_NOTE);
        plan_id
    });

    if plan_saved {
        answer.push_str(PLAN_SAVED_NOTE);
    } else if let Some(chart) = &chart_data {
        match chart["type"].as_str() {
            Some("performance_trend") => answer.push_str(TREND_CHART_NOTE),
            Some("comparison") => answer.push_str(COMPARISON_CHART_NOTE),
            _ => {}
        }
    }

    Ok(Json(ChatReply {
        response: answer,
        thread_id: response.thread_id,
        data: response.data,
        plan: response.plan,
        model_used: response.model_used,
        plan_saved,
        pending_plan_id,
        chart_data,
        session_context: json!({
            "total_sessions": overview.total_sessions,
            "weakest_area": overview.weakest_area(),
        }),
    }))
}

fn is_confirmation(message: &str) -> bool {
    let normalized = message.trim().trim_end_matches(['.', '!']).to_lowercase();
    CONFIRMATION_WORDS.contains(&normalized.as_str())
}

fn parse_plan_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound("no such pending plan".to_string()))
}

type PendingMap = RwLock<HashMap<ThreadId, PendingPlan>>;

/// Park a plan for a thread, replacing any earlier pending plan. Returns the
/// id to confirm it with.
fn park_pending_plan(
    pending: &PendingMap,
    thread_id: &str,
    user_id: &str,
    plan: PracticePlan,
) -> String {
    let plan_id = Uuid::new_v4().to_string();
    if let Ok(mut map) = pending.write() {
        map.insert(
            thread_id.to_string(),
            PendingPlan {
                plan_id: plan_id.clone(),
                user_id: user_id.to_string(),
                plan,
            },
        );
    }
    plan_id
}

/// Remove and return a thread's pending plan if it belongs to the user.
fn take_pending_for_thread(
    pending: &PendingMap,
    thread_id: &str,
    user_id: &str,
) -> Option<PendingPlan> {
    let mut map = pending.write().ok()?;
    match map.get(thread_id) {
        Some(p) if p.user_id == user_id => map.remove(thread_id),
        _ => None,
    }
}

/// Remove and return the pending plan with this plan id, whatever thread it
/// was parked under.
fn take_pending_by_plan_id(
    pending: &PendingMap,
    plan_id: &str,
    user_id: &str,
) -> Option<PendingPlan> {
    let mut map = pending.write().ok()?;
    let thread_id = map
        .iter()
        .find(|(_, p)| p.plan_id == plan_id && p.user_id == user_id)
        .map(|(id, _)| id.clone())?;
    map.remove(&thread_id)
}

#[derive(Deserialize)]
pub struct SavePlanRequest {
    pub plan_id: String,
    #[serde(default = "default_user")]
    pub user_id: String,
}

fn default_user() -> String {
    "default_user".to_string()
}

pub async fn save_plan(
    State(state): State<AppState>,
    Json(request): Json<SavePlanRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(pending) =
        take_pending_by_plan_id(&state.pending, &request.plan_id, &request.user_id)
    else {
        return Err(ApiError::NotFound("no such pending plan".to_string()));
    };

    let practice_id = parse_plan_id(&pending.plan_id)?;
    state.plans.save(practice_id, &pending.user_id, &pending.plan).await?;
    Ok(Json(json!({
        "saved": true,
        "practice_id": practice_id.to_string(),
    })))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Handler-level error: coach failures mapped to status codes, plus the
/// plain not-found case for plan lookups.
pub enum ApiError {
    Coach(CoachError),
    NotFound(String),
}

impl From<CoachError> for ApiError {
    fn from(err: CoachError) -> Self {
        ApiError::Coach(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(detail) => {
                (StatusCode::NOT_FOUND, Json(json!({"error": detail}))).into_response()
            }
            ApiError::Coach(err) => {
                let status = match &err {
                    CoachError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    CoachError::BothBackendsFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                tracing::error!(error = %err, "chat request failed");
                (status, Json(json!({"error": err.user_message()}))).into_response()
            }
        }
    }
}
