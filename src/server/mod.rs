//! HTTP surface for the coaching agent
//!
//! A thin axum layer over [`Coach`]: one chat endpoint, plan confirmation,
//! and a health probe. Plans extracted from answers are parked as pending,
//! one per thread with the newest replacing any earlier one, until the user
//! confirms through the dedicated endpoint or with a confirmation word in
//! chat.

pub mod api;
pub mod charts;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::routing::{get, post};
use axum::Router;

use crate::agent::types::ThreadId;
use crate::agent::{Coach, PracticePlan};
use crate::error::CoachResult;
use crate::query::{PlanStore, StatsReader};
use crate::CoachError;

/// A plan awaiting user confirmation before being persisted.
#[derive(Clone)]
pub struct PendingPlan {
    /// Becomes the practice_id once the plan is saved
    pub plan_id: String,
    pub user_id: String,
    pub plan: PracticePlan,
}

/// Shared state behind all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coach: Arc<Coach>,
    pub plans: Arc<PlanStore>,
    pub stats: Arc<StatsReader>,
    /// At most one pending plan per thread; a new plan replaces the old
    pub pending: Arc<RwLock<HashMap<ThreadId, PendingPlan>>>,
}

impl AppState {
    pub fn new(coach: Arc<Coach>, plans: PlanStore, stats: StatsReader) -> Self {
        Self {
            coach,
            plans: Arc::new(plans),
            stats: Arc::new(stats),
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(api::chat))
        .route("/save-plan", post(api::save_plan))
        .route("/health", get(api::health))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run_server(state: AppState, host: &str, port: u16) -> CoachResult<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| CoachError::Configuration(format!("invalid listen address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CoachError::Configuration(format!("bind failed: {e}")))?;
    tracing::info!(%addr, "coach server listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| CoachError::Configuration(format!("server error: {e}")))
}
