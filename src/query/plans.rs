//! Durable storage for generated practice plans

use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::agent::plan::PracticePlan;
use crate::error::{CoachError, CoachResult};

const INSERT_PLAN: &str = "INSERT INTO fretcoach.ai_practice_plans \
    (practice_id, user_id, practice_plan, executed_session_id) \
    VALUES ($1, $2, $3, $4)";

/// Writes confirmed practice plans to `fretcoach.ai_practice_plans`.
#[derive(Clone)]
pub struct PlanStore {
    pool: Pool,
}

impl PlanStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Persist a plan under the id it was parked with.
    pub async fn save(
        &self,
        practice_id: Uuid,
        user_id: &str,
        plan: &PracticePlan,
    ) -> CoachResult<()> {
        let body = serde_json::to_string(plan)
            .map_err(|e| CoachError::Database(format!("plan serialization failed: {e}")))?;

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| CoachError::Database(format!("connection unavailable: {e}")))?;
        client
            .execute(
                INSERT_PLAN,
                &[&practice_id, &user_id, &body, &plan.executed_session_id],
            )
            .await
            .map_err(|e| CoachError::Database(e.to_string()))?;

        tracing::info!(user_id, %practice_id, "practice plan saved");
        Ok(())
    }
}
