//! Read-only SQL access for the coaching agent
//!
//! The model writes SQL; this module decides whether it runs. Every query is
//! validated against a small allow-list and rewritten so each permitted table
//! reference is scoped to the acting user before it reaches Postgres.

pub mod executor;
pub mod plans;
pub mod schema;
pub mod stats;

pub use executor::{QueryError, QueryExecutor};
pub use plans::PlanStore;
pub use schema::database_schema;
pub use stats::{SessionOverview, StatsReader};

use async_trait::async_trait;

use crate::agent::types::JsonRow;

/// Scoped SQL execution as seen by the agent loop. Production uses
/// [`QueryExecutor`]; tests substitute a stub.
#[async_trait]
pub trait SqlTool: Send + Sync {
    /// Validate, scope to `user_id`, and run a model-authored query.
    async fn execute_scoped(&self, user_id: &str, sql: &str) -> Result<Vec<JsonRow>, QueryError>;
}
