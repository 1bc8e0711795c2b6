//! # FretCoach
//!
//! An AI guitar-practice coaching service. A tool-using agent answers
//! questions about a player's recorded practice sessions by generating SQL
//! against a Postgres telemetry schema, and produces structured practice
//! plans the player can save.
//!
//! The crate is organized around four seams:
//!
//! - [`agent`]: the bounded tool-use loop, conversation threads, and plan
//!   extraction
//! - [`llm`]: the model gateway with a primary backend and a quota fallback
//! - [`query`]: SQL validation, per-user scoping, and Postgres execution
//! - [`server`]: the axum HTTP surface (behind the `server` feature)

pub mod agent;
pub mod error;
pub mod llm;
pub mod query;

#[cfg(feature = "server")]
pub mod server;

pub use agent::{ChatRequest, ChatResponse, Coach, PracticePlan, ThreadStore};
pub use error::{CoachError, CoachResult};
pub use llm::ModelGateway;
pub use query::{PlanStore, QueryExecutor};

use std::env;

/// Connection settings for one model backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub model: String,
    pub api_key: String,
    /// Override for self-hosted or proxied endpoints
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

/// Full service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    pub database_url: String,
    pub primary: BackendConfig,
    pub fallback: BackendConfig,
    pub max_cycles: usize,
}

const DEFAULT_PRIMARY_MODEL: &str = "gpt-4o-mini";
const DEFAULT_FALLBACK_MODEL: &str = "MiniMax-M2.1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

impl CoachConfig {
    /// Read configuration from the environment. Required: `DATABASE_URL`,
    /// `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`.
    pub fn from_env() -> CoachResult<Self> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            primary: BackendConfig {
                model: env_or("OPENAI_MODEL", DEFAULT_PRIMARY_MODEL),
                api_key: require("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL").ok(),
                timeout_secs: env_u64("COACH_BACKEND_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            },
            fallback: BackendConfig {
                model: env_or("ANTHROPIC_MODEL", DEFAULT_FALLBACK_MODEL),
                api_key: require("ANTHROPIC_API_KEY")?,
                base_url: env::var("ANTHROPIC_BASE_URL").ok(),
                timeout_secs: env_u64("COACH_BACKEND_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            },
            max_cycles: env_u64("COACH_MAX_CYCLES", agent::DEFAULT_MAX_CYCLES as u64) as usize,
        })
    }
}

fn require(name: &str) -> CoachResult<String> {
    env::var(name)
        .map_err(|_| CoachError::Configuration(format!("{name} is not set")))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
