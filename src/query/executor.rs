//! Query validation, user scoping, and execution against Postgres
//!
//! Model-authored SQL is untrusted. Before running, a query must pass the
//! guards (SELECT-only, single statement, no write/DDL keywords, only
//! permitted tables) and then every permitted table reference is rewritten
//! into a user-filtered subselect. A `WHERE user_id = ...` written by the
//! model can narrow the result further but can never widen it past the
//! acting user.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Pool, Runtime};
use regex::{Captures, Regex};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tokio_postgres::types::Type;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::agent::types::JsonRow;
use crate::error::{CoachError, CoachResult};

use super::SqlTool;

/// Tables the model is allowed to read, fully qualified.
const PERMITTED_TABLES: [&str; 2] = ["fretcoach.sessions", "fretcoach.ai_practice_plans"];

/// Why a query was not executed.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Failed validation; never sent to the database
    #[error("query rejected: {0}")]
    Rejected(String),
    /// Passed validation but the database reported an error
    #[error("query failed: {0}")]
    Execution(String),
}

/// Pooled Postgres access implementing [`SqlTool`].
#[derive(Clone)]
pub struct QueryExecutor {
    pool: Pool,
}

impl QueryExecutor {
    /// Create a connection pool from a `postgres://` URL.
    pub fn connect(database_url: &str) -> CoachResult<Self> {
        let mut config = deadpool_postgres::Config::new();
        config.url = Some(database_url.to_string());
        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| CoachError::Database(format!("pool setup failed: {e}")))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl SqlTool for QueryExecutor {
    async fn execute_scoped(&self, user_id: &str, sql: &str) -> Result<Vec<JsonRow>, QueryError> {
        let scoped = scope_query(user_id, sql)?;
        tracing::debug!(user_id, query = %scoped, "executing scoped query");

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| QueryError::Execution(format!("connection unavailable: {e}")))?;
        let rows = client
            .query(&scoped, &[])
            .await
            .map_err(|e| QueryError::Execution(e.to_string()))?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn forbidden_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(insert|update|delete|drop|truncate|alter|create|grant|revoke|copy|merge)\b")
            .unwrap()
    })
}

fn table_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\b(?:from|join)\s+([a-z_][a-z0-9_.]*)"#).unwrap())
}

fn scope_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(from|join)\s+(fretcoach\.(sessions|ai_practice_plans))\b(\s+(?:as\s+)?([A-Za-z_][A-Za-z0-9_]*))?",
        )
        .unwrap()
    })
}

fn permitted_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfretcoach\.(?:sessions|ai_practice_plans)\b").unwrap())
}

fn user_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.@-]{1,64}$").unwrap())
}

/// Words that can directly follow a table reference without being an alias.
const NON_ALIAS_WORDS: [&str; 24] = [
    "where", "on", "order", "group", "limit", "having", "union", "left", "right", "inner",
    "outer", "cross", "join", "using", "set", "window", "fetch", "offset", "except",
    "intersect", "returning", "natural", "full", "as",
];

fn is_non_alias_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    NON_ALIAS_WORDS.contains(&lower.as_str())
}

/// Run all guards, then rewrite permitted table references into user-scoped
/// subselects. Returns the SQL that may be sent to the database.
pub(crate) fn scope_query(user_id: &str, sql: &str) -> Result<String, QueryError> {
    if !user_id_re().is_match(user_id) {
        return Err(QueryError::Rejected("invalid user id".to_string()));
    }

    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(QueryError::Rejected("empty query".to_string()));
    }
    let first_word = trimmed.split_whitespace().next().unwrap_or_default();
    if !first_word.eq_ignore_ascii_case("select") {
        return Err(QueryError::Rejected(
            "only SELECT statements are allowed".to_string(),
        ));
    }
    if trimmed.contains(';') {
        return Err(QueryError::Rejected(
            "multiple statements are not allowed".to_string(),
        ));
    }
    if let Some(found) = forbidden_keyword_re().find(trimmed) {
        return Err(QueryError::Rejected(format!(
            "forbidden keyword: {}",
            found.as_str()
        )));
    }
    // Quoted identifiers would slip past the reference patterns below
    if trimmed.contains('"') {
        return Err(QueryError::Rejected(
            "quoted identifiers are not supported".to_string(),
        ));
    }

    let mut touched_permitted = false;
    for caps in table_reference_re().captures_iter(trimmed) {
        let table = caps[1].to_lowercase();
        if PERMITTED_TABLES.contains(&table.as_str()) {
            touched_permitted = true;
        } else {
            return Err(QueryError::Rejected(format!("table not permitted: {table}")));
        }
    }
    if !touched_permitted {
        return Err(QueryError::Rejected(
            "query references no permitted table".to_string(),
        ));
    }

    // A comma after a table reference starts an old-style table list whose
    // later entries the FROM/JOIN patterns never see
    for reference in scope_re().find_iter(trimmed) {
        if trimmed[reference.end()..].trim_start().starts_with(',') {
            return Err(QueryError::Rejected(
                "comma-separated table lists are not supported, use an explicit JOIN"
                    .to_string(),
            ));
        }
    }
    // Every mention of a permitted table must sit in FROM/JOIN position,
    // otherwise the rewrite below would leave it unscoped
    if permitted_table_re().find_iter(trimmed).count()
        != scope_re().find_iter(trimmed).count()
    {
        return Err(QueryError::Rejected(
            "table referenced outside FROM/JOIN position".to_string(),
        ));
    }

    let scoped = scope_re().replace_all(trimmed, |caps: &Captures| {
        let keyword = &caps[1];
        let table = &caps[2];
        let short_name = &caps[3];
        let subselect = format!("(SELECT * FROM {table} WHERE user_id = '{user_id}')");
        match caps.get(5).map(|m| m.as_str()) {
            // a real alias follows, keep it
            Some(alias) if !is_non_alias_word(alias) => {
                format!("{keyword} {subselect} AS {alias}")
            }
            // a clause keyword was captured as a trailing token, re-emit it
            Some(word) => format!("{keyword} {subselect} AS {short_name} {word}"),
            None => format!("{keyword} {subselect} AS {short_name}"),
        }
    });

    Ok(scoped.into_owned())
}

/// Convert a Postgres row into a JSON object keyed by column name.
pub(crate) fn row_to_json(row: &Row) -> JsonRow {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), cell_to_json(row, idx, column.type_()));
    }
    object
}

fn cell_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
    if *ty == Type::BOOL {
        match row.try_get::<_, Option<bool>>(idx) {
            Ok(Some(v)) => Value::Bool(v),
            _ => Value::Null,
        }
    } else if *ty == Type::INT2 {
        match row.try_get::<_, Option<i16>>(idx) {
            Ok(Some(v)) => Value::Number(v.into()),
            _ => Value::Null,
        }
    } else if *ty == Type::INT4 {
        match row.try_get::<_, Option<i32>>(idx) {
            Ok(Some(v)) => Value::Number(v.into()),
            _ => Value::Null,
        }
    } else if *ty == Type::INT8 {
        match row.try_get::<_, Option<i64>>(idx) {
            Ok(Some(v)) => Value::Number(v.into()),
            _ => Value::Null,
        }
    } else if *ty == Type::FLOAT4 {
        match row.try_get::<_, Option<f32>>(idx) {
            Ok(Some(v)) => Number::from_f64(f64::from(v)).map(Value::Number).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    } else if *ty == Type::FLOAT8 {
        match row.try_get::<_, Option<f64>>(idx) {
            Ok(Some(v)) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(v)) => Value::String(v),
            _ => Value::Null,
        }
    } else if *ty == Type::TIMESTAMP {
        match row.try_get::<_, Option<NaiveDateTime>>(idx) {
            Ok(Some(v)) => Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            _ => Value::Null,
        }
    } else if *ty == Type::TIMESTAMPTZ {
        match row.try_get::<_, Option<DateTime<Utc>>>(idx) {
            Ok(Some(v)) => Value::String(v.to_rfc3339()),
            _ => Value::Null,
        }
    } else if *ty == Type::DATE {
        match row.try_get::<_, Option<NaiveDate>>(idx) {
            Ok(Some(v)) => Value::String(v.to_string()),
            _ => Value::Null,
        }
    } else if *ty == Type::UUID {
        match row.try_get::<_, Option<Uuid>>(idx) {
            Ok(Some(v)) => Value::String(v.to_string()),
            _ => Value::Null,
        }
    } else {
        // Unsupported column type, last-ditch attempt as text
        match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(v)) => Value::String(v),
            _ => Value::Null,
        }
    }
}
