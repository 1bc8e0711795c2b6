//! The coaching agent core
//!
//! [`Coach`] drives a bounded tool-use loop: send the thread history to the
//! active model backend, execute whatever tool calls come back, feed the
//! results in, and repeat until the model produces a plain answer. Quota
//! failures on the primary backend switch the rest of the request to the
//! fallback; all other provider failures abort the request.
//!
//! New messages are buffered per request and committed to the thread store
//! only after the loop succeeds, so an aborted request leaves the thread
//! exactly as it found it.

pub mod conversation;
pub mod plan;
pub mod prompt;
pub mod types;

pub use conversation::ThreadStore;
pub use plan::{extract_practice_plan, PlanStatus, PracticePlan};
pub use types::{ChatRequest, ChatResponse, JsonRow, Message, Role, ThreadId, ToolCall};

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::error::{CoachError, CoachResult};
use crate::llm::{ActiveBackend, CompletionRequest, ModelGateway, ModelTurn, ToolSpec};
use crate::query::SqlTool;

use prompt::build_system_prompt;

/// Upper bound on model cycles per request before giving up.
pub const DEFAULT_MAX_CYCLES: usize = 8;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 4096;

/// Tools exposed to the model on every completion request.
pub fn tool_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "get_database_schema",
            description: "Get the schema of the practice database: tables, columns, and types.",
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSpec {
            name: "execute_sql_query",
            description: "Run a read-only SELECT query against the practice database. \
                Results are automatically restricted to the current user.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string", "description": "The SELECT statement to run"}
                },
                "required": ["sql"]
            }),
        },
    ]
}

/// Per-request working state. `messages` is the full view the model sees;
/// `new_messages` is the slice created by this request, committed to the
/// thread store only on success.
struct AgentState {
    messages: Vec<Message>,
    new_messages: Vec<Message>,
    use_fallback: bool,
    last_query_rows: Option<Vec<JsonRow>>,
}

impl AgentState {
    fn new(prior: Vec<Message>) -> Self {
        Self {
            messages: prior,
            new_messages: Vec::new(),
            use_fallback: false,
            last_query_rows: None,
        }
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.new_messages.push(message);
    }

    fn backend(&self) -> ActiveBackend {
        if self.use_fallback {
            ActiveBackend::Fallback
        } else {
            ActiveBackend::Primary
        }
    }
}

/// The practice coaching agent.
pub struct Coach {
    gateway: ModelGateway,
    sql: Arc<dyn SqlTool>,
    threads: ThreadStore,
    max_cycles: usize,
}

impl Coach {
    pub fn new(gateway: ModelGateway, sql: Arc<dyn SqlTool>) -> Self {
        Self {
            gateway,
            sql,
            threads: ThreadStore::new(),
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles.max(1);
        self
    }

    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    /// Run one chat turn: resolve the thread, drive the tool loop, commit the
    /// new messages, and assemble the response.
    pub async fn chat(&self, request: ChatRequest) -> CoachResult<ChatResponse> {
        let thread_id = match request.thread_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let prior = self.threads.load(&thread_id)?;
        let new_thread = prior.is_empty();
        let mut state = AgentState::new(prior);

        if new_thread {
            // Brand-new thread: take the whole inbound history
            for inbound in request.messages {
                if let Some(message) = inbound.into_message() {
                    state.push(message);
                }
            }
        } else {
            // Existing thread: the store already holds the history, only the
            // latest user message is new
            let latest = request
                .messages
                .into_iter()
                .rev()
                .find(|m| m.role == "user")
                .and_then(|m| m.into_message());
            if let Some(message) = latest {
                state.push(message);
            }
        }

        if !state.messages.iter().any(|m| m.role == Role::User) {
            return Err(CoachError::InvalidRequest(
                "request contains no user message".to_string(),
            ));
        }

        tracing::info!(
            %thread_id,
            user_id = %request.user_id,
            history = state.messages.len(),
            "chat turn started"
        );

        let answer = self
            .run_loop(&request.user_id, new_thread, &mut state)
            .await?;

        self.threads.append(&thread_id, &state.new_messages)?;

        let plan = extract_practice_plan(&answer);
        Ok(ChatResponse {
            response: answer,
            thread_id,
            data: state.last_query_rows.take(),
            plan,
            model_used: self.gateway.model_name(state.backend()).to_string(),
        })
    }

    async fn run_loop(
        &self,
        user_id: &str,
        new_thread: bool,
        state: &mut AgentState,
    ) -> CoachResult<String> {
        for cycle in 0..self.max_cycles {
            // The long guideline block goes out once per thread, on the
            // first cycle of a brand-new thread
            let include_guidelines = new_thread && cycle == 0;

            let completion = CompletionRequest {
                system: build_system_prompt(user_id, include_guidelines),
                messages: state.messages.clone(),
                tools: tool_catalog(),
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
            };

            let turn = self.next_model_turn(state, &completion).await?;
            match turn {
                ModelTurn::Answer { text } => {
                    state.push(Message::assistant(text.clone()));
                    return Ok(text);
                }
                ModelTurn::ToolCalls { text, calls } => {
                    tracing::debug!(cycle, calls = calls.len(), "model requested tools");
                    state.push(Message::assistant_with_tools(
                        text.unwrap_or_default(),
                        calls.clone(),
                    ));
                    for call in calls {
                        let payload = self.run_tool(user_id, &call, state).await;
                        state.push(Message::tool_result(call.id, payload));
                    }
                }
            }
        }

        Err(CoachError::WorkflowExhausted {
            max_cycles: self.max_cycles,
        })
    }

    /// One completion against the active backend, engaging the fallback when
    /// the primary reports quota exhaustion.
    async fn next_model_turn(
        &self,
        state: &mut AgentState,
        request: &CompletionRequest,
    ) -> CoachResult<ModelTurn> {
        match self.gateway.complete(state.backend(), request).await {
            Ok(turn) => Ok(turn),
            Err(err) if err.is_quota() && !state.use_fallback => {
                let primary_detail = err.to_string();
                tracing::warn!(
                    error = %primary_detail,
                    "primary backend out of quota, switching to fallback"
                );
                state.use_fallback = true;
                self.gateway
                    .complete(ActiveBackend::Fallback, request)
                    .await
                    .map_err(|fallback_err| CoachError::BothBackendsFailed {
                        primary: primary_detail,
                        fallback: fallback_err.to_string(),
                    })
            }
            Err(err) if err.is_quota() => Err(CoachError::BothBackendsFailed {
                primary: "quota exhausted".to_string(),
                fallback: err.to_string(),
            }),
            Err(err) => Err(CoachError::Provider(err.to_string())),
        }
    }

    /// Execute one tool call. Tool failures never abort the request; they are
    /// reported back to the model as an error payload it can react to.
    async fn run_tool(&self, user_id: &str, call: &ToolCall, state: &mut AgentState) -> String {
        match call.name.as_str() {
            "get_database_schema" => crate::query::database_schema().to_string(),
            "execute_sql_query" => {
                let Some(sql) = call.arguments.get("sql").and_then(|v| v.as_str()) else {
                    return json!({
                        "success": false,
                        "error": "missing required argument: sql"
                    })
                    .to_string();
                };
                match self.sql.execute_scoped(user_id, sql).await {
                    Ok(rows) => {
                        state.last_query_rows = Some(rows.clone());
                        json!({
                            "success": true,
                            "row_count": rows.len(),
                            "data": rows,
                        })
                        .to_string()
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "query tool failed");
                        json!({"success": false, "error": e.to_string()}).to_string()
                    }
                }
            }
            other => {
                tracing::warn!(tool = other, "model called unknown tool");
                json!({"success": false, "error": format!("unknown tool: {other}")}).to_string()
            }
        }
    }
}
