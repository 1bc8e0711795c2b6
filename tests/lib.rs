//! End-to-end tests through the public API, with scripted model backends and
//! a stubbed query tool standing in for the network and the database.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::json;

use fretcoach::agent::types::{ChatRequest, InboundMessage, JsonRow, ToolCall};
use fretcoach::agent::Role;
use fretcoach::llm::{
    CompletionBackend, CompletionRequest, GatewayError, ModelGateway, ModelTurn,
};
use fretcoach::query::{QueryError, SqlTool};
use fretcoach::{Coach, CoachError};

struct ScriptedBackend {
    name: &'static str,
    turns: Mutex<VecDeque<Result<ModelTurn, GatewayError>>>,
}

impl ScriptedBackend {
    fn new(name: &'static str, turns: Vec<Result<ModelTurn, GatewayError>>) -> Self {
        Self {
            name,
            turns: Mutex::new(turns.into()),
        }
    }
}

#[async_trait::async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, _request: &CompletionRequest) -> Result<ModelTurn, GatewayError> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::Provider("script exhausted".to_string())))
    }

    fn model_name(&self) -> &str {
        self.name
    }
}

struct RecordingSql {
    rows: Vec<JsonRow>,
    seen: Mutex<Vec<(String, String)>>,
}

impl RecordingSql {
    fn returning(rows: Vec<JsonRow>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl SqlTool for RecordingSql {
    async fn execute_scoped(&self, user_id: &str, sql: &str) -> Result<Vec<JsonRow>, QueryError> {
        self.seen
            .lock()
            .unwrap()
            .push((user_id.to_string(), sql.to_string()));
        Ok(self.rows.clone())
    }
}

fn answer(text: &str) -> Result<ModelTurn, GatewayError> {
    Ok(ModelTurn::Answer {
        text: text.to_string(),
    })
}

fn query_turn(sql: &str) -> Result<ModelTurn, GatewayError> {
    Ok(ModelTurn::ToolCalls {
        text: None,
        calls: vec![ToolCall {
            id: "call_q".to_string(),
            name: "execute_sql_query".to_string(),
            arguments: json!({ "sql": sql }),
        }],
    })
}

fn user_request(user_id: &str, text: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![InboundMessage {
            role: "user".to_string(),
            content: text.to_string(),
        }],
        user_id: user_id.to_string(),
        thread_id: None,
    }
}

fn session_row(accuracy: f64) -> JsonRow {
    let mut row = JsonRow::new();
    row.insert("pitch_accuracy".to_string(), json!(accuracy));
    row.insert("scale_chosen".to_string(), json!("A minor"));
    row
}

#[tokio::test]
async fn coach_answers_with_queried_data() {
    let primary = ScriptedBackend::new(
        "gpt-test",
        vec![
            query_turn("SELECT pitch_accuracy FROM fretcoach.sessions LIMIT 5"),
            answer("Your recent accuracy averages 91.2. Keep it up!"),
        ],
    );
    let fallback = ScriptedBackend::new("fallback", vec![]);
    let sql = RecordingSql::returning(vec![session_row(91.2)]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        sql.clone(),
    );

    let response = coach
        .chat(user_request("alice", "How is my pitch accuracy?"))
        .await
        .unwrap();

    assert!(response.response.contains("91.2"));
    assert_eq!(response.model_used, "gpt-test");
    assert!(!response.thread_id.is_empty());

    let data = response.data.unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["scale_chosen"], json!("A minor"));

    let seen = sql.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "alice");
}

#[tokio::test]
async fn thread_reuse_carries_history_forward() {
    let primary = ScriptedBackend::new(
        "m",
        vec![answer("Nice to meet you, Sam!"), answer("You told me: Sam.")],
    );
    let fallback = ScriptedBackend::new("fb", vec![]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![]),
    );

    let first = coach
        .chat(user_request("u1", "My name is Sam"))
        .await
        .unwrap();

    let mut followup = user_request("u1", "What's my name?");
    followup.thread_id = Some(first.thread_id.clone());
    let second = coach.chat(followup).await.unwrap();

    assert_eq!(second.thread_id, first.thread_id);
    let thread = coach.threads().load(&first.thread_id).unwrap();
    assert_eq!(thread.len(), 4);
    assert_eq!(thread[0].content, "My name is Sam");
    assert_eq!(thread[2].content, "What's my name?");
    assert!(thread.iter().all(|m| m.is_conversational()));
}

#[tokio::test]
async fn quota_exhaustion_fails_over_mid_request() {
    let primary = ScriptedBackend::new(
        "gpt-test",
        vec![
            query_turn("SELECT * FROM fretcoach.sessions"),
            Err(GatewayError::QuotaExceeded("RESOURCE_EXHAUSTED".to_string())),
        ],
    );
    let fallback = ScriptedBackend::new("minimax-test", vec![answer("Finished on fallback.")]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![session_row(70.0)]),
    );

    let response = coach.chat(user_request("u1", "progress?")).await.unwrap();
    assert_eq!(response.response, "Finished on fallback.");
    assert_eq!(response.model_used, "minimax-test");
    // The query ran on the primary before the switch
    assert_eq!(response.data.unwrap().len(), 1);
}

#[tokio::test]
async fn both_backends_failing_is_reported_as_unavailable() {
    let primary = ScriptedBackend::new(
        "p",
        vec![Err(GatewayError::QuotaExceeded("429 too many".to_string()))],
    );
    let fallback = ScriptedBackend::new(
        "f",
        vec![Err(GatewayError::QuotaExceeded("quota".to_string()))],
    );
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![]),
    );

    let err = coach.chat(user_request("u1", "hi")).await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(err.user_message().contains("temporarily unavailable"));
}

#[tokio::test]
async fn failed_request_does_not_mutate_the_thread() {
    let primary = ScriptedBackend::new(
        "p",
        vec![
            answer("hello there"),
            Err(GatewayError::Provider("connection reset".to_string())),
        ],
    );
    let fallback = ScriptedBackend::new("f", vec![]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![]),
    );

    let first = coach.chat(user_request("u1", "hi")).await.unwrap();
    let before = coach.threads().message_count(&first.thread_id);

    let mut failing = user_request("u1", "again");
    failing.thread_id = Some(first.thread_id.clone());
    assert!(coach.chat(failing).await.is_err());

    assert_eq!(coach.threads().message_count(&first.thread_id), before);
}

#[tokio::test]
async fn runaway_tool_use_is_bounded() {
    let turns: Vec<_> = (0..50)
        .map(|_| query_turn("SELECT 1 FROM fretcoach.sessions"))
        .collect();
    let primary = ScriptedBackend::new("p", turns);
    let fallback = ScriptedBackend::new("f", vec![]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![]),
    )
    .with_max_cycles(4);

    let err = coach.chat(user_request("u1", "loop")).await.unwrap_err();
    assert!(matches!(err, CoachError::WorkflowExhausted { max_cycles: 4 }));
}

#[tokio::test]
async fn tool_results_are_threaded_back_to_their_calls() {
    let primary = ScriptedBackend::new(
        "p",
        vec![
            Ok(ModelTurn::ToolCalls {
                text: Some("Checking two things.".to_string()),
                calls: vec![
                    ToolCall {
                        id: "a".to_string(),
                        name: "get_database_schema".to_string(),
                        arguments: json!({}),
                    },
                    ToolCall {
                        id: "b".to_string(),
                        name: "execute_sql_query".to_string(),
                        arguments: json!({"sql": "SELECT 1 FROM fretcoach.sessions"}),
                    },
                ],
            }),
            answer("done"),
        ],
    );
    let fallback = ScriptedBackend::new("f", vec![]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![session_row(50.0)]),
    );

    let response = coach.chat(user_request("u1", "check")).await.unwrap();
    let thread = coach.threads().load(&response.thread_id).unwrap();

    let tool_results: Vec<_> = thread.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_results.len(), 2);
    assert_eq!(tool_results[0].tool_call_id.as_deref(), Some("a"));
    assert!(tool_results[0].content.contains("fretcoach.sessions"));
    assert_eq!(tool_results[1].tool_call_id.as_deref(), Some("b"));
    assert!(tool_results[1].content.contains("\"success\":true"));
}

#[tokio::test]
async fn practice_plan_is_extracted_and_returned() {
    let plan_text = r#"Here is your plan:
{"focus_area":"Scale Conformity","current_score":64.0,"suggested_scale":"E minor","suggested_scale_type":"natural minor","session_target":"20 minutes","exercises":["Slow scale runs","Interval jumps"]}
Let me know when you're done!"#;
    let primary = ScriptedBackend::new("p", vec![answer(plan_text)]);
    let fallback = ScriptedBackend::new("f", vec![]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![]),
    );

    let response = coach.chat(user_request("u1", "plan please")).await.unwrap();
    let plan = response.plan.unwrap();
    assert_eq!(plan.focus_area, "Scale Conformity");
    assert_eq!(plan.current_score, 64.0);
    assert_eq!(plan.exercises.len(), 2);
}

#[tokio::test]
async fn blank_thread_id_gets_a_generated_one() {
    let primary = ScriptedBackend::new("p", vec![answer("hi")]);
    let fallback = ScriptedBackend::new("f", vec![]);
    let coach = Coach::new(
        ModelGateway::new(Box::new(primary), Box::new(fallback)),
        RecordingSql::returning(vec![]),
    );

    let mut request = user_request("u1", "hello");
    request.thread_id = Some("   ".to_string());
    let response = coach.chat(request).await.unwrap();
    assert_ne!(response.thread_id.trim(), "");
    assert_ne!(response.thread_id, "   ");
}
