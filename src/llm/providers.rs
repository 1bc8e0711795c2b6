//! Concrete model backends: OpenAI-compatible chat completions and the
//! Anthropic messages API.
//!
//! Request/response mapping lives in free functions so the wire formats are
//! testable without a network.

use reqwest::Client;
use serde_json::{json, Value};

use crate::agent::types::{Message, Role, ToolCall};
use crate::BackendConfig;

use super::{backend_timeout, CompletionBackend, CompletionRequest, GatewayError, ModelTurn};

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Backend speaking the OpenAI chat-completions protocol. Also covers
/// providers exposing OpenAI-compatible endpoints via `base_url`.
pub struct OpenAiBackend {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let client = Client::builder()
            .timeout(backend_timeout(config))
            .build()
            .unwrap_or_default();
        Self {
            client,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_BASE.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = openai_request_body(&self.model, request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("network error: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::QuotaExceeded(format!("HTTP 429: {detail}")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            // Some providers signal quota through the body, not the status
            return Err(GatewayError::classify(format!("HTTP {status}: {detail}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("malformed response: {e}")))?;
        parse_openai_response(&data)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the chat-completions request body from a completion request.
pub(crate) fn openai_request_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = vec![json!({"role": "system", "content": request.system})];
    for message in &request.messages {
        messages.push(openai_message(message));
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect(),
        );
        body["tool_choice"] = json!("auto");
    }
    body
}

fn openai_message(message: &Message) -> Value {
    match message.role {
        Role::User => json!({"role": "user", "content": message.content}),
        Role::System => json!({"role": "system", "content": message.content}),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        Role::Assistant if message.tool_calls.is_empty() => {
            json!({"role": "assistant", "content": message.content})
        }
        Role::Assistant => {
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            json!({
                "role": "assistant",
                "content": content,
                "tool_calls": message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                // arguments travel as a JSON-encoded string
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect::<Vec<_>>(),
            })
        }
    }
}

/// Parse a chat-completions response into a model turn.
pub(crate) fn parse_openai_response(data: &Value) -> Result<ModelTurn, GatewayError> {
    let message = data
        .pointer("/choices/0/message")
        .ok_or_else(|| GatewayError::Provider("response missing choices[0].message".to_string()))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let calls: Vec<ToolCall> = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|raw_calls| {
            raw_calls
                .iter()
                .enumerate()
                .map(|(index, raw)| {
                    let arguments = raw
                        .pointer("/function/arguments")
                        .and_then(Value::as_str)
                        .and_then(|args| serde_json::from_str(args).ok())
                        .unwrap_or_else(|| json!({}));
                    ToolCall {
                        id: raw
                            .get("id")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("call_{index}")),
                        name: raw
                            .pointer("/function/name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if calls.is_empty() {
        Ok(ModelTurn::Answer {
            text: text.unwrap_or_default(),
        })
    } else {
        Ok(ModelTurn::ToolCalls {
            text: text.filter(|t| !t.is_empty()),
            calls,
        })
    }
}

/// Backend speaking the Anthropic messages protocol. The original fallback
/// model (MiniMax) is served through an Anthropic-compatible endpoint.
pub struct AnthropicBackend {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let client = Client::builder()
            .timeout(backend_timeout(config))
            .build()
            .unwrap_or_default();
        Self {
            client,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_DEFAULT_BASE.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl CompletionBackend for AnthropicBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = anthropic_request_body(&self.model, request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("network error: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::QuotaExceeded(format!("HTTP 429: {detail}")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::classify(format!("HTTP {status}: {detail}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("malformed response: {e}")))?;
        parse_anthropic_response(&data)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the messages-API request body from a completion request.
pub(crate) fn anthropic_request_body(model: &str, request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "system": request.system,
        "messages": anthropic_messages(&request.messages),
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters,
                    })
                })
                .collect(),
        );
    }
    body
}

/// Map history into Anthropic's strictly-alternating user/assistant turns.
/// Tool results become user-side `tool_result` blocks; consecutive
/// same-role entries are merged into one turn.
fn anthropic_messages(messages: &[Message]) -> Vec<Value> {
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for message in messages {
        let (role, blocks) = match message.role {
            // Inbound system messages beyond the preamble fold into user turns
            Role::User | Role::System => (
                "user",
                vec![json!({"type": "text", "text": message.content})],
            ),
            Role::Tool => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": message.content,
                })],
            ),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": message.content}));
                }
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                if blocks.is_empty() {
                    blocks.push(json!({"type": "text", "text": ""}));
                }
                ("assistant", blocks)
            }
        };

        match turns.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => turns.push((role, blocks)),
        }
    }

    turns
        .into_iter()
        .map(|(role, blocks)| json!({"role": role, "content": blocks}))
        .collect()
}

/// Parse a messages-API response into a model turn.
pub(crate) fn parse_anthropic_response(data: &Value) -> Result<ModelTurn, GatewayError> {
    let blocks = data
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::Provider("response missing content blocks".to_string()))?;

    let mut text = String::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => calls.push(ToolCall {
                id: block
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
            }),
            _ => {}
        }
    }

    if calls.is_empty() {
        Ok(ModelTurn::Answer { text })
    } else {
        Ok(ModelTurn::ToolCalls {
            text: (!text.is_empty()).then_some(text),
            calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolSpec;

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            system: "be a coach".to_string(),
            messages: vec![
                Message::user("how am I doing?"),
                Message::assistant_with_tools(
                    "",
                    vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "execute_sql_query".to_string(),
                        arguments: json!({"sql": "SELECT 1"}),
                    }],
                ),
                Message::tool_result("call_1", "{\"success\":true}"),
            ],
            tools: vec![ToolSpec {
                name: "execute_sql_query",
                description: "run sql",
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    #[test]
    fn test_openai_body_shape() {
        let body = openai_request_body("gpt-4o-mini", &sample_request());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["name"],
            "execute_sql_query"
        );
        // arguments are string-encoded on the wire
        assert!(body["messages"][2]["tool_calls"][0]["function"]["arguments"].is_string());
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_parse_openai_answer() {
        let data = json!({
            "choices": [{"message": {"role": "assistant", "content": "Great progress!"}}]
        });
        assert_eq!(
            parse_openai_response(&data).unwrap(),
            ModelTurn::Answer { text: "Great progress!".to_string() }
        );
    }

    #[test]
    fn test_parse_openai_tool_calls() {
        let data = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "abc",
                    "type": "function",
                    "function": {"name": "execute_sql_query", "arguments": "{\"sql\":\"SELECT 1\"}"}
                }]
            }}]
        });
        match parse_openai_response(&data).unwrap() {
            ModelTurn::ToolCalls { text, calls } => {
                assert!(text.is_none());
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "execute_sql_query");
                assert_eq!(calls[0].arguments["sql"], "SELECT 1");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_openai_rejects_empty_response() {
        assert!(parse_openai_response(&json!({})).is_err());
    }

    #[test]
    fn test_anthropic_merges_tool_results_into_user_turn() {
        let body = anthropic_request_body("MiniMax-M2.1", &sample_request());
        let messages = body["messages"].as_array().unwrap();
        // user, assistant(tool_use), user(tool_result)
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "call_1");
        assert_eq!(body["system"], "be a coach");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_anthropic_merges_consecutive_same_role_turns() {
        let request = CompletionRequest {
            system: String::new(),
            messages: vec![
                Message::assistant_with_tools(
                    "",
                    vec![
                        ToolCall {
                            id: "a".to_string(),
                            name: "get_database_schema".to_string(),
                            arguments: json!({}),
                        },
                        ToolCall {
                            id: "b".to_string(),
                            name: "execute_sql_query".to_string(),
                            arguments: json!({"sql": "SELECT 1"}),
                        },
                    ],
                ),
                Message::tool_result("a", "schema"),
                Message::tool_result("b", "rows"),
            ],
            tools: vec![],
            temperature: 0.0,
            max_tokens: 16,
        };
        let body = anthropic_request_body("m", &request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_anthropic_tool_use() {
        let data = json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "t1", "name": "execute_sql_query",
                 "input": {"sql": "SELECT 1"}}
            ],
            "stop_reason": "tool_use"
        });
        match parse_anthropic_response(&data).unwrap() {
            ModelTurn::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Let me check."));
                assert_eq!(calls[0].id, "t1");
                assert_eq!(calls[0].arguments["sql"], "SELECT 1");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_anthropic_answer() {
        let data = json!({"content": [{"type": "text", "text": "All good."}]});
        assert_eq!(
            parse_anthropic_response(&data).unwrap(),
            ModelTurn::Answer { text: "All good.".to_string() }
        );
    }
}
