//! Core types for the agent module

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::plan::PracticePlan;

/// Unique identifier for a conversation thread
pub type ThreadId = String;

/// A row returned by the query tool: column name to JSON value
pub type JsonRow = serde_json::Map<String, Value>;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant/model response
    Assistant,
    /// System instruction carried in the inbound request
    System,
    /// Result of a tool call
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned identifier linking the call to its result message
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One turn in a conversation. Immutable once appended to a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool invocations carried by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool-result messages, pairing them with the originating call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message that requests tool execution. `content` may be empty
    /// when the model emitted calls without accompanying text.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Result of one tool call, keyed back to the call id.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Whether this message counts toward the conversation turn count
    /// (user/assistant exchange, not tool plumbing).
    pub fn is_conversational(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
    }
}

/// Inbound chat request consumed by the agent core
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<InboundMessage>,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
}

fn default_user() -> String {
    "default_user".to_string()
}

/// A single inbound message; roles other than user/assistant/system are
/// rejected at conversion time.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: String,
    pub content: String,
}

impl InboundMessage {
    pub fn into_message(self) -> Option<Message> {
        match self.role.as_str() {
            "user" => Some(Message::user(self.content)),
            "assistant" => Some(Message::assistant(self.content)),
            "system" => Some(Message::system(self.content)),
            _ => None,
        }
    }
}

/// Outbound chat response produced by the agent core
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Final assistant answer text
    pub response: String,
    /// Thread identifier, generated when the request carried none
    pub thread_id: ThreadId,
    /// Rows returned by the last successful query tool call, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<JsonRow>>,
    /// Practice plan extracted from the final answer, if one was embedded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PracticePlan>,
    /// Which model produced the final answer
    pub model_used: String,
}
