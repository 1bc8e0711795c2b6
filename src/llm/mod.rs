//! Model gateway: one interface over two interchangeable LLM backends
//!
//! The gateway owns a primary and a fallback backend sharing the
//! [`CompletionBackend`] interface. Callers pick which one is active; the
//! agent loop switches to the fallback when the primary reports quota
//! exhaustion. Provider failures are classified into quota vs everything
//! else so that switch decision stays out of the providers themselves.

pub mod providers;

pub use providers::{AnthropicBackend, OpenAiBackend};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::agent::types::{Message, ToolCall};
use crate::{BackendConfig, CoachConfig};

/// Markers that identify a temporary quota/rate-limit failure in a provider
/// error, matched case-insensitively.
const QUOTA_MARKERS: [&str; 4] = ["RESOURCE_EXHAUSTED", "429", "RATE", "QUOTA"];

/// Error from a model backend, split by whether the fallback sub-protocol
/// should engage.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Temporary capacity exhaustion; the caller may switch backends
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Anything else: network, auth, malformed response
    #[error("provider error: {0}")]
    Provider(String),
}

impl GatewayError {
    /// Classify a raw provider error by scanning for known quota markers.
    pub fn classify(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let upper = detail.to_uppercase();
        if QUOTA_MARKERS.iter().any(|marker| upper.contains(marker)) {
            GatewayError::QuotaExceeded(detail)
        } else {
            GatewayError::Provider(detail)
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, GatewayError::QuotaExceeded(_))
    }
}

/// What the model produced for one cycle: either a final answer or a batch
/// of tool calls to execute before asking again.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    Answer {
        text: String,
    },
    ToolCalls {
        /// Text the model emitted alongside its calls, if any
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// Declared tool the model may call
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema for the arguments object
    pub parameters: Value,
}

/// One completion request: ordered history, system preamble, tool catalog.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A model backend able to produce the next step of a conversation.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn, GatewayError>;

    fn model_name(&self) -> &str;
}

/// Which of the gateway's two backends to use for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBackend {
    Primary,
    Fallback,
}

/// Uniform front over the primary and fallback model backends.
pub struct ModelGateway {
    primary: Box<dyn CompletionBackend>,
    fallback: Box<dyn CompletionBackend>,
}

impl ModelGateway {
    pub fn new(primary: Box<dyn CompletionBackend>, fallback: Box<dyn CompletionBackend>) -> Self {
        Self { primary, fallback }
    }

    /// Build the production gateway: OpenAI-compatible primary, Anthropic
    /// messages-API fallback.
    pub fn from_config(config: &CoachConfig) -> Self {
        Self::new(
            Box::new(OpenAiBackend::new(&config.primary)),
            Box::new(AnthropicBackend::new(&config.fallback)),
        )
    }

    pub async fn complete(
        &self,
        backend: ActiveBackend,
        request: &CompletionRequest,
    ) -> Result<ModelTurn, GatewayError> {
        self.backend(backend).complete(request).await
    }

    pub fn model_name(&self, backend: ActiveBackend) -> &str {
        self.backend(backend).model_name()
    }

    fn backend(&self, backend: ActiveBackend) -> &dyn CompletionBackend {
        match backend {
            ActiveBackend::Primary => self.primary.as_ref(),
            ActiveBackend::Fallback => self.fallback.as_ref(),
        }
    }
}

/// Backend parameters shared by both provider implementations.
pub(crate) fn backend_timeout(config: &BackendConfig) -> std::time::Duration {
    std::time::Duration::from_secs(config.timeout_secs)
}
