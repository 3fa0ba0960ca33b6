//! Model invocation: client trait, Ollama transport, JSON recovery and the
//! bounded retry loop used by rule evaluation.

pub mod ollama;
pub mod json;
pub mod invoke;
pub mod mock;

pub use ollama::OllamaClient;
pub use json::{extract_json, normalize_punctuation, strip_reasoning};
pub use invoke::invoke_json;
pub use mock::{FailingLlmClient, ScriptedLlmClient};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Cannot connect to model server at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Model server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unreadable model server response: {0}")]
    ResponseParsing(String),

    #[error("Invalid client settings: {0}")]
    InvalidSettings(String),

    #[error("No JSON found in model response after {attempts} attempt(s)")]
    NoJson { attempts: u32 },
}

/// One model call: a system prompt plus ordered user content blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub content: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelRequest {
    /// Content blocks joined for transports that take a single prompt.
    pub fn prompt(&self) -> String {
        self.content.join("\n\n")
    }
}

/// Text-completion backend. Implementations are shared across rule workers.
pub trait LlmClient: Send + Sync {
    fn complete(&self, model: &str, request: &ModelRequest) -> Result<String, LlmError>;
}
