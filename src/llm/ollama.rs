use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{LlmClient, LlmError, ModelRequest};

/// Ollama HTTP client (`/api/generate`, non-streaming).
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Every call is bounded by `timeout_secs`; zero is rejected.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        if timeout_secs == 0 {
            return Err(LlmError::InvalidSettings(
                "timeout must be greater than zero".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LlmClient for OllamaClient {
    fn complete(&self, model: &str, request: &ModelRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let prompt = request.prompt();
        let body = GenerateRequest {
            model,
            prompt: &prompt,
            system: &request.system,
            stream: false,
            options: GenerateOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                LlmError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                LlmError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                LlmError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;
        tracing::debug!(model, chars = parsed.response.len(), "Model responded");
        Ok(parsed.response)
    }
}
