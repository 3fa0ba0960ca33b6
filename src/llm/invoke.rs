use serde_json::Value;

use super::json::{extract_json, strip_reasoning};
use super::{LlmClient, LlmError, ModelRequest};

/// Call the model until its response yields a JSON object.
///
/// Makes at most `max_retries + 1` calls. Only a response without
/// recoverable JSON is retried; transport errors return immediately.
pub fn invoke_json(
    client: &dyn LlmClient,
    model: &str,
    request: &ModelRequest,
    max_retries: u32,
) -> Result<Value, LlmError> {
    for attempt in 0..=max_retries {
        let response = client.complete(model, request)?;
        if let Some(value) = extract_json(strip_reasoning(&response)) {
            return Ok(value);
        }
        tracing::warn!(
            model,
            attempt = attempt + 1,
            max_attempts = max_retries + 1,
            response_len = response.len(),
            "No JSON in model response"
        );
    }
    Err(LlmError::NoJson {
        attempts: max_retries + 1,
    })
}
