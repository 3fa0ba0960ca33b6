use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{LlmClient, LlmError, ModelRequest};

type Handler = Box<dyn Fn(&ModelRequest) -> Result<String, LlmError> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Handler(Handler),
}

/// Mock client for tests and dry runs.
///
/// Either replays a fixed queue of responses (in call order) or answers
/// each request through a handler, which suits concurrent callers whose
/// order is not fixed.
pub struct ScriptedLlmClient {
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Queue(Mutex::new(responses.into_iter().map(Into::into).collect())),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            script: Script::Handler(Box::new(handler)),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl LlmClient for ScriptedLlmClient {
    fn complete(&self, _model: &str, request: &ModelRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .map_err(|_| LlmError::HttpClient("script lock poisoned".to_string()))?
                .pop_front()
                .ok_or_else(|| LlmError::HttpClient("script exhausted".to_string())),
            Script::Handler(handler) => handler(request),
        }
    }
}

/// Client whose every call fails at the transport level, optionally after
/// a delay.
pub struct FailingLlmClient {
    message: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl FailingLlmClient {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for FailingLlmClient {
    fn complete(&self, _model: &str, _request: &ModelRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Err(LlmError::HttpClient(self.message.clone()))
    }
}
