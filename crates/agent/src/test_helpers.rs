//! Shared test helpers for controller tests.

use assay_core::action::Language;
use assay_core::error::ProviderError;
use assay_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use assay_executor::{ActionExecutor, Backend, OutputPolicy};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` returns the next result in the queue and records
/// the request. Panics if more calls are made than results provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that replies with each text in turn.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let mut responses = self.responses.lock().unwrap();

        if responses.is_empty() {
            panic!(
                "SequentialMockProvider: no more responses (call #{})",
                requests.len()
            );
        }

        requests.push(request);
        responses.remove(0)
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A backend that answers from a fixed list and records what it ran.
pub struct ScriptedBackend {
    outputs: Mutex<Vec<String>>,
    sources: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(outputs: &[&str]) -> Self {
        Self {
            outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, source: &str, _timeout: Duration) -> String {
        self.sources.lock().unwrap().push(source.to_string());
        let mut outputs = self.outputs.lock().unwrap();
        if outputs.is_empty() {
            String::new()
        } else {
            outputs.remove(0)
        }
    }
}

/// An executor whose Python lane is `backend`.
pub fn executor_with(backend: Arc<ScriptedBackend>) -> Arc<ActionExecutor> {
    Arc::new(
        ActionExecutor::new(Duration::from_secs(600), OutputPolicy::default())
            .with_backend(Language::Python, backend),
    )
}
