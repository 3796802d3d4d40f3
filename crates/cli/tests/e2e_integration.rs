//! End-to-end integration tests for the assay agent runtime.
//!
//! These tests exercise the full pipeline from user task to event stream:
//! controller, action parsing, execution, classification and ordering.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assay_agent::{Controller, EndReason, run_streaming};
use assay_config::StreamConfig;
use assay_core::action::Language;
use assay_core::error::ProviderError;
use assay_core::message::SessionId;
use assay_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use assay_executor::{ActionExecutor, Backend, OutputPolicy};
use assay_stream::{EventPayload, StreamEvent};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
    call_count: Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            call_count: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                *count,
                responses.len()
            );
        }
        let content = responses[*count].clone();
        *count += 1;
        Ok(ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "e2e-model".into(),
        })
    }
}

// ── Mock Backends ────────────────────────────────────────────────────────

/// Evaluates `print(a+b)` for small integers; anything else echoes back.
struct ArithmeticBackend;

#[async_trait::async_trait]
impl Backend for ArithmeticBackend {
    fn name(&self) -> &str {
        "arithmetic"
    }

    async fn run(&self, source: &str, _timeout: Duration) -> String {
        let expr = source
            .trim()
            .strip_prefix("print(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(source);
        match expr.split_once('+') {
            Some((a, b)) => match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
                (Ok(a), Ok(b)) => format!("{}\n", a + b),
                _ => format!("Error: cannot evaluate {expr}"),
            },
            None => source.to_string(),
        }
    }
}

/// Answers every request with the same text.
struct FixedBackend(String);

#[async_trait::async_trait]
impl Backend for FixedBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn run(&self, _source: &str, _timeout: Duration) -> String {
        self.0.clone()
    }
}

/// Never returns on its own.
struct HangingBackend;

#[async_trait::async_trait]
impl Backend for HangingBackend {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn run(&self, _source: &str, _timeout: Duration) -> String {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        String::new()
    }
}

fn controller(provider: Arc<ScriptedProvider>, backend: Arc<dyn Backend>, timeout: Duration) -> Arc<Controller> {
    let executor = ActionExecutor::new(timeout, OutputPolicy::default())
        .with_backend(Language::Python, backend);
    Arc::new(Controller::new(provider, Arc::new(executor), "e2e-model"))
}

async fn drain(mut events: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.recv().await {
        out.push(event);
    }
    out
}

fn types(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::event_type).collect()
}

// ── Scenario A: execute, observe, solve ──────────────────────────────────

#[tokio::test]
async fn e2e_compute_two_plus_two() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "<execute>print(2+2)</execute>",
        "<solution>4</solution>",
    ]));
    let controller = controller(provider.clone(), Arc::new(ArithmeticBackend), Duration::from_secs(600));

    let session = run_streaming(controller, "compute 2+2", SessionId::new(), &StreamConfig::default());
    let events = drain(session.events).await;

    assert_eq!(types(&events), vec!["tool_call", "tool_output", "final_answer", "done"]);
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);

    let EventPayload::ToolCall { code, language, .. } = &events[0].payload else {
        panic!("expected tool_call");
    };
    assert_eq!(code, "print(2+2)");
    assert_eq!(*language, Language::Python);

    assert_eq!(
        events[1].payload,
        EventPayload::ToolOutput {
            content: "4".into(),
            timed_out: false
        }
    );
    assert!(events[0].correlation_id.is_some());
    assert_eq!(events[0].correlation_id, events[1].correlation_id);

    assert_eq!(
        events[2].payload,
        EventPayload::FinalAnswer { content: "4".into() }
    );

    let outcome = session.controller.await.unwrap().unwrap();
    assert_eq!(outcome.reason, EndReason::Solved);
    assert_eq!(outcome.answer.as_deref(), Some("4"));
    assert_eq!(provider.calls(), 2);
}

// ── Scenario B: repeated untagged replies ────────────────────────────────

#[tokio::test]
async fn e2e_untagged_replies_terminate_with_explanation() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "The answer is probably four.",
        "I am fairly sure it is four.",
    ]));
    let controller = controller(provider.clone(), Arc::new(ArithmeticBackend), Duration::from_secs(600));

    let session = run_streaming(controller, "compute 2+2", SessionId::new(), &StreamConfig::default());
    let events = drain(session.events).await;

    // Each untagged reply surfaces as reasoning; corrective instructions
    // are user messages and are not streamed.
    assert_eq!(types(&events), vec!["reasoning", "reasoning", "reasoning", "done"]);
    let EventPayload::Reasoning { content } = &events[2].payload else {
        panic!("expected reasoning");
    };
    assert!(content.starts_with("Execution terminated due to repeated parsing errors"));

    let outcome = session.controller.await.unwrap().unwrap();
    assert_eq!(outcome.reason, EndReason::ParseFailures);
    let correctives = outcome
        .transcript
        .iter()
        .filter(|m| m.content.contains("there are no tags in the current response"))
        .count();
    assert_eq!(correctives, 2);
    assert_eq!(provider.calls(), 2);
}

// ── Scenario C: oversized execution result ───────────────────────────────

#[tokio::test]
async fn e2e_long_result_is_truncated_with_header() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "<execute>print('a' * 12000)</execute>",
        "<solution>Printed.</solution>",
    ]));
    let controller = controller(
        provider,
        Arc::new(FixedBackend("a".repeat(12_000))),
        Duration::from_secs(600),
    );

    let session = run_streaming(controller, "print a lot", SessionId::new(), &StreamConfig::default());
    let events = drain(session.events).await;
    assert_eq!(types(&events), vec!["tool_call", "tool_output", "final_answer", "done"]);

    let EventPayload::ToolOutput { content, timed_out } = &events[1].payload else {
        panic!("expected tool_output");
    };
    assert!(!timed_out);
    let policy = OutputPolicy::default();
    let header = policy.truncation_header(12_000, None);
    assert!(header.starts_with("[OUTPUT TRUNCATED: 12000 total characters]"));
    assert_eq!(*content, format!("{header}{}", "a".repeat(10_000)));
    assert_eq!(content.chars().count(), header.chars().count() + 10_000);

    // The model saw the same bounded text.
    let outcome = session.controller.await.unwrap().unwrap();
    let observed = outcome
        .transcript
        .iter()
        .find(|m| m.content.starts_with("<observation>"))
        .expect("observation in transcript");
    assert!(observed.content.contains(header.as_str()));
}

// ── Scenario D: a tool call that never reports back ──────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_silent_tool_call_is_force_resolved() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "<execute>train_model()</execute>",
        "<solution>Training did not finish in time.</solution>",
    ]));
    // The executor waits longer than the stream's liveness bound.
    let controller = controller(provider, Arc::new(HangingBackend), Duration::from_secs(900));
    let config = StreamConfig {
        tool_timeout_secs: 600,
        ..StreamConfig::default()
    };

    let started = tokio::time::Instant::now();
    let session = run_streaming(controller, "train it", SessionId::new(), &config);
    let events = drain(session.events).await;

    assert_eq!(
        types(&events),
        vec!["tool_call", "tool_output", "tool_output", "final_answer", "done"]
    );

    // The orchestrator resolved the call on its own, correlated to it.
    let EventPayload::ToolOutput { content, timed_out } = &events[1].payload else {
        panic!("expected tool_output");
    };
    assert!(*timed_out);
    assert!(content.contains("600s"));
    assert_eq!(events[1].correlation_id, events[0].correlation_id);

    // The executor's own timeout arrives later with no call left to match.
    let EventPayload::ToolOutput { content, .. } = &events[2].payload else {
        panic!("expected tool_output");
    };
    assert!(content.starts_with("Error: execution timed out"));
    assert!(events[2].correlation_id.is_none());

    assert!(started.elapsed() >= Duration::from_secs(900));
    let outcome = session.controller.await.unwrap().unwrap();
    assert_eq!(outcome.reason, EndReason::Solved);
}
