//! Streaming Orchestrator: live chunks in, ordered events out.
//!
//! Runs as its own task between the controller's chunk channel and the
//! UI-facing event sink:
//!
//! - chunks are split into role-headed units; agent and tool units are
//!   classified, user and system units are skipped
//! - every `tool_call` registers a pending call; the next `tool_output`
//!   resolves the most recent unmatched one
//! - a liveness check runs on every poll interval and force-resolves calls
//!   older than the tool timeout with a synthetic `tool_output`
//! - events wait in a two-lane outbox. With sink capacity available they
//!   leave in document order; when the sink is congested, high-priority
//!   events go first once capacity frees
//! - when the chunk channel closes, pending calls are force-resolved and a
//!   final `done` event is emitted

use assay_config::StreamConfig;
use assay_core::catalog::ResourceCatalog;
use assay_core::chunk::Chunk;
use assay_core::message::{Role, SessionId};
use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classifier::EventClassifier;
use crate::event::{EventPayload, Priority, StreamEvent};

/// Timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Age at which a pending tool call is force-resolved
    pub tool_timeout: Duration,
    /// Liveness check interval
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(630),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<&StreamConfig> for OrchestratorConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            tool_timeout: Duration::from_secs(config.tool_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Events delivered, including the final `done`.
    pub events_emitted: u64,
    /// Pending calls resolved by timeout or at close.
    pub forced_resolutions: u64,
}

/// A `tool_call` still waiting for its output.
#[derive(Debug, Clone)]
struct PendingToolCall {
    id: String,
    dispatched: Instant,
}

/// An event waiting for sink capacity.
#[derive(Debug)]
struct Queued {
    arrival: u64,
    correlation_id: Option<String>,
    payload: EventPayload,
}

/// Two FIFO lanes sharing one arrival counter.
#[derive(Debug, Default)]
struct Outbox {
    high: VecDeque<Queued>,
    normal: VecDeque<Queued>,
    arrivals: u64,
}

impl Outbox {
    fn push(&mut self, payload: EventPayload, correlation_id: Option<String>) {
        self.arrivals += 1;
        let queued = Queued {
            arrival: self.arrivals,
            correlation_id,
            payload,
        };
        match queued.payload.priority() {
            Priority::High => self.high.push_back(queued),
            Priority::Normal => self.normal.push_back(queued),
        }
    }

    fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    /// Oldest event overall.
    fn pop_in_order(&mut self) -> Option<Queued> {
        match (self.high.front(), self.normal.front()) {
            (Some(h), Some(n)) if n.arrival < h.arrival => self.normal.pop_front(),
            (Some(_), _) => self.high.pop_front(),
            (None, _) => self.normal.pop_front(),
        }
    }

    /// Oldest high-priority event, else oldest normal one.
    fn pop_priority(&mut self) -> Option<Queued> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    fn clear(&mut self) {
        self.high.clear();
        self.normal.clear();
    }
}

/// Per-session orchestrator state. Consumed by [`StreamOrchestrator::run`].
pub struct StreamOrchestrator {
    session_id: SessionId,
    classifier: EventClassifier,
    config: OrchestratorConfig,
    pending: VecDeque<PendingToolCall>,
    outbox: Outbox,
    last_normal: Option<EventPayload>,
    emitted: u64,
    forced: u64,
    sink_closed: bool,
}

impl StreamOrchestrator {
    pub fn new(session_id: SessionId, config: OrchestratorConfig) -> Self {
        Self {
            session_id,
            classifier: EventClassifier::new(),
            config,
            pending: VecDeque::new(),
            outbox: Outbox::default(),
            last_normal: None,
            emitted: 0,
            forced: 0,
            sink_closed: false,
        }
    }

    /// Track catalog tool references in `tool_call` events.
    pub fn with_catalog(mut self, catalog: &ResourceCatalog) -> Self {
        self.classifier = EventClassifier::with_catalog(catalog);
        self
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(
        self,
        chunks: mpsc::Receiver<Chunk>,
        sink: mpsc::Sender<StreamEvent>,
    ) -> tokio::task::JoinHandle<StreamStats> {
        tokio::spawn(self.run(chunks, sink))
    }

    /// Consume chunks until the channel closes, then finish the stream.
    ///
    /// A dropped sink does not stop consumption: chunks keep being drained
    /// so the producer never blocks on a departed consumer.
    pub async fn run(
        mut self,
        mut chunks: mpsc::Receiver<Chunk>,
        sink: mpsc::Sender<StreamEvent>,
    ) -> StreamStats {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = chunks.recv() => match next {
                    Some(chunk) => {
                        self.accept(chunk);
                        self.expire_stale(Instant::now());
                    }
                    None => break,
                },
                _ = ticker.tick() => self.expire_stale(Instant::now()),
            }
            self.flush(&sink).await;
        }

        self.resolve_all_pending();
        self.flush(&sink).await;

        let done = EventPayload::Done {
            session_id: self.session_id.to_string(),
            events_emitted: self.emitted + 1,
        };
        self.outbox.push(done, None);
        self.flush(&sink).await;

        info!(
            session_id = %self.session_id,
            events = self.emitted,
            forced = self.forced,
            "Event stream finished"
        );

        StreamStats {
            events_emitted: self.emitted,
            forced_resolutions: self.forced,
        }
    }

    /// Classify one chunk into the outbox.
    fn accept(&mut self, chunk: Chunk) {
        match chunk {
            Chunk::Failed(message) => {
                warn!(session_id = %self.session_id, "Producer reported failure");
                self.enqueue(EventPayload::Error { message });
            }
            Chunk::Text(text) => {
                for (role, body) in split_units(&text) {
                    let events = match role {
                        Some(Role::User | Role::System) => continue,
                        Some(Role::Tool) => self.classifier.classify_tool_message(body),
                        Some(Role::Assistant) | None => self.classifier.classify(body),
                    };
                    for payload in events {
                        self.enqueue(payload);
                    }
                }
            }
        }
    }

    /// Correlate, de-duplicate and queue one payload.
    fn enqueue(&mut self, payload: EventPayload) {
        let correlation_id = match &payload {
            EventPayload::ToolCall { .. } => {
                let id = uuid::Uuid::new_v4().to_string();
                self.pending.push_back(PendingToolCall {
                    id: id.clone(),
                    dispatched: Instant::now(),
                });
                Some(id)
            }
            EventPayload::ToolOutput { .. } => self.pending.pop_back().map(|p| p.id),
            _ => None,
        };

        match payload.priority() {
            Priority::Normal => {
                if self.last_normal.as_ref() == Some(&payload) {
                    debug!(event = payload.event_type(), "Suppressing repeated event");
                    return;
                }
                self.last_normal = Some(payload.clone());
            }
            Priority::High => self.last_normal = None,
        }

        self.outbox.push(payload, correlation_id);
    }

    /// Force-resolve pending calls dispatched more than the tool timeout ago.
    fn expire_stale(&mut self, now: Instant) {
        while let Some(oldest) = self.pending.front() {
            if now.duration_since(oldest.dispatched) < self.config.tool_timeout {
                break;
            }
            if let Some(call) = self.pending.pop_front() {
                warn!(
                    session_id = %self.session_id,
                    call_id = %call.id,
                    timeout_secs = self.config.tool_timeout.as_secs(),
                    "Tool call produced no output in time"
                );
                self.force_resolve(call);
            }
        }
    }

    fn resolve_all_pending(&mut self) {
        while let Some(call) = self.pending.pop_front() {
            debug!(call_id = %call.id, "Resolving pending call at stream end");
            self.force_resolve(call);
        }
    }

    fn force_resolve(&mut self, call: PendingToolCall) {
        self.forced += 1;
        self.last_normal = None;
        let payload = EventPayload::ToolOutput {
            content: timeout_notice(self.config.tool_timeout),
            timed_out: true,
        };
        self.outbox.push(payload, Some(call.id));
    }

    /// Deliver queued events. Waits for capacity when the sink is full, and
    /// then lets high-priority events go first.
    async fn flush(&mut self, sink: &mpsc::Sender<StreamEvent>) {
        if self.sink_closed {
            self.outbox.clear();
            return;
        }

        while !self.outbox.is_empty() {
            let (permit, queued) = match sink.try_reserve() {
                Ok(permit) => (permit, self.outbox.pop_in_order()),
                Err(TrySendError::Full(())) => match sink.reserve().await {
                    Ok(permit) => (permit, self.outbox.pop_priority()),
                    Err(_) => {
                        self.close_sink();
                        return;
                    }
                },
                Err(TrySendError::Closed(())) => {
                    self.close_sink();
                    return;
                }
            };

            let Some(queued) = queued else { break };
            self.emitted += 1;
            let event = StreamEvent {
                seq: self.emitted,
                priority: queued.payload.priority(),
                timestamp: Utc::now(),
                correlation_id: queued.correlation_id,
                payload: queued.payload,
            };
            debug!(seq = event.seq, event = event.event_type(), "Emitting event");
            permit.send(event);
        }
    }

    fn close_sink(&mut self) {
        debug!(session_id = %self.session_id, "Event sink closed, discarding events");
        self.sink_closed = true;
        self.outbox.clear();
    }
}

/// Content of a synthesized timeout observation.
pub fn timeout_notice(timeout: Duration) -> String {
    format!(
        "Tool execution exceeded the expected duration of {}s without returning output. \
         The call has been marked as timed out.",
        timeout.as_secs()
    )
}

/// Split chunk text into role-headed units. Text before the first header
/// (or a chunk with no header at all) has no role.
fn split_units(text: &str) -> Vec<(Option<Role>, &str)> {
    let mut units = Vec::new();
    let mut role = None;
    let mut start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if let Some(next_role) = parse_header(line) {
            let body = &text[start..offset];
            if !body.trim().is_empty() {
                units.push((role, body));
            }
            role = Some(next_role);
            start = offset + line.len();
        }
        offset += line.len();
    }

    let body = &text[start..];
    if !body.trim().is_empty() {
        units.push((role, body));
    }
    units
}

fn parse_header(line: &str) -> Option<Role> {
    let line = line.trim();
    if !line.starts_with("==") || !line.ends_with("==") {
        return None;
    }
    match line.trim_matches('=').trim() {
        "Ai Message" => Some(Role::Assistant),
        "Human Message" => Some(Role::User),
        "System Message" => Some(Role::System),
        "Tool Message" => Some(Role::Tool),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::message::Message;

    fn chunk(message: Message) -> Chunk {
        Chunk::from(&message)
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[test]
    fn units_split_on_headers() {
        let text = format!(
            "{}\n{}",
            Message::user("compute 2+2").render(),
            Message::assistant("<execute>print(2+2)</execute>").render()
        );
        let units = split_units(&text);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].0, Some(Role::User));
        assert_eq!(units[1].0, Some(Role::Assistant));
        assert_eq!(units[1].1.trim(), "<execute>print(2+2)</execute>");

        let bare = split_units("no header here");
        assert_eq!(bare, vec![(None, "no header here")]);
    }

    #[test]
    fn rule_lines_are_not_headers() {
        assert_eq!(parse_header(&"=".repeat(50)), None);
        assert_eq!(parse_header("== Tool Message =="), Some(Role::Tool));
    }

    #[tokio::test]
    async fn tool_call_and_output_are_correlated() {
        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let handle = StreamOrchestrator::new(SessionId::from("s-1"), OrchestratorConfig::default())
            .spawn(chunk_rx, event_tx);

        chunk_tx.send(chunk(Message::user("compute 2+2"))).await.unwrap();
        chunk_tx
            .send(chunk(Message::assistant("<execute>print(2+2)</execute>")))
            .await
            .unwrap();
        chunk_tx
            .send(chunk(Message::tool_result("<observation>4</observation>")))
            .await
            .unwrap();
        chunk_tx
            .send(chunk(Message::assistant("<solution>4</solution>")))
            .await
            .unwrap();
        drop(chunk_tx);

        let events = collect(event_rx).await;
        assert_eq!(
            types(&events),
            vec!["tool_call", "tool_output", "final_answer", "done"]
        );
        assert!(events[0].correlation_id.is_some());
        assert_eq!(events[0].correlation_id, events[1].correlation_id);
        assert_eq!(
            events[1].payload,
            EventPayload::ToolOutput {
                content: "4".into(),
                timed_out: false
            }
        );
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(
            events[3].payload,
            EventPayload::Done {
                session_id: "s-1".into(),
                events_emitted: 4
            }
        );

        let stats = handle.await.unwrap();
        assert_eq!(stats.events_emitted, 4);
        assert_eq!(stats.forced_resolutions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_tool_call_is_force_resolved_once() {
        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let config = OrchestratorConfig {
            tool_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(100),
        };
        let handle = StreamOrchestrator::new(SessionId::from("s-2"), config).spawn(chunk_rx, event_tx);

        chunk_tx
            .send(chunk(Message::assistant("<execute>import time; time.sleep(10**6)</execute>")))
            .await
            .unwrap();

        let call = event_rx.recv().await.unwrap();
        assert_eq!(call.event_type(), "tool_call");
        let started = Instant::now();

        // Time auto-advances while everything is idle.
        let timeout = event_rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(599));
        assert_eq!(timeout.correlation_id, call.correlation_id);
        let EventPayload::ToolOutput { content, timed_out } = &timeout.payload else {
            panic!("expected tool_output, got {:?}", timeout.payload);
        };
        assert!(timed_out);
        assert!(content.contains("600s"));

        // A late observation no longer matches anything.
        chunk_tx
            .send(chunk(Message::tool_result("<observation>late</observation>")))
            .await
            .unwrap();
        drop(chunk_tx);

        let rest = collect(event_rx).await;
        assert_eq!(types(&rest), vec!["tool_output", "done"]);
        assert!(rest[0].correlation_id.is_none());

        let stats = handle.await.unwrap();
        assert_eq!(stats.forced_resolutions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn output_answers_latest_call_and_older_one_times_out() {
        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let config = OrchestratorConfig {
            tool_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(100),
        };
        let handle = StreamOrchestrator::new(SessionId::from("s-3"), config).spawn(chunk_rx, event_tx);

        chunk_tx
            .send(chunk(Message::assistant("<execute>load_cohort()</execute>")))
            .await
            .unwrap();
        chunk_tx
            .send(chunk(Message::assistant("<execute>print(2+2)</execute>")))
            .await
            .unwrap();
        let first = event_rx.recv().await.unwrap();
        let second = event_rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "tool_call");
        assert_eq!(second.event_type(), "tool_call");
        assert_ne!(first.correlation_id, second.correlation_id);

        chunk_tx
            .send(chunk(Message::tool_result("<observation>4</observation>")))
            .await
            .unwrap();
        let output = event_rx.recv().await.unwrap();
        assert_eq!(
            output.payload,
            EventPayload::ToolOutput {
                content: "4".into(),
                timed_out: false
            }
        );
        assert_eq!(output.correlation_id, second.correlation_id);

        // The older call is still pending and ages out on its own.
        let forced = event_rx.recv().await.unwrap();
        assert_eq!(forced.correlation_id, first.correlation_id);
        assert!(matches!(
            forced.payload,
            EventPayload::ToolOutput { timed_out: true, .. }
        ));

        drop(chunk_tx);
        let rest = collect(event_rx).await;
        assert_eq!(types(&rest), vec!["done"]);
        assert_eq!(handle.await.unwrap().forced_resolutions, 1);
    }

    #[tokio::test]
    async fn pending_calls_resolve_at_close() {
        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let handle = StreamOrchestrator::new(SessionId::new(), OrchestratorConfig::default())
            .spawn(chunk_rx, event_tx);

        chunk_tx
            .send(chunk(Message::assistant("<execute>print(1)</execute>")))
            .await
            .unwrap();
        drop(chunk_tx);

        let events = collect(event_rx).await;
        assert_eq!(types(&events), vec!["tool_call", "tool_output", "done"]);
        assert!(matches!(
            events[1].payload,
            EventPayload::ToolOutput { timed_out: true, .. }
        ));
        assert_eq!(handle.await.unwrap().forced_resolutions, 1);
    }

    #[tokio::test]
    async fn failed_chunk_becomes_error_then_done() {
        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let _handle = StreamOrchestrator::new(SessionId::new(), OrchestratorConfig::default())
            .spawn(chunk_rx, event_tx);

        chunk_tx
            .send(Chunk::Failed("provider unreachable".into()))
            .await
            .unwrap();
        drop(chunk_tx);

        let events = collect(event_rx).await;
        assert_eq!(types(&events), vec!["error", "done"]);
    }

    #[tokio::test]
    async fn repeated_reasoning_is_suppressed() {
        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let _handle = StreamOrchestrator::new(SessionId::new(), OrchestratorConfig::default())
            .spawn(chunk_rx, event_tx);

        for _ in 0..2 {
            chunk_tx
                .send(chunk(Message::assistant("The answer is probably 4.")))
                .await
                .unwrap();
            chunk_tx
                .send(chunk(Message::user("Please use the tags.")))
                .await
                .unwrap();
        }
        drop(chunk_tx);

        let events = collect(event_rx).await;
        assert_eq!(types(&events), vec!["reasoning", "done"]);
    }

    #[tokio::test]
    async fn congested_sink_lets_high_priority_overtake() {
        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(1);
        let _handle = StreamOrchestrator::new(SessionId::new(), OrchestratorConfig::default())
            .spawn(chunk_rx, event_tx);

        let reply = "I need to load the cohort table and summarise expression per gene first.\n\
                     1. [ ] Load table\n\
                     2. [ ] Summarise\n\
                     <execute>print(df.describe())</execute>";
        chunk_tx.send(chunk(Message::assistant(reply))).await.unwrap();
        drop(chunk_tx);

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }

        // The first event went out while the sink had room; after that the
        // queued tool_call overtook the queued planning event.
        assert_eq!(
            types(&events),
            vec!["reasoning", "tool_call", "planning", "tool_output", "done"]
        );
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn dropped_sink_does_not_block_producer() {
        let (chunk_tx, chunk_rx) = mpsc::channel(2);
        let (event_tx, event_rx) = mpsc::channel(1);
        let handle = StreamOrchestrator::new(SessionId::new(), OrchestratorConfig::default())
            .spawn(chunk_rx, event_tx);
        drop(event_rx);

        for i in 0..20 {
            chunk_tx
                .send(chunk(Message::assistant(format!("<solution>{i}</solution>"))))
                .await
                .unwrap();
        }
        drop(chunk_tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.events_emitted, 0);
    }
}
