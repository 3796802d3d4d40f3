//! Streaming sessions: a controller and an orchestrator joined by a
//! bounded chunk channel.

use assay_config::StreamConfig;
use assay_core::error::Result;
use assay_core::message::SessionId;
use assay_stream::{OrchestratorConfig, StreamEvent, StreamOrchestrator, StreamStats};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::controller::{AbandonHandle, Controller, SessionOutcome};

/// Handles to a running streamed session.
pub struct StreamingSession {
    pub session_id: SessionId,
    /// Ordered events, ending with `done`.
    pub events: mpsc::Receiver<StreamEvent>,
    pub abandon: AbandonHandle,
    pub controller: JoinHandle<Result<SessionOutcome>>,
    pub orchestrator: JoinHandle<StreamStats>,
}

/// Abandons the session when dropped, e.g. when an HTTP client goes away.
#[derive(Debug)]
pub struct AbandonGuard(AbandonHandle);

impl AbandonGuard {
    pub fn new(handle: AbandonHandle) -> Self {
        Self(handle)
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

/// Start `task` on `controller` and stream its events.
///
/// Both halves run on their own tasks. Dropping `events` does not stop the
/// controller; use `abandon` for that.
pub fn run_streaming(
    controller: Arc<Controller>,
    task: impl Into<String>,
    session_id: SessionId,
    config: &StreamConfig,
) -> StreamingSession {
    let task = task.into();
    let (chunk_tx, chunk_rx) = mpsc::channel(config.chunk_capacity.max(1));
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
    let abandon = AbandonHandle::new();

    tracing::debug!(
        session_id = %session_id,
        chunk_capacity = config.chunk_capacity,
        event_capacity = config.event_capacity,
        "Starting streamed session"
    );

    let orchestrator = StreamOrchestrator::new(session_id.clone(), OrchestratorConfig::from(config))
        .with_catalog(controller.catalog())
        .spawn(chunk_rx, event_tx);

    let controller = {
        let session_id = session_id.clone();
        let abandon = abandon.clone();
        tokio::spawn(async move {
            controller
                .run(&task, session_id, Some(chunk_tx), &abandon)
                .await
        })
    };

    StreamingSession {
        session_id,
        events: event_rx,
        abandon,
        controller,
        orchestrator,
    }
}
