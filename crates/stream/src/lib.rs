//! Streaming events for assay sessions.
//!
//! A controller pushes rendered transcript messages as [`Chunk`]s onto a
//! bounded channel. The [`StreamOrchestrator`] on the other end classifies
//! them with the [`EventClassifier`] and emits typed, sequenced
//! [`StreamEvent`]s to a UI-facing sink.
//!
//! [`Chunk`]: assay_core::Chunk

pub mod classifier;
pub mod event;
pub mod orchestrator;
pub mod plan;

pub use classifier::EventClassifier;
pub use event::{EventPayload, Priority, StreamEvent};
pub use orchestrator::{OrchestratorConfig, StreamOrchestrator, StreamStats};
pub use plan::{PlanStep, StepStatus};
