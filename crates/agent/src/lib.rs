//! The agent loop for assay.
//!
//! A session follows a **Generate → Execute → Observe** cycle:
//!
//! 1. **Receive** the user's task
//! 2. **Generate**: send the system prompt and transcript to the model
//! 3. **Parse** the reply into `<execute>`, `<solution>` or reasoning
//! 4. **Execute** code blocks and append the output as an observation,
//!    then loop back to step 2
//! 5. **End** on a solution (after optional self-critique rounds), on
//!    repeated untagged replies, at the step limit, or when abandoned
//!
//! Every appended message is also pushed to a chunk channel so a
//! [`StreamOrchestrator`](assay_stream::StreamOrchestrator) can turn the
//! session into live events; see [`run_streaming`].

pub mod controller;
pub mod machine;
pub mod prompt;
pub mod recovery;
pub mod session;
pub mod streaming;

#[cfg(test)]
mod test_helpers;

pub use controller::{AbandonHandle, Controller, SessionOutcome};
pub use machine::{EndReason, Limits, State};
pub use prompt::SystemPrompt;
pub use session::Session;
pub use streaming::{AbandonGuard, StreamingSession, run_streaming};
