//! Context-overflow recovery.
//!
//! When a model call fails in a way that shrinking the context might fix,
//! the controller truncates the most recent observation and retries once.
//! If that also fails, the session ends with a synthesized solution that
//! tells the user what went wrong.

use assay_core::error::FailureClass;

use crate::machine::observation;
use crate::session::Session;

/// Characters of the original observation kept after truncation.
pub const DEFAULT_KEEP_CHARS: usize = 2000;

/// Truncate the most recent observation in `session` to `keep_chars`
/// characters. Returns `true` if a message was rewritten.
pub fn truncate_last_observation(session: &mut Session, keep_chars: usize) -> bool {
    let Some(index) = session.last_observation_index() else {
        return false;
    };
    let content = &session.messages()[index].content;
    let Some(truncated) = truncated_observation(content, keep_chars) else {
        return false;
    };
    tracing::warn!(
        session_id = %session.id,
        seq = session.messages()[index].seq,
        original_chars = content.chars().count(),
        "Truncating observation after context overflow"
    );
    session.rewrite_content(index, truncated);
    true
}

/// The shortened observation, or `None` if it already fits.
fn truncated_observation(content: &str, keep_chars: usize) -> Option<String> {
    let inner = content
        .strip_prefix("<observation>")
        .and_then(|s| s.strip_suffix("</observation>"))
        .unwrap_or(content);
    let total = inner.chars().count();
    if total <= keep_chars {
        return None;
    }
    let kept: String = inner.chars().take(keep_chars).collect();
    Some(observation(&format!(
        "[TRUNCATED DUE TO CONTEXT OVERFLOW - Original: {total} chars]\n{kept}\n[...truncated...]"
    )))
}

/// Terminal solution describing why the model could not continue.
pub fn synthesized_solution(class: FailureClass) -> String {
    let body = match class {
        FailureClass::Misconfigured => {
            "Error: API authentication or endpoint configuration issue. \
             The model could not be reached with the current settings. \
             Check the API key, the provider URL and the model name, then try again."
        }
        FailureClass::ContextOverflow => {
            "Error: The context was too long for the model to process. \
             The conversation grew past what the model accepts even after \
             shortening the latest output. Try to break down the task into \
             smaller steps, or ask for less output per step."
        }
    };
    format!("<solution>{body}</solution>")
}
