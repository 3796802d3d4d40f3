//! Message and session identity types.
//!
//! A session's transcript is an ordered list of [`Message`]s. The controller
//! reasons over nothing else, so every observation, corrective instruction
//! and critique is a message too.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier correlating a controller, its stream orchestrator and
/// any caller-side persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user, or corrective instructions injected on their behalf
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Execution result fed back to the model
    Tool,
}

impl Role {
    /// Header label used when a message is rendered as a transcript chunk.
    pub fn header_label(self) -> &'static str {
        match self {
            Self::User => "Human Message",
            Self::Assistant => "Ai Message",
            Self::System => "System Message",
            Self::Tool => "Tool Message",
        }
    }
}

/// Width of a rendered header line.
const HEADER_WIDTH: usize = 80;

/// A single message in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Position in the transcript, assigned on append
    pub seq: u64,

    /// Who sent this message
    pub role: Role,

    /// The literal text content
    pub content: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            seq: 0,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create an execution-result message.
    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::with_role(Role::Tool, content)
    }

    /// Render as a transcript chunk: a padded role header, a blank line, then
    /// the content.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", render_header(self.role), self.content)
    }
}

/// `==== Ai Message ====` style header padded to a fixed width.
pub fn render_header(role: Role) -> String {
    let label = format!(" {} ", role.header_label());
    let fill = HEADER_WIDTH.saturating_sub(label.len());
    let left = fill / 2;
    let right = fill - left;
    format!("{}{}{}", "=".repeat(left), label, "=".repeat(right))
}
