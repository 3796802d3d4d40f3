//! Transcript chunks flowing from a controller to its stream orchestrator.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// One unit on the controller → orchestrator channel.
///
/// Closing the channel signals completion; there is no explicit end chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Chunk {
    /// A rendered transcript message (role header plus content).
    Text(String),
    /// The producer failed; the text explains why.
    Failed(String),
}

impl Chunk {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(t) | Self::Failed(t) => t,
        }
    }
}

impl From<&Message> for Chunk {
    fn from(message: &Message) -> Self {
        Self::Text(message.render())
    }
}
