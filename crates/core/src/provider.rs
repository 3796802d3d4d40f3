//! The model seam.
//!
//! The controller hands a [`Provider`] the system prompt plus the whole
//! transcript and gets one reply back. Nothing streams at this layer: the
//! reply is parsed as a unit, and a failure carries enough detail in its
//! [`ProviderError`] for the controller to decide between shrinking the
//! context and giving up.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,

    /// System prompt first, then the transcript in order.
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Generation halts as soon as the model emits one of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// The model's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: Option<Usage>,
    /// The model that answered, as reported by the endpoint.
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A chat-completion backend. A session keeps at most one call in flight.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier used in logs, e.g. `openai`.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;
}
