//! Chat-completions client for any OpenAI-compatible endpoint.
//!
//! One POST to `{base_url}/chat/completions` per call, no streaming. The
//! transcript's tool observations carry no tool-call id, so they travel
//! as `user` turns.

use assay_core::error::ProviderError;
use assay_core::message::{Message, Role};
use assay_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on one completion round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        let base_url: String = base_url.into();

        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = wire::ChatRequest::from_request(&request);
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = body.messages.len(),
            "Requesting completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status = status.as_u16(), body = %detail, "Completion rejected");
            return Err(wire::rejection(status.as_u16(), detail));
        }

        let reply: wire::ChatResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: status.as_u16(),
                message: format!("unreadable completion body: {e}"),
            })?;
        reply.into_response()
    }
}

/// Request and response shapes of the chat-completions protocol.
mod wire {
    use super::*;

    #[derive(Debug, Serialize)]
    pub(super) struct ChatRequest<'a> {
        pub model: &'a str,
        pub messages: Vec<Turn<'a>>,
        pub temperature: f32,
        pub stream: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<u32>,
        #[serde(skip_serializing_if = "<[String]>::is_empty")]
        pub stop: &'a [String],
    }

    #[derive(Debug, Serialize)]
    pub(super) struct Turn<'a> {
        pub role: &'static str,
        pub content: &'a str,
    }

    impl<'a> ChatRequest<'a> {
        pub fn from_request(request: &'a ProviderRequest) -> Self {
            Self {
                model: &request.model,
                messages: request.messages.iter().map(Turn::from_message).collect(),
                temperature: request.temperature,
                stream: false,
                max_tokens: request.max_tokens,
                stop: &request.stop,
            }
        }
    }

    impl<'a> Turn<'a> {
        fn from_message(message: &'a Message) -> Self {
            let role = match message.role {
                Role::System => "system",
                Role::Assistant => "assistant",
                Role::User | Role::Tool => "user",
            };
            Self {
                role,
                content: &message.content,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ChatResponse {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        choices: Option<Vec<Choice>>,
        #[serde(default)]
        usage: Option<TokenCounts>,
    }

    #[derive(Debug, Deserialize)]
    struct Choice {
        message: ReplyMessage,
    }

    #[derive(Debug, Deserialize)]
    struct ReplyMessage {
        #[serde(default)]
        content: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct TokenCounts {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    }

    impl ChatResponse {
        /// A null `choices` array or null content is how overloaded or
        /// overflowing endpoints answer; both surface as empty responses.
        pub fn into_response(self) -> Result<ProviderResponse, ProviderError> {
            let choice = self
                .choices
                .and_then(|choices| choices.into_iter().next())
                .ok_or_else(|| ProviderError::EmptyResponse("null value for choices".into()))?;
            let content = choice.message.content.ok_or_else(|| {
                ProviderError::EmptyResponse("null value for message content".into())
            })?;

            Ok(ProviderResponse {
                content,
                usage: self.usage.map(|u| Usage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                }),
                model: self.model.unwrap_or_default(),
            })
        }
    }

    /// Error for a non-2xx answer.
    pub(super) fn rejection(status: u16, body: String) -> ProviderError {
        match status {
            401 | 403 => {
                ProviderError::AuthenticationFailed("API key rejected or lacks permission".into())
            }
            404 => ProviderError::ApiError {
                status_code: status,
                message: format!("no such route, check the endpoint URL: {body}"),
            },
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}
