//! HTTP gateway for assay.
//!
//! Streams agent sessions to browsers and other clients as Server-Sent
//! Events: one SSE frame per event, named after the event type, with the
//! event's JSON as data. A client that disconnects abandons its session.

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use assay_agent::{AbandonGuard, Controller, run_streaming};
use assay_config::AppConfig;
use assay_core::message::SessionId;

/// Per-process state; sessions share the controller.
pub struct GatewayState {
    pub config: AppConfig,
    pub controller: Arc<Controller>,
}

pub type SharedState = Arc<GatewayState>;

/// Routes: `/health` and `/api/chat/stream`. CORS allows any origin, GET only.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat/stream", get(chat_stream_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Build provider, executor and catalog once; every session shares them.
pub fn build_state(config: AppConfig) -> Result<SharedState, assay_core::Error> {
    let controller = Arc::new(Controller::build(&config)?);
    Ok(Arc::new(GatewayState { config, controller }))
}

/// Bind `gateway.host:gateway.port` and serve until the process exits.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(build_state(config)?);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct StreamQuery {
    message: String,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// `GET /api/chat/stream?message=...&session_id=...`: run one session and
/// stream its events.
///
/// The session is abandoned when the client disconnects.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Query(query): Query<StreamQuery>,
) -> Result<
    Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>,
    (StatusCode, Json<ErrorResponse>),
> {
    if query.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "message must not be empty".into(),
            }),
        ));
    }

    let session_id = query
        .session_id
        .as_deref()
        .map(SessionId::from)
        .unwrap_or_default();
    info!(session_id = %session_id, message_len = query.message.len(), "Chat stream request");

    let session = run_streaming(
        state.controller.clone(),
        query.message,
        session_id,
        &state.config.stream,
    );
    let guard = AbandonGuard::new(session.abandon.clone());

    let stream = ReceiverStream::new(session.events).map(move |event| {
        let _keep_alive_until_disconnect = &guard;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::action::Language;
    use assay_core::error::ProviderError;
    use assay_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use assay_executor::{ActionExecutor, Backend, OutputPolicy};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ProviderError::NotConfigured("script exhausted".into()));
            }
            Ok(ProviderResponse {
                content: replies.remove(0),
                usage: None,
                model: "scripted".into(),
            })
        }
    }

    struct EchoBackend;

    #[async_trait::async_trait]
    impl Backend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, _source: &str, _timeout: Duration) -> String {
            "4".into()
        }
    }

    fn test_state(replies: &[&str]) -> SharedState {
        let provider = Arc::new(ScriptedProvider {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        });
        let executor = Arc::new(
            ActionExecutor::new(Duration::from_secs(5), OutputPolicy::default())
                .with_backend(Language::Python, Arc::new(EchoBackend)),
        );
        let controller = Arc::new(Controller::new(provider, executor, "scripted"));
        Arc::new(GatewayState {
            config: AppConfig::default(),
            controller,
        })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(&[]));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn chat_stream_emits_sse_frames() {
        let app = build_router(test_state(&[
            "<execute>print(2+2)</execute>",
            "<solution>4</solution>",
        ]));

        let req = Request::builder()
            .uri("/api/chat/stream?message=compute%202%2B2&session_id=abc")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let names: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix("event: "))
            .collect();
        assert_eq!(names, vec!["tool_call", "tool_output", "final_answer", "done"]);
        assert!(text.contains(r#""session_id":"abc""#));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let app = build_router(test_state(&[]));
        let req = Request::builder()
            .uri("/api/chat/stream?message=%20")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_message_is_rejected() {
        let app = build_router(test_state(&[]));
        let req = Request::builder()
            .uri("/api/chat/stream")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn state_builds_from_default_config() {
        let state = build_state(AppConfig::default()).unwrap();
        assert_eq!(state.config.gateway.port, 42680);
    }
}
