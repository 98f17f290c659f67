use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::backend;
use crate::config::AppConfig;
use crate::transport::{CSRF_HEADER, ChatRequest};

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let backend = backend::from_config(&config.backend);
    info!(
        name: "backend.config.loaded",
        kind = ?config.backend.kind,
        base_url = %config.backend.base_url,
        model = %config.backend.model,
        "Reply backend configured"
    );

    let state = AppState {
        backend,
        config: Arc::clone(&config),
    };
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let timeout_duration = state.config.resilience.request_timeout();

    Router::new()
        .route("/send_message/", post(send_message))
        .route("/health", get(|| async { "ok" }))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| {
                let duration = timeout_duration;
                async move {
                    match tokio::time::timeout(duration, next.run(req)).await {
                        Ok(res) => res,
                        Err(_) => {
                            (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response()
                        }
                    }
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Error/success envelope returned as JSON.
#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl StatusBody {
    fn error(response: impl Into<String>) -> Self {
        Self {
            status: "error",
            response: Some(response.into()),
            detail: None,
        }
    }

    fn success(response: String) -> Self {
        Self {
            status: "success",
            response: Some(response),
            detail: None,
        }
    }
}

/// POST /send_message/ - Stream the reply to one message.
async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(expected) = &state.config.server.csrf_token {
        let provided = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::warn!(name: "chat.csrf.rejected", "CSRF token missing or invalid");
            let body = StatusBody {
                status: "error",
                response: None,
                detail: Some("CSRF verification failed.".to_string()),
            };
            return (StatusCode::FORBIDDEN, Json(body)).into_response();
        }
    }

    let Ok(req) = serde_json::from_slice::<ChatRequest>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(StatusBody::error("Invalid data format.")),
        )
            .into_response();
    };

    let message = req.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(StatusBody::error("Message cannot be empty.")),
        )
            .into_response();
    }

    tracing::info!(name: "chat.message.received", chars = message.chars().count(), "Received chat message");

    let mut reply = match state.backend.stream_reply(message).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(name: "chat.backend.failed", error = %e, "Reply stream failed to start");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(StatusBody::error(format!(
                    "Server stream failed. Check if LLM service is running. Error details: {e}"
                ))),
            )
                .into_response();
        }
    };

    if wants_json(&headers) {
        let mut text = String::new();
        while let Some(part) = reply.next().await {
            match part {
                Ok(part) => text.push_str(&part),
                Err(e) => {
                    tracing::error!(name: "chat.backend.interrupted", error = %e, "Reply stream broke off");
                    text.push_str(&format!("An unexpected error occurred: {e}"));
                    break;
                }
            }
        }
        return Json(StatusBody::success(text)).into_response();
    }

    // Mid-stream backend errors become the final text chunk; the status line is already sent.
    let body = async_stream::stream! {
        while let Some(part) = reply.next().await {
            match part {
                Ok(part) => yield Ok::<_, Infallible>(part),
                Err(e) => {
                    tracing::error!(name: "chat.backend.interrupted", error = %e, "Reply stream broke off");
                    yield Ok(format!("An unexpected error occurred: {e}"));
                    break;
                }
            }
        }
    };

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}
