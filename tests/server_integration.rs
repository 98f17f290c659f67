use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::routing::post;
use axum_test::TestServer;
use serde_json::{Value, json};

use streaming_chat::AppState;
use streaming_chat::backend::{BackendKind, CannedBackend, ReplyBackend, TextStream};
use streaming_chat::chat::{
    ChatView, ERROR_ANNOTATION_PREFIX, MemoryView, StaticToken, StreamingChatClient, TurnOutcome,
};
use streaming_chat::config::{
    AppConfig, BackendConfig, ClientConfig, ResilienceConfig, ServerConfig,
};
use streaming_chat::server::router;
use streaming_chat::transport::{HttpTransport, ReplyMode};
use streaming_chat::{ChatError, Result};

const GREETING: &str = "Hello there! Nice to meet you! \u{1F44B}";

fn app_config(csrf_token: Option<&str>) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            csrf_token: csrf_token.map(ToString::to_string),
        },
        client: ClientConfig {
            endpoint: "http://127.0.0.1:8000/send_message/".to_string(),
            csrf_token: None,
            mode: ReplyMode::Stream,
            connect_timeout_secs: 5,
            idle_timeout_secs: 10,
            max_response_bytes: 1024 * 1024,
            reply_delay_ms: 0,
            welcome_message: "Hi!".to_string(),
        },
        backend: BackendConfig {
            kind: BackendKind::Canned,
            base_url: "http://localhost:11434".to_string(),
            model: "tinyllama".to_string(),
            system_prompt: String::new(),
        },
        resilience: ResilienceConfig {
            timeout_disabled: false,
            request_timeout_secs: 30,
        },
    }
}

fn app(backend: Arc<dyn ReplyBackend>, csrf_token: Option<&str>) -> Router {
    router(AppState {
        backend,
        config: Arc::new(app_config(csrf_token)),
    })
}

fn test_server(backend: Arc<dyn ReplyBackend>, csrf_token: Option<&str>) -> TestServer {
    TestServer::new(app(backend, csrf_token)).expect("Failed to start test server")
}

fn csrf_header() -> HeaderName {
    HeaderName::from_static("x-csrftoken")
}

/// Backend that cannot start a reply.
#[derive(Debug)]
struct UnreachableModel;

#[async_trait::async_trait]
impl ReplyBackend for UnreachableModel {
    async fn stream_reply(&self, _prompt: &str) -> Result<TextStream> {
        Err(ChatError::Backend("connection refused".into()))
    }
}

/// Backend that breaks off after one fragment.
#[derive(Debug)]
struct FlakyModel;

#[async_trait::async_trait]
impl ReplyBackend for FlakyModel {
    async fn stream_reply(&self, _prompt: &str) -> Result<TextStream> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok("Drink water. ".to_string()),
            Err(ChatError::Stream("model crashed".into())),
        ])))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler behaviour
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let server = test_server(Arc::new(CannedBackend::new()), None);
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_streams_plain_text_reply() {
    let server = test_server(Arc::new(CannedBackend::new()), None);

    let response = server
        .post("/send_message/")
        .json(&json!({"message": "hello"}))
        .await;

    response.assert_status_ok();
    let content_type = response.header(header::CONTENT_TYPE);
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    assert_eq!(response.text(), GREETING);
}

#[tokio::test]
async fn test_json_accept_returns_whole_reply() {
    let server = test_server(Arc::new(CannedBackend::new()), None);

    let response = server
        .post("/send_message/")
        .add_header(header::ACCEPT, HeaderValue::from_static("application/json"))
        .json(&json!({"message": "hello"}))
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({"status": "success", "response": GREETING}));
}

#[tokio::test]
async fn test_rejects_malformed_body() {
    let server = test_server(Arc::new(CannedBackend::new()), None);

    let response = server.post("/send_message/").text("not json").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"status": "error", "response": "Invalid data format."}));
}

#[tokio::test]
async fn test_rejects_empty_message() {
    let server = test_server(Arc::new(CannedBackend::new()), None);

    let response = server
        .post("/send_message/")
        .json(&json!({"message": "   "}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["response"], "Message cannot be empty.");
}

#[tokio::test]
async fn test_csrf_token_enforced_when_configured() {
    let server = test_server(Arc::new(CannedBackend::new()), Some("s3cr3t"));

    let missing = server
        .post("/send_message/")
        .json(&json!({"message": "hello"}))
        .await;
    missing.assert_status(StatusCode::FORBIDDEN);
    missing.assert_json(&json!({"status": "error", "detail": "CSRF verification failed."}));

    let wrong = server
        .post("/send_message/")
        .add_header(csrf_header(), HeaderValue::from_static("nope"))
        .json(&json!({"message": "hello"}))
        .await;
    wrong.assert_status(StatusCode::FORBIDDEN);

    let ok = server
        .post("/send_message/")
        .add_header(csrf_header(), HeaderValue::from_static("s3cr3t"))
        .json(&json!({"message": "hello"}))
        .await;
    ok.assert_status_ok();
    assert_eq!(ok.text(), GREETING);
}

#[tokio::test]
async fn test_backend_start_failure_is_503() {
    let server = test_server(Arc::new(UnreachableModel), None);

    let response = server
        .post("/send_message/")
        .json(&json!({"message": "hello"}))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(
        body["response"],
        "Server stream failed. Check if LLM service is running. Error details: connection refused"
    );
}

#[tokio::test]
async fn test_mid_stream_failure_becomes_final_chunk() {
    let server = test_server(Arc::new(FlakyModel), None);

    let response = server
        .post("/send_message/")
        .json(&json!({"message": "hello"}))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.text(),
        "Drink water. An unexpected error occurred: Stream interrupted: model crashed"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Client against a live socket
// ─────────────────────────────────────────────────────────────────────────────

/// Serve `app` on an ephemeral port and return the chat endpoint URL.
async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("Server failed");
    });
    format!("http://{addr}/send_message/")
}

fn http_client(
    endpoint: &str,
    mode: ReplyMode,
    token: StaticToken,
) -> (StreamingChatClient, Arc<MemoryView>) {
    let view = Arc::new(MemoryView::new());
    let transport = HttpTransport::new(endpoint, mode).expect("valid endpoint");
    let client = StreamingChatClient::new(
        Arc::new(transport),
        Arc::clone(&view) as Arc<dyn ChatView>,
        Arc::new(token),
    );
    (client, view)
}

#[tokio::test]
async fn test_client_streams_from_live_server() {
    let endpoint = spawn_app(app(Arc::new(CannedBackend::new()), None)).await;
    let (client, view) = http_client(&endpoint, ReplyMode::Stream, StaticToken::none());

    let outcome = client.submit("hello").await;

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            reply: GREETING.to_string()
        }
    );
    assert_eq!(view.last_text().as_deref(), Some(GREETING));
}

#[tokio::test]
async fn test_client_json_mode_from_live_server() {
    let endpoint = spawn_app(app(Arc::new(CannedBackend::new()), None)).await;
    let (client, view) = http_client(&endpoint, ReplyMode::Json, StaticToken::none());

    let outcome = client.submit("hello").await;

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            reply: GREETING.to_string()
        }
    );
    assert_eq!(view.typing_hidden_count(), 1);
}

#[tokio::test]
async fn test_client_csrf_round_trip() {
    let endpoint = spawn_app(app(Arc::new(CannedBackend::new()), Some("s3cr3t"))).await;

    let (client, view) = http_client(&endpoint, ReplyMode::Stream, StaticToken::none());
    client.submit("hello").await;
    assert_eq!(
        view.last_text().unwrap(),
        format!("{ERROR_ANNOTATION_PREFIX}CSRF verification failed.")
    );

    let (client, _view) = http_client(&endpoint, ReplyMode::Stream, StaticToken::new("s3cr3t"));
    assert!(matches!(
        client.submit("hello").await,
        TurnOutcome::Completed { .. }
    ));
}

#[tokio::test]
async fn test_client_reports_server_error_body() {
    let busy = Router::new().route(
        "/send_message/",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "response": "Server busy"})),
            )
        }),
    );
    let endpoint = spawn_app(busy).await;
    let (client, view) = http_client(&endpoint, ReplyMode::Stream, StaticToken::none());

    let outcome = client.submit("hello").await;

    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            partial: String::new(),
            error: "Server busy".into()
        }
    );
    assert!(view.last_text().unwrap().ends_with("Server busy"));
}

#[tokio::test]
async fn test_client_generic_message_for_opaque_error() {
    let gateway = Router::new().route(
        "/send_message/",
        post(|| async { (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>") }),
    );
    let endpoint = spawn_app(gateway).await;
    let (client, _view) = http_client(&endpoint, ReplyMode::Json, StaticToken::none());

    let outcome = client.submit("hello").await;

    assert!(matches!(
        outcome,
        TurnOutcome::Failed { ref error, .. } if error == "HTTP Error 502: Failed to start stream."
    ));
}

#[tokio::test]
async fn test_json_reply_over_cap_fails_turn() {
    let chatty = Router::new().route(
        "/send_message/",
        post(|| async { Json(json!({"response": "x".repeat(4096)})) }),
    );
    let endpoint = spawn_app(chatty).await;
    let transport = HttpTransport::new(&endpoint, ReplyMode::Json)
        .expect("valid endpoint")
        .with_max_body_bytes(1024);
    let view = Arc::new(MemoryView::new());
    let client = StreamingChatClient::new(
        Arc::new(transport),
        Arc::clone(&view) as Arc<dyn ChatView>,
        Arc::new(StaticToken::none()),
    );

    let outcome = client.submit("hello").await;

    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            partial: String::new(),
            error: "Response exceeded 1024 bytes".into()
        }
    );
    assert!(!view.typing_visible());
}

#[tokio::test]
async fn test_oversized_error_body_uses_generic_message() {
    let noisy = Router::new().route(
        "/send_message/",
        post(|| async {
            let detail = "y".repeat(4096);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"response": detail})),
            )
        }),
    );
    let endpoint = spawn_app(noisy).await;
    let transport = HttpTransport::new(&endpoint, ReplyMode::Stream)
        .expect("valid endpoint")
        .with_max_body_bytes(1024);
    let client = StreamingChatClient::new(
        Arc::new(transport),
        Arc::new(MemoryView::new()),
        Arc::new(StaticToken::none()),
    );

    let outcome = client.submit("hello").await;

    assert!(matches!(
        outcome,
        TurnOutcome::Failed { ref error, .. } if error == "HTTP Error 500: Failed to start stream."
    ));
}
