#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use tower::ServiceExt;

use chronicle::auth::AuthManager;
use chronicle::config::{RateLimitConfig, ValidatorConfig};
use chronicle::db;
use chronicle::history::types::{CaptureKind, NewCapture};
use chronicle::rate_limit::RateLimiter;
use chronicle::server::{self, AppState, ServerSettings};
use chronicle::tools::{LocalToolServer, ToolSource};
use chronicle::validator::PolicyGate;

pub const INSTANCE: &str = "alice";
pub const INSTANCE_KEY: &str = "alice-secret";
pub const MASTER_KEY: &str = "master-secret";

/// Open a fresh in-memory capture index with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Insert a capture `minutes_ago` minutes in the past. Returns its id.
pub fn insert_capture(
    conn: &Connection,
    kind: CaptureKind,
    app: &str,
    content: &str,
    minutes_ago: i64,
) -> i64 {
    chronicle::history::insert_capture(
        conn,
        &NewCapture {
            kind,
            captured_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            app: Some(app.to_string()),
            window_title: Some(format!("{app} window")),
            content: content.to_string(),
        },
    )
    .unwrap()
}

/// A small fixture index: two screens and one audio chunk.
pub fn seeded_db() -> Connection {
    let conn = test_db();
    insert_capture(&conn, CaptureKind::Screen, "Editor", "budget review for q3 planning", 5);
    insert_capture(&conn, CaptureKind::Screen, "Browser", "rust async book chapter four", 30);
    insert_capture(&conn, CaptureKind::Audio, "Zoom", "standup notes about the budget", 10);
    conn
}

pub fn local_server(conn: Connection) -> Arc<LocalToolServer> {
    Arc::new(LocalToolServer::new(INSTANCE, Arc::new(Mutex::new(conn)), None))
}

pub fn test_auth() -> AuthManager {
    AuthManager::from_pairs([
        ("MASTER_API_KEY", MASTER_KEY),
        ("ALICE_API_KEY", INSTANCE_KEY),
        ("BOB_API_KEY", "bob-secret"),
    ])
}

pub fn disabled_validator() -> ValidatorConfig {
    ValidatorConfig {
        enabled: false,
        ..ValidatorConfig::default()
    }
}

/// Validator pointed at `ollama_host` with a one-second timeout.
pub fn validator_at(ollama_host: &str) -> ValidatorConfig {
    ValidatorConfig {
        enabled: true,
        ollama_host: ollama_host.to_string(),
        timeout_secs: 1,
        ..ValidatorConfig::default()
    }
}

pub struct GatewayBuilder {
    source: Arc<dyn ToolSource>,
    validator: ValidatorConfig,
    rate_limit: RateLimitConfig,
}

impl GatewayBuilder {
    pub fn new(source: Arc<dyn ToolSource>) -> Self {
        Self {
            source,
            validator: disabled_validator(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn local() -> Self {
        Self::new(local_server(seeded_db()))
    }

    pub fn validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn build(self) -> Arc<AppState> {
        let gate = PolicyGate::new(&self.validator, "Allow lookups of the user's own history.".into())
            .unwrap();
        Arc::new(AppState::new(
            self.source,
            Arc::new(test_auth()),
            Arc::new(RateLimiter::new(&self.rate_limit)),
            Arc::new(gate),
            ServerSettings {
                tool_timeout: Duration::from_secs(5),
                trust_forwarded_for: false,
                sse_keepalive: Duration::from_secs(15),
                mode: "single",
            },
        ))
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

/// Send one request through the router without binding a socket.
pub async fn send(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<String>,
) -> TestResponse {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let request = request
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();

    let response = server::app(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

/// `POST /mcp` with a JSON body.
pub async fn rpc(state: &Arc<AppState>, token: Option<&str>, message: Value) -> TestResponse {
    send(state, "POST", "/mcp", token, Some(message.to_string())).await
}

/// `tools/call` over `/mcp`; returns the JSON-RPC `result`.
pub async fn call_tool(state: &Arc<AppState>, token: &str, name: &str, arguments: Value) -> Value {
    let response = rpc(
        state,
        Some(token),
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    response.body.unwrap()["result"].clone()
}

/// Text of the first content block of a tool result.
pub fn result_text(result: &Value) -> String {
    result["content"][0]["text"].as_str().unwrap().to_string()
}

/// Parse the first content block of a tool result as JSON.
pub fn result_json(result: &Value) -> Value {
    serde_json::from_str(&result_text(result)).unwrap()
}

/// Serve `router` on an ephemeral localhost port; returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A local URL nothing listens on: bind, read the port, release it.
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Fake Ollama answering every `/api/generate` with `reply` after `delay`.
pub async fn mock_ollama(reply: &'static str, delay: Duration) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new().route(
        "/api/generate",
        post(move |Json(_body): Json<Value>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Json(json!({ "model": "test", "response": reply, "done": true }))
            }
        }),
    );
    (spawn_server(router).await, hits)
}

/// Fake Ollama answering every `/api/generate` with `status` and a plain-text body.
pub async fn mock_ollama_status(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new().route(
        "/api/generate",
        post(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (status, "model runner crashed")
            }
        }),
    );
    (spawn_server(router).await, hits)
}
