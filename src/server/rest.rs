//! Plain REST shims. Peer gateways talk to each other through these.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::pipeline::{run_tool_call, CallOutcome};
use super::{client_ip, AppState, PeerAddr};

#[derive(Debug, Deserialize)]
pub struct RestToolCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

pub async fn list_tools_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tools = state.source.list_tools().await;
    Json(json!({ "tools": tools }))
}

pub async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    peer: PeerAddr,
    headers: HeaderMap,
    Json(body): Json<RestToolCall>,
) -> Response {
    let ip = client_ip(&headers, peer, state.settings.trust_forwarded_for);
    let arguments = body.arguments.unwrap_or_else(|| json!({}));
    let outcome = run_tool_call(&state, &headers, &ip, &body.tool, arguments).await;

    let message = outcome.rejection_message();
    match outcome {
        CallOutcome::Completed { payload, .. } => Json(payload).into_response(),
        CallOutcome::Unauthorized => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
        }
        CallOutcome::RateLimited { retry_after, .. } => {
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": message }))).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
        CallOutcome::Denied { .. } => {
            (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
        }
    }
}
