//! `POST /mcp`: JSON-RPC 2.0 over Streamable HTTP.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use super::pipeline::{run_tool_call, CallOutcome};
use super::{client_ip, AppState, PeerAddr};
use crate::protocol::{
    initialize_result, tool_result, tools_list_result, JsonRpcRequest, JsonRpcResponse,
    ToolCallParams, DEFAULT_PROTOCOL_VERSION, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR, SESSION_HEADER,
};

/// Per-message result: an optional reply plus a session minted by `initialize`.
#[derive(Default)]
struct Dispatched {
    response: Option<JsonRpcResponse>,
    session_id: Option<String>,
}

pub async fn handle_mcp(
    State(state): State<Arc<AppState>>,
    peer: PeerAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ip = client_ip(&headers, peer, state.settings.trust_forwarded_for);

    if let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        if state.sessions.get(id).is_none() {
            tracing::debug!(session = id, "request carries an unknown session id");
        }
    }

    let message: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(client_ip = %ip, error = %e, "unparseable JSON-RPC body");
            let reply = JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {e}"));
            return Json(reply).into_response();
        }
    };

    match message {
        Value::Array(batch) => {
            if batch.is_empty() {
                let reply = JsonRpcResponse::error(Value::Null, INVALID_REQUEST, "Empty batch");
                return Json(reply).into_response();
            }
            let mut replies = Vec::new();
            let mut session_id = None;
            for item in batch {
                let out = dispatch(&state, &headers, &ip, item).await;
                session_id = session_id.or(out.session_id);
                replies.extend(out.response);
            }
            if replies.is_empty() {
                return StatusCode::ACCEPTED.into_response();
            }
            with_session(Json(replies).into_response(), session_id)
        }
        single => {
            let out = dispatch(&state, &headers, &ip, single).await;
            match out.response {
                Some(reply) => with_session(Json(reply).into_response(), out.session_id),
                None => StatusCode::ACCEPTED.into_response(),
            }
        }
    }
}

fn with_session(mut response: Response, session_id: Option<String>) -> Response {
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn dispatch(state: &AppState, headers: &HeaderMap, ip: &str, message: Value) -> Dispatched {
    // Only an object can be a request or a notification.
    if !message.is_object() {
        tracing::debug!(client_ip = ip, "non-object JSON-RPC message");
        return reply(JsonRpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            "Invalid request: expected a JSON object",
        ));
    }

    let request: JsonRpcRequest = match serde_json::from_value(message.clone()) {
        Ok(request) => request,
        Err(e) => {
            let id = message.get("id").cloned().unwrap_or(Value::Null);
            return reply(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {e}"),
            ));
        }
    };

    if request.is_notification() {
        tracing::debug!(method = %request.method, "notification received");
        return Dispatched::default();
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    tracing::debug!(method = %request.method, client_ip = ip, "JSON-RPC request");

    match request.method.as_str() {
        "initialize" => {
            let version = request
                .params
                .as_ref()
                .and_then(|p| p.get("protocolVersion"))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PROTOCOL_VERSION);
            let session = state.sessions.create(version);
            tracing::info!(session = %session.id, protocol_version = version, "session initialized");
            Dispatched {
                response: Some(JsonRpcResponse::result(id, initialize_result(version))),
                session_id: Some(session.id),
            }
        }
        "tools/list" => {
            let tools = state.source.list_tools().await;
            reply(JsonRpcResponse::result(id, tools_list_result(&tools)))
        }
        "tools/call" => reply(handle_tool_call(state, headers, ip, id, request.params).await),
        "ping" => reply(JsonRpcResponse::result(id, json!({}))),
        other => reply(JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

fn reply(response: JsonRpcResponse) -> Dispatched {
    Dispatched {
        response: Some(response),
        session_id: None,
    }
}

async fn handle_tool_call(
    state: &AppState,
    headers: &HeaderMap,
    ip: &str,
    id: Value,
    params: Option<Value>,
) -> JsonRpcResponse {
    let params = params
        .and_then(|p| serde_json::from_value::<ToolCallParams>(p).ok())
        .and_then(|p| p.name.filter(|n| !n.is_empty()).map(|name| (name, p.arguments)));
    let Some((name, arguments)) = params else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
    };
    let arguments = arguments.unwrap_or_else(|| json!({}));

    let outcome = run_tool_call(state, headers, ip, &name, arguments).await;
    let result = match &outcome {
        CallOutcome::Completed { payload, is_error } => tool_result(payload, *is_error),
        rejected => {
            let message = rejected.rejection_message().unwrap_or_default();
            tool_result(&Value::String(message), true)
        }
    };
    JsonRpcResponse::result(id, result)
}
