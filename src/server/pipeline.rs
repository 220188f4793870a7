//! The `tools/call` pipeline: authenticate, rate limit, validate, dispatch.
//!
//! Each stage returns a typed outcome; nothing here propagates an error to the
//! transport.

use std::time::Instant;

use axum::http::HeaderMap;
use serde_json::{json, Value};

use super::AppState;
use crate::protocol::is_error_payload;
use crate::rate_limit::RateTier;
use crate::tools::{ToolName, ToolRisk};
use crate::validator::Reason;

#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The tool ran; `is_error` is set when its payload carries an `error` field.
    Completed { payload: Value, is_error: bool },
    Unauthorized,
    RateLimited { retry_after: u64, tier: RateTier },
    Denied { reason: Reason },
}

impl CallOutcome {
    /// Client-facing text for a rejection. Deliberately generic for auth failures.
    pub fn rejection_message(&self) -> Option<String> {
        match self {
            Self::Completed { .. } => None,
            Self::Unauthorized => Some("Unauthorized".to_string()),
            Self::RateLimited { retry_after, tier } => Some(format!(
                "Rate limit exceeded ({tier}); retry after {retry_after}s"
            )),
            Self::Denied { reason } => Some(format!(
                "Request denied by security policy ({})",
                reason.code()
            )),
        }
    }
}

pub async fn run_tool_call(
    state: &AppState,
    headers: &HeaderMap,
    client_ip: &str,
    name: &str,
    arguments: Value,
) -> CallOutcome {
    let target = state.source.resolve(name);

    let auth = state.auth.authenticate(headers, &target.instance);
    if !auth.is_authorized() {
        tracing::warn!(
            client_ip,
            instance = %target.instance,
            tool = name,
            reason = auth.reason(),
            "authentication rejected"
        );
        return CallOutcome::Unauthorized;
    }

    let risk = target
        .tool
        .parse::<ToolName>()
        .map(|tool| tool.risk())
        .unwrap_or(ToolRisk::Adjudicated);

    if risk != ToolRisk::Safe {
        let decision = state.rate_limiter.check(client_ip, &target.instance);
        if let (false, Some(retry_after), Some(tier)) =
            (decision.allowed, decision.retry_after, decision.violated_tier)
        {
            return CallOutcome::RateLimited { retry_after, tier };
        }
    }

    let verdict = state
        .gate
        .validate(&target.tool, &arguments, &target.instance)
        .await;
    if !verdict.allowed {
        return CallOutcome::Denied {
            reason: verdict.reason,
        };
    }

    let started = Instant::now();
    let payload = match tokio::time::timeout(
        state.settings.tool_timeout,
        state.source.call_tool(name, arguments),
    )
    .await
    {
        Ok(payload) => payload,
        Err(_) => {
            tracing::error!(
                tool = name,
                timeout_secs = state.settings.tool_timeout.as_secs(),
                "tool execution timed out"
            );
            json!({ "error": "tool execution timed out", "tool": name })
        }
    };

    let is_error = is_error_payload(&payload);
    tracing::info!(
        tool = name,
        instance = %target.instance,
        is_error,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool call dispatched"
    );
    CallOutcome::Completed { payload, is_error }
}
