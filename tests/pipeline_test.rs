mod helpers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use chronicle::config::RateLimitConfig;
use chronicle::validator::{GateMode, Reason};
use helpers::{
    call_tool, mock_ollama, mock_ollama_status, refused_url, result_json, result_text, rpc, send, validator_at,
    GatewayBuilder, INSTANCE_KEY, MASTER_KEY,
};

fn tight_instance_limit() -> RateLimitConfig {
    RateLimitConfig {
        ip_per_minute: 100,
        ip_per_hour: 1000,
        instance_per_minute: 2,
    }
}

#[tokio::test]
async fn missing_or_wrong_token_is_rejected_generically() {
    let state = GatewayBuilder::local().build();

    let response = rpc(
        &state,
        None,
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": { "name": "get-stats", "arguments": {} }
        }),
    )
    .await;
    let result = &response.body.unwrap()["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result_text(result), "Unauthorized");

    let result = call_tool(&state, "not-a-key", "get-stats", json!({})).await;
    assert_eq!(result_text(&result), "Unauthorized");

    // another instance's key does not open this one
    let result = call_tool(&state, "bob-secret", "get-stats", json!({})).await;
    assert_eq!(result_text(&result), "Unauthorized");
}

#[tokio::test]
async fn master_key_opens_any_instance() {
    let state = GatewayBuilder::local().build();
    let result = call_tool(&state, MASTER_KEY, "ping", json!({})).await;
    assert_eq!(result["isError"], false);
    assert_eq!(result_json(&result)["status"], "ok");
}

#[tokio::test]
async fn safe_tools_skip_rate_limits() {
    let state = GatewayBuilder::local()
        .rate_limit(tight_instance_limit())
        .build();
    for _ in 0..5 {
        let result = call_tool(&state, INSTANCE_KEY, "get-stats", json!({})).await;
        assert_eq!(result["isError"], false);
    }
}

#[tokio::test]
async fn instance_limit_rejects_third_search() {
    let state = GatewayBuilder::local()
        .rate_limit(tight_instance_limit())
        .build();
    let args = json!({ "query": "budget" });

    for _ in 0..2 {
        let result = call_tool(&state, INSTANCE_KEY, "search-audio", args.clone()).await;
        assert_eq!(result["isError"], false);
    }
    let result = call_tool(&state, INSTANCE_KEY, "search-audio", args).await;
    assert_eq!(result["isError"], true);
    assert!(result_text(&result).starts_with("Rate limit exceeded"));
}

#[tokio::test]
async fn wildcard_query_is_denied_without_consulting_llm() {
    let (ollama, hits) = mock_ollama("ALLOW", Duration::ZERO).await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let result = call_tool(&state, INSTANCE_KEY, "search-screenshots", json!({ "query": "*" })).await;
    assert_eq!(result["isError"], true);
    assert!(result_text(&result).contains("wildcard_or_empty_query"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(state.gate.llm_calls(), 0);
}

#[tokio::test]
async fn adjudicated_tool_allowed_by_model() {
    let (ollama, hits) = mock_ollama("ALLOW", Duration::ZERO).await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let result = call_tool(&state, INSTANCE_KEY, "get-recent-activity", json!({ "minutes": 60 })).await;
    assert_eq!(result["isError"], false);
    assert_eq!(result_json(&result)["total"], 3);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn model_denial_reports_code_not_model_text() {
    let (ollama, _hits) = mock_ollama("DENY: looks like exfiltration", Duration::ZERO).await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let result = call_tool(&state, INSTANCE_KEY, "sample-captures", json!({ "max_samples": 5 })).await;
    assert_eq!(result["isError"], true);
    let text = result_text(&result);
    assert!(text.contains("ai_denied"));
    assert!(!text.contains("exfiltration"));
}

#[tokio::test]
async fn llm_timeout_denies() {
    let (ollama, hits) = mock_ollama("ALLOW", Duration::from_secs(3)).await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let result = call_tool(&state, INSTANCE_KEY, "get-capture", json!({ "id": 1 })).await;
    assert_eq!(result["isError"], true);
    assert!(result_text(&result).contains("timeout_default_deny"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.gate.mode(), GateMode::Enforcing);
}

#[tokio::test]
async fn unreachable_llm_passes_through_and_degrades_gate() {
    let ollama = refused_url().await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();
    assert_eq!(state.gate.mode(), GateMode::Enforcing);

    let result = call_tool(&state, INSTANCE_KEY, "get-capture", json!({ "id": 1 })).await;
    assert_eq!(result["isError"], false);
    assert_eq!(result_json(&result)["id"], 1);
    assert_eq!(state.gate.mode(), GateMode::Degraded);
    assert_eq!(state.gate.llm_calls(), 1);

    // degraded: later calls skip validation entirely, even ones heuristics would deny
    let result = call_tool(&state, INSTANCE_KEY, "search-screenshots", json!({ "query": "ab" })).await;
    assert_eq!(result["isError"], false);
    assert_eq!(state.gate.llm_calls(), 1);

    let health = send(&state, "GET", "/health", None, None).await.body.unwrap();
    assert_eq!(health["validator"], "degraded");
}

#[tokio::test]
async fn unreachable_llm_reason_codes() {
    let ollama = refused_url().await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let first = state.gate.validate("get-capture", &json!({ "id": 1 }), "alice").await;
    assert!(first.allowed);
    assert_eq!(first.reason, Reason::OllamaUnavailablePassthrough);
    assert_eq!(first.reason.code(), "ollama_unavailable_passthrough");

    let second = state.gate.validate("get-capture", &json!({ "id": 2 }), "alice").await;
    assert!(second.allowed);
    assert_eq!(second.reason.code(), "validation_disabled");
    assert_eq!(state.gate.llm_calls(), 1);
}

#[tokio::test]
async fn llm_error_status_denies_and_keeps_enforcing() {
    let (ollama, hits) = mock_ollama_status(StatusCode::INTERNAL_SERVER_ERROR).await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let verdict = state.gate.validate("get-capture", &json!({ "id": 1 }), "alice").await;
    assert!(!verdict.allowed);
    assert_eq!(verdict.reason, Reason::OllamaError);
    assert_eq!(verdict.reason.code(), "ollama_error");
    assert_eq!(state.gate.mode(), GateMode::Enforcing);

    // the denial is cached: no second round trip to the model
    let again = state.gate.validate("get-capture", &json!({ "id": 1 }), "alice").await;
    assert!(!again.allowed);
    assert_eq!(again.reason, Reason::Cached);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.gate.cached_verdicts(), 1);

    let result = call_tool(&state, INSTANCE_KEY, "get-capture", json!({ "id": 2 })).await;
    assert_eq!(result["isError"], true);
    assert!(result_text(&result).contains("ollama_error"));
    assert_eq!(state.gate.mode(), GateMode::Enforcing);
}

#[tokio::test]
async fn cached_verdict_ignores_argument_order() {
    let (ollama, hits) = mock_ollama("ALLOW", Duration::ZERO).await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let first = call_tool(
        &state,
        INSTANCE_KEY,
        "get-recent-activity",
        serde_json::from_str(r#"{"minutes": 30, "limit": 5}"#).unwrap(),
    )
    .await;
    let second = call_tool(
        &state,
        INSTANCE_KEY,
        "get-recent-activity",
        serde_json::from_str(r#"{"limit": 5, "minutes": 30}"#).unwrap(),
    )
    .await;
    assert_eq!(first["isError"], false);
    assert_eq!(second["isError"], false);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rest_shim_maps_rejections_to_status_codes() {
    let state = GatewayBuilder::local()
        .rate_limit(tight_instance_limit())
        .validator(validator_at(&refused_url().await))
        .build();
    let body = |tool: &str, args: serde_json::Value| {
        Some(json!({ "tool": tool, "arguments": args }).to_string())
    };

    let response = send(&state, "POST", "/tools/call", None, body("get-stats", json!({}))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body.unwrap()["error"], "Unauthorized");

    let response = send(
        &state,
        "POST",
        "/tools/call",
        Some(INSTANCE_KEY),
        body("search-screenshots", json!({ "query": "*" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = send(
        &state,
        "POST",
        "/tools/call",
        Some(INSTANCE_KEY),
        body("search-screenshots", json!({ "query": "budget" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.unwrap()["total"], 1);

    let response = send(
        &state,
        "POST",
        "/tools/call",
        Some(INSTANCE_KEY),
        body("search-screenshots", json!({ "query": "rust" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);
}

#[tokio::test]
async fn rest_tool_list_matches_catalog() {
    let state = GatewayBuilder::local().build();
    let response = send(&state, "GET", "/tools/list", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.unwrap()["tools"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn cached_verdict_is_shared_across_instances() {
    let (ollama, hits) = mock_ollama("ALLOW", Duration::ZERO).await;
    let state = GatewayBuilder::local().validator(validator_at(&ollama)).build();

    let alice = state.gate.validate("get-capture", &json!({ "id": 1 }), "alice").await;
    assert_eq!(alice.reason.code(), "ai_approved");

    let bob = state.gate.validate("get-capture", &json!({ "id": 1 }), "bob").await;
    assert!(bob.allowed);
    assert_eq!(bob.reason, Reason::Cached);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
