mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use chronicle::router::{Instance, MultiInstanceRouter};
use chronicle::server;
use chronicle::tools::ToolSource;
use helpers::{
    call_tool, local_server, refused_url, result_json, result_text, seeded_db, spawn_server,
    GatewayBuilder, MASTER_KEY,
};

/// Peer exposing one `echo` tool; records the bearer token of the last call.
async fn mock_peer() -> (String, Arc<AtomicUsize>, Arc<Mutex<Option<String>>>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let last_token = Arc::new(Mutex::new(None));
    let (calls_in, token_in) = (Arc::clone(&calls), Arc::clone(&last_token));

    let router = Router::new()
        .route(
            "/tools/list",
            get(|| async {
                Json(json!({
                    "tools": [{
                        "name": "echo",
                        "description": "Echo the arguments back",
                        "inputSchema": { "type": "object" }
                    }]
                }))
            }),
        )
        .route(
            "/tools/call",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let calls = Arc::clone(&calls_in);
                let token = Arc::clone(&token_in);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    *token.lock().unwrap() = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    Json(json!({ "echo": body["arguments"], "tool": body["tool"] }))
                }
            }),
        );
    (spawn_server(router).await, calls, last_token)
}

fn instance(name: &str, base_url: &str, api_key: Option<&str>) -> Instance {
    Instance {
        name: name.into(),
        base_url: base_url.into(),
        api_key: api_key.map(str::to_string),
    }
}

async fn three_instance_router() -> (MultiInstanceRouter, Arc<AtomicUsize>, Arc<Mutex<Option<String>>>) {
    let (peer, calls, token) = mock_peer().await;
    let router = MultiInstanceRouter::new(
        vec![
            instance("alice", "local", None),
            instance("bob", &peer, Some("bob-secret")),
            instance("carol", &refused_url().await, None),
        ],
        Some(local_server(seeded_db())),
        reqwest::Client::new(),
    );
    (router, calls, token)
}

#[tokio::test]
async fn catalog_is_prefixed_and_skips_dead_instances() {
    let (router, _, _) = three_instance_router().await;
    let tools = router.list_tools().await;
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();

    assert!(names.contains(&"alice-get-stats"));
    assert!(names.contains(&"alice-search-screenshots"));
    assert!(names.contains(&"bob-echo"));
    assert!(names.iter().all(|n| !n.starts_with("carol-")));

    let echo = tools.iter().find(|t| t.name == "bob-echo").unwrap();
    assert_eq!(echo.description, "[BOB] Echo the arguments back");
}

#[tokio::test]
async fn remote_call_is_annotated_and_authenticated() {
    let (router, calls, token) = three_instance_router().await;
    let result = router.call_tool("bob-echo", json!({ "text": "hi" })).await;

    assert_eq!(result["echo"]["text"], "hi");
    assert_eq!(result["tool"], "echo");
    assert_eq!(result["_source_user"], "bob");
    assert!(result["_source_url"].as_str().unwrap().starts_with("http://127.0.0.1:"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(token.lock().unwrap().as_deref(), Some("Bearer bob-secret"));
}

#[tokio::test]
async fn local_instance_runs_in_process() {
    let (router, calls, _) = three_instance_router().await;
    let result = router.call_tool("alice-get-stats", json!({})).await;
    assert_eq!(result["total_captures"], 3);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn network_failure_becomes_structured_error() {
    let (router, _, _) = three_instance_router().await;
    let result = router.call_tool("carol-get-stats", json!({})).await;
    assert!(result["error"].is_string());
    assert_eq!(result["user"], "carol");
    assert_eq!(result["tool"], "get-stats");
}

#[tokio::test]
async fn unknown_instance_names_valid_ones() {
    let (router, _, _) = three_instance_router().await;
    let result = router.call_tool("dave-get-stats", json!({})).await;
    assert_eq!(result["valid_instances"], json!(["alice", "bob", "carol"]));
}

#[tokio::test]
async fn gateway_authenticates_against_the_target_instance() {
    let (router, _, _) = three_instance_router().await;
    let state = GatewayBuilder::new(Arc::new(router)).build();

    let result = call_tool(&state, "bob-secret", "bob-echo", json!({ "n": 1 })).await;
    assert_eq!(result["isError"], false);
    assert_eq!(result_json(&result)["_source_user"], "bob");

    let result = call_tool(&state, helpers::INSTANCE_KEY, "bob-echo", json!({ "n": 1 })).await;
    assert_eq!(result_text(&result), "Unauthorized");

    let result = call_tool(&state, MASTER_KEY, "carol-get-stats", json!({})).await;
    assert_eq!(result["isError"], true);
}

#[tokio::test]
async fn peers_speak_the_same_rest_protocol() {
    let peer_state = GatewayBuilder::local().build();
    let peer_url = spawn_server(server::app(peer_state)).await;

    let router = MultiInstanceRouter::new(
        vec![instance("remote", &peer_url, Some(MASTER_KEY))],
        None,
        reqwest::Client::new(),
    );

    let tools = router.list_tools().await;
    assert!(tools.iter().any(|t| t.name == "remote-search-audio"));

    let result = router
        .call_tool("remote-search-audio", json!({ "query": "standup" }))
        .await;
    assert_eq!(result["total"], 1);
    assert_eq!(result["_source_user"], "remote");
}
