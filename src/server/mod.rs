//! HTTP gateway: state wiring, routes, and the serve loop.
//!
//! Routes:
//! - `GET /` service info, `GET /health` liveness
//! - `POST /mcp` JSON-RPC 2.0 (Streamable HTTP transport)
//! - `GET|POST /sse` legacy SSE transport
//! - `GET /tools/list`, `POST /tools/call` REST shims, also spoken by peer gateways

pub mod mcp;
pub mod pipeline;
pub mod rest;
pub mod session;
pub mod sse;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::auth::AuthManager;
use crate::config::GatewayConfig;
use crate::db;
use crate::rate_limit::RateLimiter;
use crate::router::{Instance, MultiInstanceRouter};
use crate::tools::{LocalToolServer, ToolSource};
use crate::validator::PolicyGate;
use session::SessionStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub tool_timeout: Duration,
    pub trust_forwarded_for: bool,
    pub sse_keepalive: Duration,
    /// `single` or `multi`, reported by `GET /`.
    pub mode: &'static str,
}

impl ServerSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            tool_timeout: config.tool_timeout(),
            trust_forwarded_for: config.server.trust_forwarded_for,
            sse_keepalive: Duration::from_secs(config.server.sse_keepalive_secs.max(1)),
            mode: if config.is_multi_instance() {
                "multi"
            } else {
                "single"
            },
        }
    }
}

pub struct AppState {
    pub source: Arc<dyn ToolSource>,
    pub auth: Arc<AuthManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub gate: Arc<PolicyGate>,
    pub sessions: SessionStore,
    pub settings: ServerSettings,
}

impl AppState {
    pub fn new(
        source: Arc<dyn ToolSource>,
        auth: Arc<AuthManager>,
        rate_limiter: Arc<RateLimiter>,
        gate: Arc<PolicyGate>,
        settings: ServerSettings,
    ) -> Self {
        Self {
            source,
            auth,
            rate_limiter,
            gate,
            sessions: SessionStore::new(),
            settings,
        }
    }
}

/// Open the capture index, load keys and policy, and pick single- or multi-instance mode.
pub fn build_state(config: &GatewayConfig) -> Result<Arc<AppState>> {
    let auth = Arc::new(AuthManager::load(&config.resolved_keys_file())?);
    if !auth.has_master_key() && auth.instance_key_count() == 0 {
        tracing::warn!("no API keys configured; every tools/call will be rejected");
    }

    let gate = Arc::new(PolicyGate::from_config(
        &config.validator,
        &config.resolved_policy_file(),
    )?);
    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

    let needs_local = !config.is_multi_instance() || config.instances.iter().any(|i| i.is_local());
    let local = if needs_local {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "capture index ready");
        Some(Arc::new(LocalToolServer::new(
            config.server.instance_name.clone(),
            Arc::new(Mutex::new(conn)),
            Some(db_path),
        )))
    } else {
        None
    };

    let source: Arc<dyn ToolSource> = if config.is_multi_instance() {
        let instances = config
            .instances
            .iter()
            .map(|i| Instance::from_config(i, &auth))
            .collect::<Vec<_>>();
        tracing::info!(instances = ?instances.iter().map(|i| &i.name).collect::<Vec<_>>(), "multi-instance mode");
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Arc::new(MultiInstanceRouter::new(instances, local, http))
    } else {
        tracing::info!(instance = %config.server.instance_name, "single-instance mode");
        local.context("single-instance mode requires the local tool server")?
    };

    Ok(Arc::new(AppState::new(
        source,
        auth,
        rate_limiter,
        gate,
        ServerSettings::from_config(config),
    )))
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(info_handler))
        .route("/health", get(health_handler))
        .route("/mcp", post(mcp::handle_mcp))
        .route("/sse", get(sse::handle_sse).post(sse::handle_sse))
        .route("/tools/list", get(rest::list_tools_handler))
        .route("/tools/call", post(rest::call_tool_handler))
        .with_state(state)
}

/// Start the HTTP gateway and block until Ctrl-C.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting chronicle gateway");

    let state = build_state(&config)?;

    let limiter = Arc::clone(&state.rate_limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                tracing::debug!(
                    removed,
                    remaining = limiter.tracked_keys(),
                    "swept idle rate-limit keys"
                );
            }
        }
    });

    let router = app(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "gateway listening at http://{bind_addr}/mcp");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down gateway");
    })
    .await?;

    Ok(())
}

/// Socket peer address, when the server was started with connect info.
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PeerAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

/// Rate-limit identity of the caller.
pub fn client_ip(headers: &HeaderMap, peer: PeerAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.0
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn info_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "mode": state.settings.mode,
        "endpoints": {
            "mcp": "/mcp",
            "sse": "/sse",
            "health": "/health",
            "tools_list": "/tools/list",
            "tools_call": "/tools/call",
        }
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "validator": state.gate.mode().as_str(),
        "sessions": state.sessions.len(),
    }))
}
