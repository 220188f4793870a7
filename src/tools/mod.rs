pub mod get_activity_graph;
pub mod get_capture;
pub mod get_recent_activity;
pub mod sample_captures;
pub mod search_audio;
pub mod search_screenshots;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use get_activity_graph::ActivityGraphParams;
use get_capture::GetCaptureParams;
use get_recent_activity::RecentActivityParams;
use sample_captures::SampleCapturesParams;
use search_audio::SearchAudioParams;
use search_screenshots::SearchScreenshotsParams;

use crate::history;
use crate::history::types::CaptureKind;
use crate::protocol::ToolDescriptor;

/// Hard cap on any result count, independent of the policy gate.
pub const MAX_RESULTS: usize = 200;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },
    #[error("capture {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Backend(String),
}

/// How much scrutiny the policy gate applies to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRisk {
    /// Read-only and informational; bypasses rate limiting and validation.
    Safe,
    /// Search tools guarded by heuristics only, to keep latency bounded.
    HeuristicOnly,
    /// Everything else is adjudicated by the LLM after heuristics.
    Adjudicated,
}

/// Every tool the local tool server implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Ping,
    GetStats,
    GetActivityGraph,
    SearchScreenshots,
    SearchAudio,
    GetRecentActivity,
    GetCapture,
    SampleCaptures,
}

impl ToolName {
    pub const ALL: [ToolName; 8] = [
        Self::Ping,
        Self::GetStats,
        Self::GetActivityGraph,
        Self::SearchScreenshots,
        Self::SearchAudio,
        Self::GetRecentActivity,
        Self::GetCapture,
        Self::SampleCaptures,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetStats => "get-stats",
            Self::GetActivityGraph => "get-activity-graph",
            Self::SearchScreenshots => "search-screenshots",
            Self::SearchAudio => "search-audio",
            Self::GetRecentActivity => "get-recent-activity",
            Self::GetCapture => "get-capture",
            Self::SampleCaptures => "sample-captures",
        }
    }

    pub fn risk(&self) -> ToolRisk {
        match self {
            Self::Ping | Self::GetStats | Self::GetActivityGraph => ToolRisk::Safe,
            Self::SearchScreenshots | Self::SearchAudio => ToolRisk::HeuristicOnly,
            Self::GetRecentActivity | Self::GetCapture | Self::SampleCaptures => {
                ToolRisk::Adjudicated
            }
        }
    }

    /// Tools whose `query` argument must be a meaningful search string.
    pub fn is_query_bearing(&self) -> bool {
        matches!(self, Self::SearchScreenshots | Self::SearchAudio)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ping => "Check that the history server is reachable.",
            Self::GetStats => {
                "Capture statistics: totals by kind, distinct apps, first and last capture, database size."
            }
            Self::GetActivityGraph => {
                "Hourly capture counts per application over a trailing window."
            }
            Self::SearchScreenshots => {
                "Search on-screen text captured from screenshots. Returns ranked matches with snippets."
            }
            Self::SearchAudio => {
                "Search transcribed audio. Returns ranked matches with snippets."
            }
            Self::GetRecentActivity => {
                "Full captures from the last N minutes, newest first."
            }
            Self::GetCapture => "Fetch one capture's full text by ID.",
            Self::SampleCaptures => "Random sample of captures, optionally of one kind.",
        }
    }

    pub fn input_schema(&self) -> Value {
        let schema = match self {
            Self::Ping | Self::GetStats => return json!({ "type": "object", "properties": {} }),
            Self::GetActivityGraph => serde_json::to_value(schemars::schema_for!(ActivityGraphParams)),
            Self::SearchScreenshots => {
                serde_json::to_value(schemars::schema_for!(SearchScreenshotsParams))
            }
            Self::SearchAudio => serde_json::to_value(schemars::schema_for!(SearchAudioParams)),
            Self::GetRecentActivity => {
                serde_json::to_value(schemars::schema_for!(RecentActivityParams))
            }
            Self::GetCapture => serde_json::to_value(schemars::schema_for!(GetCaptureParams)),
            Self::SampleCaptures => {
                serde_json::to_value(schemars::schema_for!(SampleCapturesParams))
            }
        };
        schema.unwrap_or_else(|_| json!({ "type": "object" }))
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

/// A fully-typed tool invocation.
#[derive(Debug)]
pub enum ToolCall {
    Ping,
    GetStats,
    GetActivityGraph(ActivityGraphParams),
    SearchScreenshots(SearchScreenshotsParams),
    SearchAudio(SearchAudioParams),
    GetRecentActivity(RecentActivityParams),
    GetCapture(GetCaptureParams),
    SampleCaptures(SampleCapturesParams),
}

impl ToolCall {
    pub fn parse(name: &str, arguments: Value) -> Result<Self, ToolError> {
        let tool: ToolName = name.parse()?;
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        Ok(match tool {
            ToolName::Ping => Self::Ping,
            ToolName::GetStats => Self::GetStats,
            ToolName::GetActivityGraph => Self::GetActivityGraph(typed(tool, arguments)?),
            ToolName::SearchScreenshots => Self::SearchScreenshots(typed(tool, arguments)?),
            ToolName::SearchAudio => Self::SearchAudio(typed(tool, arguments)?),
            ToolName::GetRecentActivity => Self::GetRecentActivity(typed(tool, arguments)?),
            ToolName::GetCapture => Self::GetCapture(typed(tool, arguments)?),
            ToolName::SampleCaptures => Self::SampleCaptures(typed(tool, arguments)?),
        })
    }
}

fn typed<T: DeserializeOwned>(tool: ToolName, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.as_str(),
        message: e.to_string(),
    })
}

fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_RESULTS)
}

/// Instance and bare tool name a published tool name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolTarget {
    pub instance: String,
    pub tool: String,
}

/// Anything that can publish a tool catalog and execute calls against it.
///
/// `call_tool` never fails at the type level: errors come back as `{"error": ...}`.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolDescriptor>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Value;

    /// Which instance a published name belongs to, and the tool name there.
    fn resolve(&self, name: &str) -> ToolTarget;
}

/// In-process tool server over the local capture index.
#[derive(Clone)]
pub struct LocalToolServer {
    instance_name: String,
    db: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl LocalToolServer {
    pub fn new(instance_name: impl Into<String>, db: Arc<Mutex<Connection>>, db_path: Option<PathBuf>) -> Self {
        Self {
            instance_name: instance_name.into(),
            db,
            db_path,
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn catalog() -> Vec<ToolDescriptor> {
        ToolName::ALL.iter().map(ToolName::descriptor).collect()
    }

    /// Run a typed call against the capture index.
    pub async fn execute(&self, call: ToolCall) -> Result<Value, ToolError> {
        if let ToolCall::Ping = call {
            return Ok(json!({ "status": "ok", "instance": self.instance_name }));
        }

        let db = Arc::clone(&self.db);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| ToolError::Backend(format!("db lock poisoned: {e}")))?;
            run_blocking(&conn, db_path.as_deref(), call)
        })
        .await
        .map_err(|e| ToolError::Backend(format!("db task failed: {e}")))?
    }
}

fn run_blocking(
    conn: &Connection,
    db_path: Option<&std::path::Path>,
    call: ToolCall,
) -> Result<Value, ToolError> {
    let backend = |e: anyhow::Error| ToolError::Backend(e.to_string());

    match call {
        ToolCall::Ping => Ok(json!({ "status": "ok" })),
        ToolCall::GetStats => {
            let stats = history::stats::capture_stats(conn, db_path).map_err(backend)?;
            to_json(&stats)
        }
        ToolCall::GetActivityGraph(params) => {
            let hours = params.hours.unwrap_or(24).clamp(1, 168);
            let since = Utc::now() - chrono::Duration::hours(i64::from(hours));
            let buckets = history::stats::activity_graph(conn, since).map_err(backend)?;
            Ok(json!({ "hours": hours, "buckets": to_json(&buckets)? }))
        }
        ToolCall::SearchScreenshots(params) => {
            let limit = clamp_limit(params.limit, 10);
            let hits = history::search::search_captures(
                conn,
                CaptureKind::Screen,
                &params.query,
                limit,
                params.app.as_deref(),
            )
            .map_err(backend)?;
            Ok(json!({ "query": params.query, "total": hits.len(), "results": to_json(&hits)? }))
        }
        ToolCall::SearchAudio(params) => {
            let limit = clamp_limit(params.limit, 10);
            let hits = history::search::search_captures(
                conn,
                CaptureKind::Audio,
                &params.query,
                limit,
                None,
            )
            .map_err(backend)?;
            Ok(json!({ "query": params.query, "total": hits.len(), "results": to_json(&hits)? }))
        }
        ToolCall::GetRecentActivity(params) => {
            let minutes = params.minutes.unwrap_or(60).max(1);
            let since = Utc::now() - chrono::Duration::minutes(i64::from(minutes));
            let captures = history::recent_captures(conn, since, clamp_limit(params.limit, 50))
                .map_err(backend)?;
            Ok(json!({ "minutes": minutes, "total": captures.len(), "captures": to_json(&captures)? }))
        }
        ToolCall::GetCapture(params) => match history::get_capture(conn, params.id).map_err(backend)? {
            Some(capture) => to_json(&capture),
            None => Err(ToolError::NotFound(params.id)),
        },
        ToolCall::SampleCaptures(params) => {
            let captures =
                history::sample_captures(conn, clamp_limit(params.max_samples, 20), params.kind)
                    .map_err(backend)?;
            Ok(json!({ "total": captures.len(), "captures": to_json(&captures)? }))
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Backend(format!("serialization failed: {e}")))
}

#[async_trait]
impl ToolSource for LocalToolServer {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        Self::catalog()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        let started = std::time::Instant::now();
        let result = match ToolCall::parse(name, arguments) {
            Ok(call) => self.execute(call).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => {
                tracing::info!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "local tool call completed"
                );
                value
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "local tool call failed");
                json!({ "error": e.to_string(), "tool": name })
            }
        }
    }

    fn resolve(&self, name: &str) -> ToolTarget {
        ToolTarget {
            instance: self.instance_name.clone(),
            tool: name.to_string(),
        }
    }
}
