//! MCP `get-capture` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get-capture` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetCaptureParams {
    /// Capture row id, as returned by the search tools.
    #[schemars(description = "ID of the capture to fetch in full")]
    pub id: i64,
}
