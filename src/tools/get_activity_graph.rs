//! MCP `get-activity-graph` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get-activity-graph` tool.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ActivityGraphParams {
    /// How many trailing hours to chart.
    #[schemars(description = "Trailing window in hours (1-168). Defaults to 24.")]
    pub hours: Option<u32>,
}
