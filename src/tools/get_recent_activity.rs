//! MCP `get-recent-activity` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get-recent-activity` tool.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecentActivityParams {
    /// Size of the trailing window, counted back from now.
    #[schemars(description = "Look back this many minutes. Defaults to 60.")]
    pub minutes: Option<u32>,

    /// Newest captures first, clamped to 1..=200.
    #[schemars(description = "Maximum number of captures to return (1-200). Defaults to 50.")]
    pub limit: Option<usize>,
}
