//! MCP `search-screenshots` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search-screenshots` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchScreenshotsParams {
    /// Free text matched against OCR content and window titles. Operators are
    /// quoted away, so `OR` and `NEAR` are plain words.
    #[schemars(description = "Keywords to find in on-screen text (OCR). At least 3 characters.")]
    pub query: String,

    /// Clamped to 1..=200.
    #[schemars(description = "Maximum number of matches to return (1-200). Defaults to 10.")]
    pub limit: Option<usize>,

    /// Exact application name as recorded by the capture daemon.
    #[schemars(description = "Only return captures from this application, e.g. 'Firefox'")]
    pub app: Option<String>,
}
