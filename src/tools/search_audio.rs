//! MCP `search-audio` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search-audio` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchAudioParams {
    /// Free text matched against transcripts.
    #[schemars(description = "Keywords to find in transcribed audio. At least 3 characters.")]
    pub query: String,

    /// Clamped to 1..=200.
    #[schemars(description = "Maximum number of matches to return (1-200). Defaults to 10.")]
    pub limit: Option<usize>,
}
