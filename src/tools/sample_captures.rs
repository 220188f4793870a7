//! MCP `sample-captures` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::history::types::CaptureKind;

/// Parameters for the `sample-captures` tool.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SampleCapturesParams {
    /// Upper bound on the sample size, clamped to 1..=200.
    #[schemars(description = "Number of random captures to return (1-200). Defaults to 20.")]
    pub max_samples: Option<usize>,

    /// Both kinds are sampled when unset.
    #[schemars(description = "Restrict to 'screen' or 'audio' captures")]
    pub kind: Option<CaptureKind>,
}
