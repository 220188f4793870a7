//! Capture record types.

use serde::{Deserialize, Serialize};

/// What produced a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// OCR text from a screenshot.
    Screen,
    /// Transcribed audio chunk.
    Audio,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaptureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screen" => Ok(Self::Screen),
            "audio" => Ok(Self::Audio),
            _ => Err(format!("unknown capture kind: {s}")),
        }
    }
}

/// A row of the `captures` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub id: i64,
    pub kind: CaptureKind,
    /// RFC 3339 UTC timestamp, second precision.
    pub captured_at: String,
    pub app: Option<String>,
    pub window_title: Option<String>,
    pub content: String,
}

/// Input for [`insert_capture`](super::insert_capture).
#[derive(Debug, Clone)]
pub struct NewCapture {
    pub kind: CaptureKind,
    pub captured_at: chrono::DateTime<chrono::Utc>,
    pub app: Option<String>,
    pub window_title: Option<String>,
    pub content: String,
}

/// A full-text search match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub kind: CaptureKind,
    pub captured_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    pub snippet: String,
    /// BM25 rank, lower is better.
    pub score: f64,
}

/// Captures per app per hour.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActivityBucket {
    /// `YYYY-MM-DDTHH`
    pub hour: String,
    pub app: String,
    pub captures: u64,
}
