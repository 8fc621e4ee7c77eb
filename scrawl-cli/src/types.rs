//! Serializable output records for scrawl-cli.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use scrawl_core::{ClassificationResult, RiskLevel};
use serde::Serialize;

use crate::args::ImageSource;

/// Error kind for images that never reached the engine.
pub const INPUT_ERROR: &str = "input";
/// Error kind for requests abandoned after `--timeout-ms`.
pub const TIMEOUT_ERROR: &str = "timeout";

/// One classified image, shaped like the record the app syncs upstream.
#[derive(Debug, Serialize)]
pub struct ClassificationRecord {
    pub image: String,
    pub source: ImageSource,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub risk_score: f32,
    pub confidence: f32,
    pub detected: bool,
    pub risk_level: RiskLevel,
    pub percentage: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationRecord {
    pub fn from_result(image: &Path, source: ImageSource, result: &ClassificationResult) -> Self {
        Self {
            image: image.display().to_string(),
            source,
            timestamp: now_millis(),
            risk_score: result.risk_score,
            confidence: result.confidence,
            detected: result.is_detected,
            risk_level: result.risk_level(),
            percentage: result.risk_percentage(),
            error_kind: result.error_kind().map(|kind| kind.as_str()),
            error: result.error_message().map(str::to_string),
        }
    }

    /// Record for an image that produced no classification at all.
    pub fn failed(
        image: &Path,
        source: ImageSource,
        kind: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            image: image.display().to_string(),
            source,
            timestamp: now_millis(),
            risk_score: 0.0,
            confidence: 0.0,
            detected: false,
            risk_level: RiskLevel::Low,
            percentage: 0,
            error_kind: Some(kind),
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
