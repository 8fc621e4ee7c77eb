//! Decoding of raw model output into a risk assessment.

use serde::Serialize;

use crate::error::{EngineError, ErrorKind};

/// Output index holding the "at-risk" class score.
pub const AT_RISK_CLASS: usize = 1;
/// A risk score strictly above this value counts as a detection.
pub const DETECTION_THRESHOLD: f32 = 0.5;

const MEDIUM_RISK_FLOOR: f32 = 0.3;
const HIGH_RISK_FLOOR: f32 = 0.6;

/// Class scores in model output order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputScores {
    scores: Vec<f32>,
}

impl OutputScores {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    /// Reinterpret a native-endian byte buffer as consecutive `f32` scores.
    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() % 4 != 0 {
            return Err(EngineError::invalid_output(format!(
                "output buffer of {} bytes is not a whole number of f32 values",
                bytes.len()
            )));
        }
        let scores = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { scores })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Score of the at-risk class, or 0 when the model emits fewer classes.
    pub fn risk_score(&self) -> f32 {
        self.scores.get(AT_RISK_CLASS).copied().unwrap_or(0.0)
    }

    /// Highest score across all classes, or 0 when there are none.
    pub fn confidence(&self) -> f32 {
        self.scores.iter().copied().reduce(f32::max).unwrap_or(0.0)
    }

    pub fn interpret(&self) -> ClassificationResult {
        let risk_score = self.risk_score();
        ClassificationResult {
            risk_score,
            confidence: self.confidence(),
            is_detected: risk_score > DETECTION_THRESHOLD,
            error: None,
        }
    }
}

/// Shorthand for [`OutputScores::decode`].
pub fn decode_scores(bytes: &[u8]) -> Result<OutputScores, EngineError> {
    OutputScores::decode(bytes)
}

/// Shorthand for [`OutputScores::interpret`].
pub fn interpret(scores: &OutputScores) -> ClassificationResult {
    scores.interpret()
}

/// Coarse banding of a risk score for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f32) -> Self {
        if score < MEDIUM_RISK_FLOOR {
            RiskLevel::Low
        } else if score < HIGH_RISK_FLOOR {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

/// Why a classification produced no meaningful scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one classification call.
///
/// When `error` is set the numeric fields hold their zero defaults and carry no meaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub risk_score: f32,
    pub confidence: f32,
    pub is_detected: bool,
    pub error: Option<ClassificationError>,
}

impl ClassificationResult {
    pub fn failure(err: &EngineError) -> Self {
        Self {
            risk_score: 0.0,
            confidence: 0.0,
            is_detected: false,
            error: Some(ClassificationError {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }

    /// Risk score as a whole percentage, truncated toward zero.
    pub fn risk_percentage(&self) -> i32 {
        (self.risk_score * 100.0) as i32
    }
}
