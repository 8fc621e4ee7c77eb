//! Core handwriting risk classification primitives.
//!
//! This crate lazily loads a bundled image-classification model, runs inference
//! with `tract`, and turns the raw class scores into a dyslexia risk assessment.
//! Failures never escape [`InferenceEngine::classify`]; they are reported on the
//! returned [`ClassificationResult`].

/// Classification engine and model lifecycle.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// tract-backed model loading and execution.
pub mod model;
/// Output decoding and risk interpretation.
pub mod postprocess;
/// Image resampling and tensor packing.
pub mod preprocess;
/// Backend/runtime seam and declared tensor signatures.
pub mod runtime;
/// Input and output tensor buffers.
pub mod tensor;
/// Worker thread and mutex-guarded engine sharing.
pub mod worker;

pub use engine::{EngineConfig, InferenceEngine, LoadState};
pub use error::{EngineError, ErrorKind};
pub use model::{ModelFormat, TractBackend};
pub use postprocess::{
    AT_RISK_CLASS, ClassificationError, ClassificationResult, DETECTION_THRESHOLD, OutputScores,
    RiskLevel, decode_scores, interpret,
};
pub use preprocess::{CpuPreprocessor, PreprocessConfig, Preprocessor, pack_input};
pub use runtime::{
    Backend, DeclaredType, InputLayout, LoadOptions, MappedAsset, ModelHandle, ModelSpec, Runtime,
    TensorSignature,
};
pub use tensor::{ElementType, InputData, InputTensor, OutputBuffer};
pub use worker::{
    ClassificationWorker, PendingClassification, SharedEngine, classify_shared, shared_engine,
};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
