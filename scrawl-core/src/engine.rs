//! The classification engine: lazy model lifecycle plus the image-to-result pipeline.

use std::{
    any::Any,
    mem,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use image::DynamicImage;
use log::{debug, info, warn};
use scrawl_utils::{AppSettings, config::DEFAULT_NUM_THREADS, timing_guard};

use crate::{
    error::EngineError,
    model::TractBackend,
    postprocess::{ClassificationResult, OutputScores},
    preprocess::{CpuPreprocessor, PreprocessConfig, Preprocessor},
    runtime::{Backend, LoadOptions, MappedAsset, ModelHandle, ModelSpec},
    tensor::OutputBuffer,
};

/// Where to find the model and how to feed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub model_path: PathBuf,
    pub num_threads: usize,
    pub preprocess: PreprocessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for EngineConfig {
    fn from(settings: &AppSettings) -> Self {
        let num_threads = match settings.model.num_threads {
            0 => DEFAULT_NUM_THREADS,
            n => n,
        };
        Self {
            model_path: settings.model.resolved_path(),
            num_threads,
            preprocess: PreprocessConfig::from(settings.resize_quality),
        }
    }
}

impl EngineConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }
}

#[derive(Debug)]
enum EngineState {
    Unloaded,
    Loaded(ModelHandle),
    LoadFailed(EngineError),
}

/// Observable lifecycle state of an [`InferenceEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
    LoadFailed,
}

/// Owns at most one loaded model and turns images into [`ClassificationResult`]s.
///
/// The model is loaded on the first [`classify`](Self::classify) call. A failed load is
/// retried on every later call until it succeeds. Every method takes `&mut self`; use
/// [`ClassificationWorker`](crate::worker::ClassificationWorker) or
/// [`SharedEngine`](crate::worker::SharedEngine) to share one engine between threads.
pub struct InferenceEngine<B: Backend = TractBackend> {
    backend: B,
    preprocessor: Box<dyn Preprocessor>,
    config: EngineConfig,
    state: EngineState,
}

impl<B: Backend> std::fmt::Debug for InferenceEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("backend", &self.backend.name())
            .field("preprocessor", &self.preprocessor)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl InferenceEngine<TractBackend> {
    /// Engine backed by the tract runtime.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(TractBackend, config)
    }
}

impl<B: Backend> InferenceEngine<B> {
    pub fn with_backend(backend: B, config: EngineConfig) -> Self {
        Self {
            backend,
            preprocessor: Box::new(CpuPreprocessor),
            config,
            state: EngineState::Unloaded,
        }
    }

    /// Replace the image packing stage.
    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessor = Box::new(preprocessor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model_path
    }

    pub fn state(&self) -> LoadState {
        match self.state {
            EngineState::Unloaded => LoadState::Unloaded,
            EngineState::Loaded(_) => LoadState::Loaded,
            EngineState::LoadFailed(_) => LoadState::LoadFailed,
        }
    }

    /// The loaded model, if any.
    pub fn model(&self) -> Option<&ModelHandle> {
        match &self.state {
            EngineState::Loaded(handle) => Some(handle),
            _ => None,
        }
    }

    /// The error from the most recent failed load, if the engine is in that state.
    pub fn load_error(&self) -> Option<&EngineError> {
        match &self.state {
            EngineState::LoadFailed(err) => Some(err),
            _ => None,
        }
    }

    /// Load the model unless it is already loaded.
    ///
    /// Returns immediately without touching the asset when a model is held.
    pub fn ensure_loaded(&mut self) -> Result<(), EngineError> {
        if matches!(self.state, EngineState::Loaded(_)) {
            return Ok(());
        }

        match self.load_handle() {
            Ok(handle) => {
                self.state = EngineState::Loaded(handle);
                Ok(())
            }
            Err(err) => {
                warn!("{err}");
                self.state = EngineState::LoadFailed(err.clone());
                Err(err)
            }
        }
    }

    /// Classify one decoded image.
    ///
    /// Never fails: any problem is reported through [`ClassificationResult::error`]
    /// with zeroed scores.
    pub fn classify(&mut self, image: &DynamicImage) -> ClassificationResult {
        let _guard = timing_guard("scrawl_core::classify", log::Level::Debug);
        match self.try_classify(image) {
            Ok(result) => {
                debug!(
                    "classified image: risk {:.3}, confidence {:.3}, detected {}",
                    result.risk_score, result.confidence, result.is_detected
                );
                result
            }
            Err(err) => {
                warn!("classification failed: {err}");
                ClassificationResult::failure(&err)
            }
        }
    }

    /// Release the model and its memory map. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        match mem::replace(&mut self.state, EngineState::Unloaded) {
            EngineState::Loaded(handle) => {
                info!("released model {}", handle.asset_path().display());
            }
            EngineState::LoadFailed(_) | EngineState::Unloaded => {}
        }
    }

    /// Point the engine at a different asset. Any loaded model is released first.
    pub fn relocate_asset(&mut self, path: impl Into<PathBuf>) {
        self.dispose();
        self.config.model_path = path.into();
        debug!("model asset relocated to {}", self.config.model_path.display());
    }

    fn load_handle(&self) -> Result<ModelHandle, EngineError> {
        let _guard = timing_guard("scrawl_core::model_load", log::Level::Debug);
        let path = &self.config.model_path;
        let asset = MappedAsset::open(path)?;
        let options = LoadOptions {
            num_threads: self.config.num_threads,
        };

        let runtime = panic::catch_unwind(AssertUnwindSafe(|| self.backend.load(&asset, &options)))
            .unwrap_or_else(|payload| {
                Err(EngineError::asset(
                    path,
                    format!("runtime panicked: {}", panic_message(payload.as_ref())),
                ))
            })?;

        let handle = ModelHandle::new(runtime, asset, options.num_threads);
        info!(
            "loaded model {} with {} backend (input {:?} {:?}, output {:?})",
            path.display(),
            self.backend.name(),
            handle.input_shape(),
            handle.input_type(),
            handle.output_shape()
        );
        Ok(handle)
    }

    fn try_classify(&mut self, image: &DynamicImage) -> Result<ClassificationResult, EngineError> {
        self.ensure_loaded()?;

        let Self {
            preprocessor,
            config,
            state,
            ..
        } = self;
        let EngineState::Loaded(handle) = state else {
            return Err(EngineError::runtime("model is not loaded"));
        };
        let spec = ModelSpec::from_signature(handle.signature())?;

        let input = guarded("image preprocessing", || {
            let _guard = timing_guard("scrawl_core::preprocess", log::Level::Debug);
            preprocessor.preprocess(image, &spec.input, &config.preprocess)
        })?;
        spec.check_input(&input)?;

        let mut output = OutputBuffer::zeroed(spec.output_elements());
        guarded("inference", || {
            let _guard = timing_guard("scrawl_core::inference", log::Level::Debug);
            handle.run(&input, &mut output)
        })?;

        let _guard = timing_guard("scrawl_core::postprocess", log::Level::Trace);
        let scores = OutputScores::decode(output.as_bytes())?;
        Ok(scores.interpret())
    }
}

impl<B: Backend> Drop for InferenceEngine<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn guarded<T>(
    stage: &str,
    f: impl FnOnce() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(EngineError::runtime(format!(
            "{stage} panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
