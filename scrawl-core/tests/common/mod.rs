//! Scriptable backend for exercising the engine without a real model.
#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use image::{DynamicImage, Rgb, RgbImage};
use scrawl_core::{
    Backend, DeclaredType, ElementType, EngineConfig, EngineError, InferenceEngine, InputTensor,
    LoadOptions, MappedAsset, OutputBuffer, PreprocessConfig, Runtime, TensorSignature,
};

/// How the stub runtime behaves; may be changed between calls.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub signature: TensorSignature,
    pub scores: Vec<f32>,
    pub fail_load: Option<String>,
    pub fail_run: Option<String>,
    pub panic_run: bool,
    pub delay: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            signature: signature(&[1, 224, 224, 3], DeclaredType::Float32, &[1, 2]),
            scores: vec![0.2, 0.8],
            fail_load: None,
            fail_run: None,
            panic_run: false,
            delay: Duration::ZERO,
        }
    }
}

/// What the runtime received on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenInput {
    pub shape: Vec<usize>,
    pub byte_len: usize,
    pub element: ElementType,
    pub head: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct StubState {
    pub loads: AtomicUsize,
    pub runs: AtomicUsize,
    pub seen: Mutex<Vec<SeenInput>>,
    pub behavior: Mutex<Behavior>,
}

impl StubState {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenInput> {
        self.seen.lock().unwrap().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.behavior.lock().unwrap());
    }
}

#[derive(Debug, Clone)]
pub struct StubBackend {
    pub state: Arc<StubState>,
}

impl StubBackend {
    pub fn new(behavior: Behavior) -> Self {
        let state = StubState {
            behavior: Mutex::new(behavior),
            ..StubState::default()
        };
        Self {
            state: Arc::new(state),
        }
    }
}

impl Backend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn load(
        &self,
        asset: &MappedAsset,
        _options: &LoadOptions,
    ) -> Result<Box<dyn Runtime>, EngineError> {
        self.state.loads.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.behavior.lock().unwrap().clone();
        if let Some(reason) = behavior.fail_load {
            return Err(EngineError::asset(asset.path(), reason));
        }
        Ok(Box::new(StubRuntime {
            state: Arc::clone(&self.state),
            signature: behavior.signature,
        }))
    }
}

struct StubRuntime {
    state: Arc<StubState>,
    signature: TensorSignature,
}

impl Runtime for StubRuntime {
    fn signature(&self) -> &TensorSignature {
        &self.signature
    }

    fn run(&mut self, input: &InputTensor, output: &mut OutputBuffer) -> Result<(), EngineError> {
        self.state.runs.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.behavior.lock().unwrap().clone();
        self.state.seen.lock().unwrap().push(SeenInput {
            shape: input.shape().to_vec(),
            byte_len: input.byte_len(),
            element: input.element_type(),
            head: input.as_bytes().iter().take(12).copied().collect(),
        });

        if !behavior.delay.is_zero() {
            thread::sleep(behavior.delay);
        }
        if behavior.panic_run {
            panic!("stub runtime exploded");
        }
        if let Some(reason) = behavior.fail_run {
            return Err(EngineError::runtime(reason));
        }
        output.fill_from(&behavior.scores)
    }
}

pub fn signature(input: &[usize], input_type: DeclaredType, output: &[usize]) -> TensorSignature {
    TensorSignature {
        input_shape: input.to_vec(),
        input_type,
        output_shape: output.to_vec(),
    }
}

/// Write a placeholder asset so the engine has something to map.
pub fn write_asset(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"stub model bytes").expect("write stub asset");
    path
}

pub fn engine_for(path: &Path, backend: StubBackend) -> InferenceEngine<StubBackend> {
    let config = EngineConfig {
        model_path: path.to_path_buf(),
        num_threads: 4,
        preprocess: PreprocessConfig::default(),
    };
    InferenceEngine::with_backend(backend, config)
}

pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Path of a checked-in model under `tests/fixtures`.
pub fn fixture_model(name: &str) -> PathBuf {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    assert!(path.is_file(), "fixture {} is missing", path.display());
    path
}
