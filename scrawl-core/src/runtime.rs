//! Runtime seam between the engine and an inference backend.
//!
//! A [`Backend`] turns a memory-mapped model asset into a [`Runtime`]; the runtime
//! reports the tensor signature the model declares and executes inference into a
//! caller-provided [`OutputBuffer`]. The engine owns exactly one runtime at a time
//! through a [`ModelHandle`].

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use log::debug;
use memmap2::Mmap;

use crate::{
    error::EngineError,
    tensor::{ElementType, InputTensor, OutputBuffer},
};

/// Element type as declared by the model, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Float32,
    UInt8,
    /// Any type the engine cannot pack, named as the runtime reports it.
    Other(String),
}

impl From<ElementType> for DeclaredType {
    fn from(element: ElementType) -> Self {
        match element {
            ElementType::Float32 => DeclaredType::Float32,
            ElementType::UInt8 => DeclaredType::UInt8,
        }
    }
}

/// Shapes and input type read off a loaded model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSignature {
    pub input_shape: Vec<usize>,
    pub input_type: DeclaredType,
    pub output_shape: Vec<usize>,
}

/// Validated input geometry: `[batch, height, width, channels]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLayout {
    pub batch: usize,
    pub height: u32,
    pub width: u32,
    pub channels: usize,
    pub element: ElementType,
}

impl InputLayout {
    /// Bytes a packed RGB tensor for this layout occupies.
    pub fn packed_byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 3 * self.element.size_in_bytes()
    }
}

/// What the engine needs to drive a model, derived from its [`TensorSignature`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub input: InputLayout,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    input_bytes: usize,
    output_elements: usize,
}

fn checked_elements(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

impl ModelSpec {
    pub fn from_signature(signature: &TensorSignature) -> Result<Self, EngineError> {
        let shape = &signature.input_shape;
        if shape.len() < 4 {
            return Err(EngineError::invalid_input(format!(
                "expected [batch, height, width, channels], model declares {shape:?}"
            )));
        }

        if shape[0] != 1 {
            return Err(EngineError::invalid_input(format!(
                "expected a batch of 1, model declares {}",
                shape[0]
            )));
        }

        let element = match &signature.input_type {
            DeclaredType::Float32 => ElementType::Float32,
            DeclaredType::UInt8 => ElementType::UInt8,
            DeclaredType::Other(name) => {
                return Err(EngineError::invalid_input(format!(
                    "unsupported input element type {name}"
                )));
            }
        };

        let dimension = |value: usize, label: &str| {
            u32::try_from(value)
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| EngineError::invalid_input(format!("invalid {label} {value}")))
        };
        let height = dimension(shape[1], "height")?;
        let width = dimension(shape[2], "width")?;
        let channels = shape[3];
        if channels != 3 {
            return Err(EngineError::invalid_input(format!(
                "expected 3 colour channels, model declares {channels}"
            )));
        }

        let input_bytes = checked_elements(shape)
            .and_then(|n| n.checked_mul(element.size_in_bytes()))
            .ok_or_else(|| {
                EngineError::invalid_input(format!("declared input shape {shape:?} overflows"))
            })?;

        let output_shape = &signature.output_shape;
        if output_shape.is_empty() {
            return Err(EngineError::invalid_output(
                "model declares no output dimensions",
            ));
        }
        let output_elements = checked_elements(output_shape).ok_or_else(|| {
            EngineError::invalid_output(format!("declared output shape {output_shape:?} overflows"))
        })?;
        if output_elements == 0 {
            return Err(EngineError::invalid_output(format!(
                "declared output shape {output_shape:?} has no elements"
            )));
        }

        Ok(Self {
            input: InputLayout {
                batch: shape[0],
                height,
                width,
                channels,
                element,
            },
            input_shape: shape.clone(),
            output_shape: output_shape.clone(),
            input_bytes,
            output_elements,
        })
    }

    /// Byte length the declared input shape requires.
    pub fn input_byte_len(&self) -> usize {
        self.input_bytes
    }

    /// Total number of output elements across every declared dimension.
    pub fn output_elements(&self) -> usize {
        self.output_elements
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    /// Reject a packed tensor whose size disagrees with the declared input shape.
    pub fn check_input(&self, input: &InputTensor) -> Result<(), EngineError> {
        let expected = self.input_byte_len();
        if input.byte_len() != expected || input.element_type() != self.input.element {
            return Err(EngineError::runtime(format!(
                "packed input is {} bytes of {:?}, model declares {:?} ({} bytes of {:?})",
                input.byte_len(),
                input.element_type(),
                self.input_shape,
                expected,
                self.input.element
            )));
        }
        Ok(())
    }
}

/// Read-only memory map of a model asset.
#[derive(Debug)]
pub struct MappedAsset {
    path: PathBuf,
    map: Mmap,
}

impl MappedAsset {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|e| EngineError::asset(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| EngineError::asset(path, e))?
            .len();
        if len == 0 {
            return Err(EngineError::asset(path, "asset is empty"));
        }
        // SAFETY: the asset bundle is treated as read-only while the engine holds the map.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| EngineError::asset(path, e))?;
        debug!(
            "mapped model asset {} ({:.2} MB)",
            path.display(),
            len as f64 / (1024.0 * 1024.0)
        );
        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Options forwarded to [`Backend::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Thread-count hint for the runtime.
    pub num_threads: usize,
}

/// A loaded, executable model.
pub trait Runtime: Send {
    /// Tensor shapes and input type declared by the model.
    fn signature(&self) -> &TensorSignature;

    /// Run inference synchronously, writing every output value into `output`.
    fn run(&mut self, input: &InputTensor, output: &mut OutputBuffer) -> Result<(), EngineError>;
}

/// Factory that builds runtimes from model assets.
pub trait Backend: Send {
    fn name(&self) -> &str;

    fn load(
        &self,
        asset: &MappedAsset,
        options: &LoadOptions,
    ) -> Result<Box<dyn Runtime>, EngineError>;
}

/// Exclusive owner of a loaded model and the mapping it was built from.
///
/// Dropping the handle releases both the runtime and the memory map.
pub struct ModelHandle {
    runtime: Box<dyn Runtime>,
    asset: MappedAsset,
    num_threads: usize,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("asset", &self.asset.path())
            .field("signature", self.runtime.signature())
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

impl ModelHandle {
    pub(crate) fn new(runtime: Box<dyn Runtime>, asset: MappedAsset, num_threads: usize) -> Self {
        Self {
            runtime,
            asset,
            num_threads,
        }
    }

    pub fn signature(&self) -> &TensorSignature {
        self.runtime.signature()
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.signature().input_shape
    }

    pub fn input_type(&self) -> &DeclaredType {
        &self.signature().input_type
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.signature().output_shape
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn asset_path(&self) -> &Path {
        self.asset.path()
    }

    pub(crate) fn run(
        &mut self,
        input: &InputTensor,
        output: &mut OutputBuffer,
    ) -> Result<(), EngineError> {
        self.runtime.run(input, output)
    }
}
