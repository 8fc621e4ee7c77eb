//! Tensor buffers exchanged with the inference runtime.
//!
//! Inputs are packed row-major and pixel-interleaved (`[1, H, W, 3]`, RGB) in the
//! element type the model declares. Outputs are always 32-bit floats.

use bytemuck::cast_slice;

use crate::error::EngineError;

/// Numeric type of the model's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 32-bit float, each channel scaled to `[0, 1]`.
    Float32,
    /// 8-bit unsigned integer, raw channel value in `[0, 255]`.
    UInt8,
}

impl ElementType {
    pub const fn size_in_bytes(self) -> usize {
        match self {
            ElementType::Float32 => 4,
            ElementType::UInt8 => 1,
        }
    }
}

/// Backing storage of an [`InputTensor`].
#[derive(Debug, Clone, PartialEq)]
pub enum InputData {
    Float32(Vec<f32>),
    UInt8(Vec<u8>),
}

/// Packed image data ready to hand to a runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: [usize; 4],
    data: InputData,
}

impl InputTensor {
    /// Wrap packed pixel data. `data` must hold exactly `height * width * 3` elements.
    pub fn new(height: usize, width: usize, data: InputData) -> Result<Self, EngineError> {
        let shape = [1, height, width, 3];
        let expected = shape.iter().product::<usize>();
        let actual = match &data {
            InputData::Float32(values) => values.len(),
            InputData::UInt8(values) => values.len(),
        };
        if actual != expected {
            return Err(EngineError::runtime(format!(
                "packed input holds {actual} elements but {shape:?} needs {expected}"
            )));
        }
        Ok(Self { shape, data })
    }

    /// Shape as `[batch, height, width, channels]`.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &InputData {
        &self.data
    }

    pub fn element_type(&self) -> ElementType {
        match self.data {
            InputData::Float32(_) => ElementType::Float32,
            InputData::UInt8(_) => ElementType::UInt8,
        }
    }

    /// Raw bytes in native endianness.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            InputData::Float32(values) => cast_slice(values),
            InputData::UInt8(values) => values,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }
}

/// Output storage sized from the model's declared output shape and filled in place.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBuffer {
    values: Vec<f32>,
}

impl OutputBuffer {
    pub fn zeroed(elements: usize) -> Self {
        Self {
            values: vec![0.0; elements],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.values.len() * std::mem::size_of::<f32>()
    }

    pub fn as_bytes(&self) -> &[u8] {
        cast_slice(&self.values)
    }

    /// Copy runtime results into the buffer, rejecting any length mismatch.
    pub fn fill_from(&mut self, values: &[f32]) -> Result<(), EngineError> {
        if values.len() != self.values.len() {
            return Err(EngineError::runtime(format!(
                "runtime produced {} output values, expected {}",
                values.len(),
                self.values.len()
            )));
        }
        self.values.copy_from_slice(values);
        Ok(())
    }
}
