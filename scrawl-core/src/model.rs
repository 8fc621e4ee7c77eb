use std::{fmt::Write, path::Path};

use log::{debug, warn};
use tract_onnx::prelude::{
    DatumType, Framework, InferenceFact, InferenceModel, InferenceModelExt, RunnableModel, Tensor,
    TypedFact, TypedModel, TypedOp, tvec,
};
use tract_onnx::tract_core::internal::DimLike;

use crate::{
    error::EngineError,
    runtime::{Backend, DeclaredType, LoadOptions, MappedAsset, Runtime, TensorSignature},
    tensor::{InputData, InputTensor, OutputBuffer},
};

type RunnablePlan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Interchange format of a model asset, chosen from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// Flat-buffer graph with embedded weights (`.tflite`).
    Tflite,
    /// ONNX protobuf graph (`.onnx`).
    Onnx,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("onnx") => ModelFormat::Onnx,
            _ => ModelFormat::Tflite,
        }
    }
}

/// Pure-Rust runtime backed by `tract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TractBackend;

impl Backend for TractBackend {
    fn name(&self) -> &str {
        "tract"
    }

    fn load(
        &self,
        asset: &MappedAsset,
        options: &LoadOptions,
    ) -> Result<Box<dyn Runtime>, EngineError> {
        let runtime = TractRuntime::load(asset, options)?;
        Ok(Box::new(runtime))
    }
}

/// A tract plan together with the tensor signature it was built from.
pub struct TractRuntime {
    plan: RunnablePlan,
    signature: TensorSignature,
    input_datum: DatumType,
}

impl TractRuntime {
    /// Parse, type-check, and optimize the graph held by `asset`.
    pub fn load(asset: &MappedAsset, options: &LoadOptions) -> Result<Self, EngineError> {
        let path = asset.path();
        let format = ModelFormat::from_path(path);
        let typed = parse_typed_model(asset.bytes(), format)
            .map_err(|e| EngineError::asset(path, format!("{format:?} graph rejected: {e:#}")))?;
        let signature = declared_signature(&typed)?;
        let input_datum = typed
            .input_fact(0)
            .map(|fact| fact.datum_type)
            .map_err(|e| EngineError::invalid_input(format!("model has no readable input: {e}")))?;

        let plan = match optimized_plan(typed.clone()) {
            Ok(plan) => {
                debug!("model {} optimized successfully", path.display());
                plan
            }
            Err(opt_err) => {
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "model {} failed optimized load ({opt_err}); falling back to decluttered graph.\nError chain:\n{}",
                    path.display(),
                    chain_msg.trim_end()
                );
                decluttered_plan(typed).map_err(|e| {
                    EngineError::asset(
                        path,
                        format!("decluttered graph failed after optimize error {opt_err}: {e}"),
                    )
                })?
            }
        };

        // tract executes on the calling thread; the hint is kept for parity with other runtimes.
        debug!(
            "tract runtime ready for {} (input {:?} {:?}, output {:?}, thread hint {})",
            path.display(),
            signature.input_shape,
            signature.input_type,
            signature.output_shape,
            options.num_threads
        );

        Ok(Self {
            plan,
            signature,
            input_datum,
        })
    }
}

impl Runtime for TractRuntime {
    fn signature(&self) -> &TensorSignature {
        &self.signature
    }

    fn run(&mut self, input: &InputTensor, output: &mut OutputBuffer) -> Result<(), EngineError> {
        let input_datum = self.input_datum;
        let tensor = match input.data() {
            InputData::Float32(values) => Tensor::from_shape(input.shape(), values.as_slice()),
            InputData::UInt8(values) => {
                Tensor::from_shape(input.shape(), values.as_slice()).map(|mut tensor| {
                    if input_datum.is_quantized() {
                        // SAFETY: QU8 stores the same bytes as U8; only the label changes.
                        unsafe { tensor.set_datum_type(input_datum) };
                    }
                    tensor
                })
            }
        }
        .map_err(|e| EngineError::runtime(format!("failed to build input tensor: {e}")))?;

        let outputs = self
            .plan
            .run(tvec![tensor.into()])
            .map_err(|e| EngineError::runtime(format!("inference failed: {e}")))?;
        let first = outputs
            .first()
            .ok_or_else(|| EngineError::runtime("model produced no outputs"))?;
        let values = output_scores(first)?;
        output.fill_from(&values)
    }
}

/// Read an output tensor as `f32`, dequantizing quantized outputs.
fn output_scores(tensor: &Tensor) -> Result<Vec<f32>, EngineError> {
    let datum = tensor.datum_type();
    if !datum.is_quantized() {
        let values = tensor
            .cast_to::<f32>()
            .map_err(|e| EngineError::runtime(format!("output is not convertible to f32: {e}")))?;
        return values
            .as_slice::<f32>()
            .map(<[f32]>::to_vec)
            .map_err(|e| EngineError::runtime(format!("output is not contiguous f32: {e}")));
    }

    let (zero_point, scale) = datum.zp_scale();
    let dequantize = |value: i32| (value - zero_point) as f32 * scale;
    let mut raw = tensor.clone();
    // SAFETY: a quantized tensor stores the same bytes as its unquantized datum type.
    unsafe { raw.set_datum_type(datum.unquantized()) };
    let values = match datum.unquantized() {
        DatumType::U8 => raw
            .as_slice::<u8>()
            .map(|s| s.iter().map(|&v| dequantize(i32::from(v))).collect()),
        DatumType::I8 => raw
            .as_slice::<i8>()
            .map(|s| s.iter().map(|&v| dequantize(i32::from(v))).collect()),
        DatumType::I32 => raw
            .as_slice::<i32>()
            .map(|s| s.iter().map(|&v| dequantize(v)).collect()),
        other => {
            return Err(EngineError::runtime(format!(
                "unsupported quantized output type {other:?}"
            )));
        }
    };
    values.map_err(|e| EngineError::runtime(format!("failed to read quantized output: {e}")))
}

fn parse_typed_model(bytes: &[u8], format: ModelFormat) -> anyhow::Result<TypedModel> {
    let mut reader = bytes;
    match format {
        ModelFormat::Tflite => tract_tflite::tflite().model_for_read(&mut reader),
        ModelFormat::Onnx => pin_symbolic_batch(tract_onnx::onnx().model_for_read(&mut reader)?),
    }
}

/// Type an ONNX graph, fixing a symbolic leading dimension to a batch of 1.
///
/// Graphs with any other symbolic input dimension are typed as-is and rejected later.
fn pin_symbolic_batch(model: InferenceModel) -> anyhow::Result<TypedModel> {
    let typed = model.clone().into_typed()?;
    let fact = typed.input_fact(0)?;
    if fact.shape.as_concrete().is_some() {
        return Ok(typed);
    }
    let datum = fact.datum_type;
    let pinned: Option<Vec<usize>> = fact
        .shape
        .iter()
        .enumerate()
        .map(|(axis, dim)| if axis == 0 { Some(1) } else { dim.to_usize().ok() })
        .collect();
    let Some(dims) = pinned else {
        return Ok(typed);
    };

    debug!("pinning symbolic batch of input {:?} to 1", fact.shape);
    model
        .with_input_fact(0, InferenceFact::dt_shape(datum, dims))?
        .into_typed()
}

fn optimized_plan(model: TypedModel) -> anyhow::Result<RunnablePlan> {
    model
        .into_optimized()
        .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
        .into_runnable()
        .map_err(|e| anyhow::anyhow!("unable to make optimized graph runnable: {e}"))
}

fn decluttered_plan(model: TypedModel) -> anyhow::Result<RunnablePlan> {
    model
        .into_decluttered()
        .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
        .into_runnable()
        .map_err(|e| anyhow::anyhow!("unable to make decluttered graph runnable: {e}"))
}

fn declared_signature(model: &TypedModel) -> Result<TensorSignature, EngineError> {
    let input = model
        .input_fact(0)
        .map_err(|e| EngineError::invalid_input(format!("model has no readable input: {e}")))?;
    let output = model
        .output_fact(0)
        .map_err(|e| EngineError::invalid_output(format!("model has no readable output: {e}")))?;

    let input_shape = input.shape.as_concrete().map(<[usize]>::to_vec).ok_or_else(|| {
        EngineError::invalid_input(format!("input shape {:?} is not fully declared", input.shape))
    })?;
    let output_shape = output.shape.as_concrete().map(<[usize]>::to_vec).ok_or_else(|| {
        EngineError::invalid_output(format!(
            "output shape {:?} is not fully declared",
            output.shape
        ))
    })?;

    Ok(TensorSignature {
        input_shape,
        input_type: declared_type(input.datum_type),
        output_shape,
    })
}

fn declared_type(datum: DatumType) -> DeclaredType {
    match datum {
        DatumType::F32 => DeclaredType::Float32,
        DatumType::U8 | DatumType::QU8(_) => DeclaredType::UInt8,
        other => DeclaredType::Other(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::Builder;
    use tract_onnx::prelude::QParams;

    fn options() -> LoadOptions {
        LoadOptions { num_threads: 4 }
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            ModelFormat::from_path(Path::new("assets/best_float32.tflite")),
            ModelFormat::Tflite
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("models/Handwriting.ONNX")),
            ModelFormat::Onnx
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("models/no_extension")),
            ModelFormat::Tflite
        );
    }

    #[test]
    fn datum_types_map_to_declared_types() {
        assert_eq!(declared_type(DatumType::F32), DeclaredType::Float32);
        assert_eq!(declared_type(DatumType::U8), DeclaredType::UInt8);
        assert_eq!(declared_type(DatumType::QU8(byte_scale())), DeclaredType::UInt8);
        assert!(matches!(declared_type(DatumType::I8), DeclaredType::Other(_)));
        assert!(matches!(
            declared_type(DatumType::QI8(byte_scale())),
            DeclaredType::Other(_)
        ));
    }

    fn byte_scale() -> QParams {
        QParams::ZpScale {
            zero_point: 0,
            scale: 1.0 / 255.0,
        }
    }

    #[test]
    fn quantized_outputs_are_dequantized() {
        let mut tensor = Tensor::from_shape(&[1, 2], &[0u8, 255]).expect("tensor");
        unsafe { tensor.set_datum_type(DatumType::QU8(byte_scale())) };
        let scores = output_scores(&tensor).expect("dequantized");
        assert_eq!(scores.len(), 2);
        assert!(scores[0].abs() < 1e-6);
        assert!((scores[1] - 1.0).abs() < 1e-6);

        let mut shifted = Tensor::from_shape(&[2], &[128u8, 192]).expect("tensor");
        let params = QParams::ZpScale {
            zero_point: 128,
            scale: 0.5,
        };
        unsafe { shifted.set_datum_type(DatumType::QU8(params)) };
        assert_eq!(output_scores(&shifted).expect("dequantized"), vec![0.0, 32.0]);
    }

    #[test]
    fn float_outputs_pass_through() {
        let tensor = Tensor::from_shape(&[1, 2], &[0.25f32, 0.75]).expect("tensor");
        assert_eq!(output_scores(&tensor).expect("scores"), vec![0.25, 0.75]);
    }

    #[test]
    fn corrupt_tflite_asset_produces_useful_error() {
        let mut temp = Builder::new().suffix(".tflite").tempfile().expect("temp file");
        temp.write_all(b"not a real flatbuffer").expect("write mock model");
        let asset = MappedAsset::open(temp.path()).expect("map asset");

        let err = TractBackend
            .load(&asset, &options())
            .err()
            .expect("corrupt model should fail");
        assert_eq!(err.kind(), ErrorKind::Asset);
        assert!(
            err.to_string().contains("Tflite graph rejected"),
            "unexpected error message: {err}"
        );
    }

    #[test]
    fn corrupt_onnx_asset_produces_useful_error() {
        let mut temp = Builder::new().suffix(".onnx").tempfile().expect("temp file");
        temp.write_all(b"not a real onnx file").expect("write mock model");
        let asset = MappedAsset::open(temp.path()).expect("map asset");

        let err = TractBackend
            .load(&asset, &options())
            .err()
            .expect("corrupt model should fail");
        assert_eq!(err.kind(), ErrorKind::Asset);
        assert!(err.to_string().contains("Onnx graph rejected"));
    }
}
