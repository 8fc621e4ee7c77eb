//! Preprocessing utilities for turning decoded images into model input tensors.
//!
//! Images are stretched to the model's declared resolution (no letterboxing or
//! cropping), stripped of alpha, and packed row-major with interleaved RGB channels
//! in whichever element type the model declares.

use image::{DynamicImage, GenericImageView, RgbImage};
use scrawl_utils::{
    config::ResizeQuality, resize_filter, stretch_to_rgb, telemetry::timing_guard,
};

use crate::{
    error::EngineError,
    runtime::InputLayout,
    tensor::{ElementType, InputData, InputTensor},
};

/// Configuration for preprocessing an image before inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Resize filter preference controlling the quality vs speed trade-off.
    pub resize_quality: ResizeQuality,
}

impl From<ResizeQuality> for PreprocessConfig {
    fn from(resize_quality: ResizeQuality) -> Self {
        Self { resize_quality }
    }
}

/// Abstraction over preprocessing implementations.
pub trait Preprocessor: Send + Sync + std::fmt::Debug {
    /// Convert `image` into a tensor matching `layout`.
    fn preprocess(
        &self,
        image: &DynamicImage,
        layout: &InputLayout,
        config: &PreprocessConfig,
    ) -> Result<InputTensor, EngineError>;
}

/// Default CPU implementation backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuPreprocessor;

impl Preprocessor for CpuPreprocessor {
    fn preprocess(
        &self,
        image: &DynamicImage,
        layout: &InputLayout,
        config: &PreprocessConfig,
    ) -> Result<InputTensor, EngineError> {
        pack_input(image, layout, config)
    }
}

/// Resample `image` to the layout's resolution and pack it in the layout's element type.
pub fn pack_input(
    image: &DynamicImage,
    layout: &InputLayout,
    config: &PreprocessConfig,
) -> Result<InputTensor, EngineError> {
    let _guard = timing_guard("scrawl_core::pack_input", log::Level::Trace);
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(EngineError::runtime(format!(
            "source image has zero area ({src_w}x{src_h})"
        )));
    }
    if layout.width == 0 || layout.height == 0 {
        return Err(EngineError::runtime("target dimensions must be non-zero"));
    }

    let resized = stretch_to_rgb(
        image,
        layout.width,
        layout.height,
        resize_filter(config.resize_quality),
    );
    pack_rgb(&resized, layout.element)
}

/// Pack an RGB image pixel by pixel in raster order.
///
/// `Float32` stores each channel divided by 255, `UInt8` stores the raw channel byte.
pub fn pack_rgb(image: &RgbImage, element: ElementType) -> Result<InputTensor, EngineError> {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let pixels = width * height;

    let data = match element {
        ElementType::Float32 => {
            let mut values = Vec::with_capacity(pixels * 3);
            for pixel in image.pixels() {
                let [r, g, b] = pixel.0;
                values.push(f32::from(r) / 255.0);
                values.push(f32::from(g) / 255.0);
                values.push(f32::from(b) / 255.0);
            }
            InputData::Float32(values)
        }
        ElementType::UInt8 => {
            let mut values = Vec::with_capacity(pixels * 3);
            for pixel in image.pixels() {
                values.extend_from_slice(&pixel.0);
            }
            InputData::UInt8(values)
        }
    };

    InputTensor::new(height, width, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba, RgbaImage};

    fn layout(width: u32, height: u32, element: ElementType) -> InputLayout {
        InputLayout {
            batch: 1,
            height,
            width,
            channels: 3,
            element,
        }
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn float_packing_normalizes_solid_color() {
        let image = solid(100, 80, [255, 64, 0]);
        let tensor = pack_input(
            &image,
            &layout(224, 224, ElementType::Float32),
            &PreprocessConfig::default(),
        )
        .expect("pack float");

        let InputData::Float32(values) = tensor.data() else {
            panic!("expected float data");
        };
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!((values[1] - 64.0 / 255.0).abs() < 1e-6);
        assert!(values[2].abs() < 1e-6);
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
    }

    #[test]
    fn byte_packing_keeps_raw_channels() {
        let image = solid(33, 47, [12, 200, 99]);
        let tensor = pack_input(
            &image,
            &layout(64, 64, ElementType::UInt8),
            &PreprocessConfig::default(),
        )
        .expect("pack bytes");

        assert_eq!(&tensor.as_bytes()[0..3], &[12, 200, 99]);
        assert_eq!(tensor.element_type(), ElementType::UInt8);
    }

    #[test]
    fn buffer_size_matches_declared_resolution() {
        let image = solid(100, 80, [255, 0, 0]);
        for side in [224u32, 320, 640] {
            for element in [ElementType::Float32, ElementType::UInt8] {
                let layout = layout(side, side, element);
                let tensor =
                    pack_input(&image, &layout, &PreprocessConfig::default()).expect("pack");
                let expected = side as usize * side as usize * 3 * element.size_in_bytes();
                assert_eq!(tensor.byte_len(), expected, "{side}px {element:?}");
                assert_eq!(tensor.byte_len(), layout.packed_byte_len());
            }
        }
    }

    #[test]
    fn packing_is_row_major_and_pixel_interleaved() {
        let image = ImageBuffer::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, (10 * x + y) as u8]));
        let tensor = pack_rgb(&image, ElementType::UInt8).expect("pack");
        assert_eq!(
            tensor.as_bytes(),
            &[
                0, 0, 0, 1, 0, 10, 2, 0, 20, // row 0
                0, 1, 1, 1, 1, 11, 2, 1, 21, // row 1
            ]
        );
        assert_eq!(tensor.shape(), &[1, 2, 3, 3]);
    }

    #[test]
    fn alpha_channel_is_discarded() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([51, 102, 153, 7]));
        let tensor = pack_input(
            &DynamicImage::ImageRgba8(rgba),
            &layout(4, 4, ElementType::UInt8),
            &PreprocessConfig::default(),
        )
        .expect("pack rgba");
        assert_eq!(tensor.byte_len(), 4 * 4 * 3);
        assert_eq!(&tensor.as_bytes()[0..3], &[51, 102, 153]);
    }

    #[test]
    fn speed_and_quality_agree_on_solid_images() {
        let image = solid(17, 9, [40, 80, 120]);
        let target = layout(32, 32, ElementType::UInt8);
        let quality = pack_input(&image, &target, &ResizeQuality::Quality.into()).unwrap();
        let speed = pack_input(&image, &target, &ResizeQuality::Speed.into()).unwrap();
        assert_eq!(quality.as_bytes(), speed.as_bytes());
    }

    #[test]
    fn zero_area_source_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 5));
        let err = pack_input(
            &image,
            &layout(8, 8, ElementType::Float32),
            &PreprocessConfig::default(),
        )
        .expect_err("empty image");
        assert!(err.to_string().contains("zero area"));
    }

    #[test]
    fn cpu_preprocessor_trait_matches_helper() {
        let image = solid(5, 5, [1, 2, 3]);
        let target = layout(2, 2, ElementType::Float32);
        let config = PreprocessConfig::default();
        let via_trait = CpuPreprocessor.preprocess(&image, &target, &config).unwrap();
        let via_helper = pack_input(&image, &target, &config).unwrap();
        assert_eq!(via_trait, via_helper);
    }
}
