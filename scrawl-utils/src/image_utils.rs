use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage, imageops::FilterType};

use crate::config::ResizeQuality;

/// Load an image from disk into memory.
///
/// # Arguments
///
/// * `path` - The path to the image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Map a resize preference onto the `image` crate filter.
pub fn resize_filter(quality: ResizeQuality) -> FilterType {
    match quality {
        ResizeQuality::Quality => FilterType::Triangle,
        ResizeQuality::Speed => FilterType::Nearest,
    }
}

/// Stretch an image to exactly `width` x `height` and drop any alpha channel.
///
/// The aspect ratio of the source is not preserved: no letterboxing or cropping
/// takes place. When the source already has the requested size it is only
/// converted to 8-bit RGB.
pub fn stretch_to_rgb(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    if image.width() == width && image.height() == height {
        return image.to_rgb8();
    }
    image.resize_exact(width, height, filter).to_rgb8()
}
