//! Command-line argument definitions for scrawl-cli.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use scrawl_utils::config::ResizeQuality;
use serde::Serialize;

/// Classify handwriting images for dyslexia risk.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct ClassifyArgs {
    /// Path to an image file or a directory containing images.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Model asset to load (`.tflite` or `.onnx`). Defaults to the bundled asset from settings.
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/scrawl.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Thread-count hint for the inference runtime.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Resampling filter used when stretching images to the model resolution.
    #[arg(long, value_parser = parse_resize_quality)]
    pub resize_quality: Option<ResizeQuality>,

    /// Give up waiting on an image after this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// How the images were obtained.
    #[arg(long, value_enum, default_value_t = ImageSource::Gallery)]
    pub source: ImageSource,

    /// Write records to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

/// Origin tag stored with each classification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Camera,
    Gallery,
}

fn parse_resize_quality(value: &str) -> Result<ResizeQuality, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_invocation_uses_defaults() {
        let args = ClassifyArgs::try_parse_from(["scrawl-cli", "--input", "page.png"]).unwrap();
        assert_eq!(args.input, PathBuf::from("page.png"));
        assert!(args.model.is_none());
        assert_eq!(args.source, ImageSource::Gallery);
        assert!(!args.telemetry);
    }

    #[test]
    fn overrides_are_parsed() {
        let args = ClassifyArgs::try_parse_from([
            "scrawl-cli",
            "-i",
            "scans",
            "-m",
            "models/handwriting.onnx",
            "--threads",
            "2",
            "--resize-quality",
            "speed",
            "--timeout-ms",
            "1500",
            "--source",
            "camera",
        ])
        .unwrap();
        assert_eq!(args.model, Some(PathBuf::from("models/handwriting.onnx")));
        assert_eq!(args.threads, Some(2));
        assert_eq!(args.resize_quality, Some(ResizeQuality::Speed));
        assert_eq!(args.timeout_ms, Some(1500));
        assert_eq!(args.source, ImageSource::Camera);
    }

    #[test]
    fn input_is_required() {
        assert!(ClassifyArgs::try_parse_from(["scrawl-cli"]).is_err());
    }

    #[test]
    fn bad_resize_quality_is_rejected() {
        let err = ClassifyArgs::try_parse_from([
            "scrawl-cli",
            "-i",
            "x.png",
            "--resize-quality",
            "fancy",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("invalid resize quality"));
    }
}
