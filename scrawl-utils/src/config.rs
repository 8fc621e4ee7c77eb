//! Shared configuration types consumed across the scrawl workspace.
//!
//! Settings describe where the bundled model asset lives, how the engine should
//! resample input images, and whether timing telemetry is emitted. They can be
//! serialized to JSON and reused by the CLI and any embedding application.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// File name of the model bundled with the application.
pub const DEFAULT_MODEL_ASSET: &str = "best_float32.tflite";
/// Directory holding read-only bundled assets, relative to the working directory.
pub const DEFAULT_ASSET_DIR: &str = "assets";
/// Thread-count hint handed to the inference runtime.
pub const DEFAULT_NUM_THREADS: usize = 4;

/// Resampling filter preference used when stretching images to the model resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Interpolated (bilinear) resampling.
    #[default]
    Quality,
    /// Nearest-neighbour resampling.
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Location of the bundled model and runtime hints for loading it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory that plays the role of the application's asset bundle.
    pub asset_dir: PathBuf,
    /// Name of the model asset inside `asset_dir`.
    pub asset_name: String,
    /// Explicit model path. Takes precedence over `asset_dir`/`asset_name` when set.
    pub model_path: Option<PathBuf>,
    /// Thread-count hint for the inference runtime.
    pub num_threads: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            asset_name: DEFAULT_MODEL_ASSET.to_string(),
            model_path: None,
            num_threads: DEFAULT_NUM_THREADS,
        }
    }
}

impl ModelSettings {
    /// Resolve the file the engine should map.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.model_path {
            Some(path) => path.clone(),
            None => self.asset_dir.join(&self.asset_name),
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }

    /// Push these settings into the global telemetry switches.
    pub fn apply(&self) {
        crate::telemetry::configure(self.enabled, self.level_filter());
    }
}

/// Persistent settings consumed by the CLI and embedding applications.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    /// Model asset location and runtime hints.
    pub model: ModelSettings,
    /// Resampling filter preference.
    pub resize_quality: ResizeQuality,
    /// Telemetry and diagnostics preferences.
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file. Missing fields fall back to defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;

        if settings.model.num_threads == 0 {
            settings.model.num_threads = DEFAULT_NUM_THREADS;
        }

        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

/// Returns the default path for persisted settings (`config/scrawl.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/scrawl.json"))
        .unwrap_or_else(|_| PathBuf::from("config/scrawl.json"))
}
