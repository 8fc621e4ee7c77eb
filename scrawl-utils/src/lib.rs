//! Common helpers shared across scrawl crates.

/// Application configuration and settings management.
pub mod config;
/// Image loading and resampling.
pub mod image_utils;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use config::{AppSettings, ModelSettings, ResizeQuality, TelemetrySettings};
pub use image_utils::{load_image, resize_filter, stretch_to_rgb};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};

/// Initialize logging once for the CLI and embedding applications.
///
/// `RUST_LOG` wins when it is set; otherwise `default_filter` is used.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_rejects_missing_paths() {
        let err = normalize_path("no/such/dir").expect_err("missing path");
        assert!(format!("{err}").contains("path does not exist"));
    }

    #[test]
    fn normalize_path_canonicalizes_existing_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolved = normalize_path(dir.path()).expect("existing dir");
        assert!(resolved.is_absolute());
    }
}
