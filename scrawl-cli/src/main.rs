mod args;
mod config;
mod input;
mod types;

use std::{
    fs::{self, File},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use scrawl_core::{
    ClassificationResult, ClassificationWorker, EngineConfig, InferenceEngine,
    PendingClassification,
};
use scrawl_utils::{init_logging, load_image, normalize_path};

use crate::{
    args::ClassifyArgs,
    config::{apply_cli_overrides, load_settings},
    input::collect_images,
    types::{ClassificationRecord, INPUT_ERROR, TIMEOUT_ERROR},
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = ClassifyArgs::parse();

    let input_path = normalize_path(&args.input)?;
    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    settings.telemetry.apply();

    let images = collect_images(&input_path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: jpg, jpeg, png, bmp, webp)",
            input_path.display()
        );
    }

    let engine_config = EngineConfig::from(&settings);
    info!(
        "scrawl-core {}: using model {} ({} thread hint, {} resize)",
        scrawl_core::version(),
        engine_config.model_path.display(),
        engine_config.num_threads,
        engine_config.preprocess.resize_quality
    );
    let worker = ClassificationWorker::spawn(InferenceEngine::new(engine_config))
        .context("failed to start classification worker")?;
    let timeout = args.timeout_ms.map(Duration::from_millis);

    info!("Processing {} image(s)...", images.len());
    let mut records = Vec::with_capacity(images.len());
    for image_path in images {
        let image = match load_image(&image_path) {
            Ok(image) => image,
            Err(err) => {
                warn!("Failed to read {}: {err:#}", image_path.display());
                records.push(ClassificationRecord::failed(
                    &image_path,
                    args.source,
                    INPUT_ERROR,
                    format!("{err:#}"),
                ));
                continue;
            }
        };

        let record = match await_result(worker.submit(image), timeout) {
            Some(result) => ClassificationRecord::from_result(&image_path, args.source, &result),
            None => ClassificationRecord::failed(
                &image_path,
                args.source,
                TIMEOUT_ERROR,
                format!(
                    "no answer within {} ms",
                    timeout.map(|t| t.as_millis()).unwrap_or_default()
                ),
            ),
        };
        match record.error.as_deref() {
            None => info!(
                "{} -> risk {}% ({}), detected: {}",
                image_path.display(),
                record.percentage,
                record.risk_level.as_label(),
                record.detected
            ),
            Some(message) => warn!("Failed to classify {}: {message}", image_path.display()),
        }
        records.push(record);
    }
    drop(worker);

    if let Some(json_path) = args.json.as_ref() {
        if let Some(dir) = json_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &records).with_context(|| {
            format!("failed to write classification JSON to {}", json_path.display())
        })?;
        info!("Wrote classifications to {}", json_path.display());
    } else {
        let json =
            serde_json::to_string_pretty(&records).context("failed to serialize classifications")?;
        println!("{json}");
    }

    if !records.iter().any(ClassificationRecord::is_success) {
        anyhow::bail!("all classifications failed");
    }
    Ok(())
}

fn await_result(
    pending: PendingClassification,
    timeout: Option<Duration>,
) -> Option<ClassificationResult> {
    match timeout {
        Some(limit) => pending.wait_timeout(limit),
        None => Some(pending.wait()),
    }
}
