//! One full run: input check → device → models → convert → extract → persist.
//!
//! The input precondition is checked before the loader is touched, so a
//! missing or non-PDF input never pays for model loading. Only the convert
//! step is retried, according to the caller's [`RetryPolicy`].

use crate::config::{PipelineConfig, RetryPolicy};
use crate::converter::DocumentConverter;
use crate::device::{select_device, ComputeDevice};
use crate::document::RenderedDocument;
use crate::error::Doc2MdError;
use crate::input::check_input;
use crate::models::{BuiltinModelLoader, ModelLoader, Placement};
use crate::output::{extract, persist};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub device: ComputeDevice,
    pub placements: Vec<Placement>,
    pub pages: usize,
    pub bytes: usize,
    /// Conversion attempts used (1 unless a retry happened).
    pub attempts: u32,
    pub load_ms: u64,
    pub convert_ms: u64,
    pub total_ms: u64,
}

/// Run the pipeline with the built-in models described by `config.loader`.
pub async fn run(config: &PipelineConfig) -> Result<RunReport, Doc2MdError> {
    let loader = BuiltinModelLoader::new(config.loader.clone());
    run_with_loader(config, &loader).await
}

/// Run the pipeline with models from `loader`.
pub async fn run_with_loader(
    config: &PipelineConfig,
    loader: &dyn ModelLoader,
) -> Result<RunReport, Doc2MdError> {
    let start = Instant::now();
    check_input(&config.input)?;

    let device = match config.device {
        Some(device) => {
            info!("Using requested device: {}", device);
            device
        }
        None => select_device(),
    };

    let load_start = Instant::now();
    let registry = loader.load(device)?;
    let load_ms = load_start.elapsed().as_millis() as u64;
    info!("Models loaded in {}ms", load_ms);

    let placements: Vec<Placement> = registry.placements().cloned().collect();
    let converter = DocumentConverter::new(registry, config.options.clone());

    let convert_start = Instant::now();
    let (rendered, attempts) = convert_with_retry(&converter, &config.input, config.retry).await?;
    let convert_ms = convert_start.elapsed().as_millis() as u64;

    let artifact = extract(&rendered)?;
    let output_path = persist(
        &artifact.text,
        &config.output_dir,
        &config.input,
        artifact.format,
    )?;

    Ok(RunReport {
        output_path,
        device,
        placements,
        pages: rendered.metadata.document.page_count,
        bytes: artifact.text.len(),
        attempts,
        load_ms,
        convert_ms,
        total_ms: start.elapsed().as_millis() as u64,
    })
}

/// Blocking variant of [`run`] on its own tokio runtime.
pub fn run_blocking(config: &PipelineConfig) -> Result<RunReport, Doc2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(run(config))
}

async fn convert_with_retry(
    converter: &DocumentConverter,
    input: &Path,
    retry: RetryPolicy,
) -> Result<(RenderedDocument, u32), Doc2MdError> {
    let max = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match converter.convert(input).await {
            Ok(rendered) => return Ok((rendered, attempt)),
            Err(e @ Doc2MdError::ConversionFailure { .. }) if attempt < max => {
                attempt += 1;
                let delay = retry.backoff(attempt);
                warn!(
                    "{} (attempt {}/{}); retrying in {:?}",
                    e,
                    attempt - 1,
                    max,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
