//! Recognition engine backends
//!
//! Each backend provides an [`EngineFactory`]. Backends are conditionally
//! compiled based on feature flags; [`select`] picks the one the server runs.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-leptess")]
pub mod tesseract;

use crate::config::Config;
use crate::error::OcrError;
use crate::ocr::EngineFactory;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cache directory used when none is configured.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docproc")
}

/// Every backend compiled into this build, in preference order.
#[cfg_attr(
    not(any(feature = "engine-ocrs", feature = "engine-leptess")),
    allow(unused_variables, unused_mut)
)]
pub fn available(config: &Config) -> Vec<Arc<dyn EngineFactory>> {
    let cache_root = config.cache_root();
    let mut factories: Vec<Arc<dyn EngineFactory>> = Vec::new();

    #[cfg(feature = "engine-ocrs")]
    factories.push(Arc::new(ocrs::OcrsFactory::new(cache_root.join("models"))));

    #[cfg(feature = "engine-leptess")]
    factories.push(Arc::new(tesseract::TesseractFactory::new(
        config
            .tessdata_path
            .clone()
            .unwrap_or_else(|| cache_root.join("tessdata")),
    )));

    factories
}

/// The configured backend, or the first available one.
pub fn select(config: &Config) -> Result<Arc<dyn EngineFactory>, OcrError> {
    let factories = available(config);

    let chosen = match config.engine.as_deref() {
        Some(name) => factories.into_iter().find(|f| f.name() == name).ok_or_else(|| {
            OcrError::Initialization(format!("OCR engine '{}' is not compiled in", name))
        })?,
        None => factories.into_iter().next().ok_or_else(|| {
            OcrError::Initialization(
                "No OCR engines available. Build with --features engine-ocrs or --features engine-leptess"
                    .to_string(),
            )
        })?,
    };

    tracing::info!("Using {} OCR engine", chosen.name());
    Ok(chosen)
}

/// Path of `filename` inside `dir`, downloading it from `url` first if it is
/// not there yet.
pub(crate) fn ensure_cached(dir: &Path, filename: &str, url: &str) -> Result<PathBuf, OcrError> {
    let path = dir.join(filename);
    if path.exists() {
        tracing::debug!("Using cached {}", path.display());
        return Ok(path);
    }

    fs::create_dir_all(dir).map_err(|e| {
        OcrError::Initialization(format!(
            "Failed to create cache directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    tracing::info!("Downloading {} from {}", filename, url);
    let bytes = download(url)?;

    // An interrupted download leaves only the .partial file behind
    let partial = dir.join(format!("{}.partial", filename));
    fs::write(&partial, &bytes)
        .and_then(|_| fs::rename(&partial, &path))
        .map_err(|e| {
            OcrError::Initialization(format!("Failed to write {}: {}", path.display(), e))
        })?;

    tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

fn download(url: &str) -> Result<Vec<u8>, OcrError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| OcrError::Initialization(format!("Failed to download {}: {}", url, e)))?;

    response
        .into_body()
        .read_to_vec()
        .map_err(|e| OcrError::Initialization(format!("Failed to read {}: {}", url, e)))
}
