use crate::engines;
use crate::ocr::{OcrSettings, DEFAULT_OCR_SCALE, DEFAULT_OCR_TIMEOUT};
use crate::raster::Preset;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "docproc-server")]
#[command(about = "PDF processing server: structural edits, page rendering and OCR")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "DOCPROC_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "DOCPROC_PORT", default_value = "9393")]
    pub port: u16,

    /// Default language for OCR (e.g., "eng", "deu", "fra")
    #[arg(long, env = "DOCPROC_DEFAULT_LANGUAGE", default_value = "eng")]
    pub default_language: String,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "DOCPROC_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Render scale for OCR (2.0 renders a 612pt wide page at 1224px)
    #[arg(long, env = "DOCPROC_OCR_SCALE", default_value = "2.0")]
    pub ocr_scale: f32,

    /// Seconds before a single page recognition is abandoned
    #[arg(long, env = "DOCPROC_OCR_TIMEOUT_SECS", default_value = "120")]
    pub ocr_timeout_secs: u64,

    /// Image preprocessing before OCR (none, minimal, default, aggressive)
    #[arg(long, env = "DOCPROC_PREPROCESS", default_value = "minimal")]
    pub preprocess: Preset,

    /// OCR engine to use (ocrs, tesseract); first compiled-in engine if unset
    #[arg(long, env = "DOCPROC_ENGINE")]
    pub engine: Option<String>,

    /// Directory for downloaded models
    #[arg(long, env = "DOCPROC_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Path to tessdata directory (uses TESSDATA_PREFIX env var if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_language: String,
    pub max_file_size: usize,
    pub ocr_scale: f32,
    pub ocr_timeout_secs: u64,
    pub preprocess: Preset,
    pub engine: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub tessdata_path: Option<PathBuf>,
}

impl Config {
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(engines::default_cache_dir)
    }

    pub fn ocr_settings(&self) -> OcrSettings {
        OcrSettings {
            scale: self.ocr_scale,
            preset: self.preprocess,
            ..OcrSettings::default()
        }
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9393,
            default_language: "eng".to_string(),
            max_file_size: 50 * 1024 * 1024,
            ocr_scale: DEFAULT_OCR_SCALE,
            ocr_timeout_secs: DEFAULT_OCR_TIMEOUT.as_secs(),
            preprocess: Preset::default(),
            engine: None,
            cache_dir: None,
            tessdata_path: None,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            default_language: args.default_language,
            max_file_size: args.max_file_size,
            ocr_scale: args.ocr_scale,
            ocr_timeout_secs: args.ocr_timeout_secs,
            preprocess: args.preprocess,
            engine: args.engine,
            cache_dir: args.cache_dir,
            tessdata_path: args.tessdata_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults_match_config_default() {
        let config = Config::from(Args::parse_from(["docproc-server"]));
        let default = Config::default();
        assert_eq!(config.port, default.port);
        assert_eq!(config.max_file_size, default.max_file_size);
        assert_eq!(config.ocr_scale, default.ocr_scale);
        assert_eq!(config.ocr_timeout_secs, 120);
        assert_eq!(config.preprocess, Preset::Minimal);
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "docproc-server",
            "--port",
            "8080",
            "--preprocess",
            "aggressive",
            "--ocr-scale",
            "3",
            "--cache-dir",
            "/tmp/models",
        ]);
        let config = Config::from(args);
        assert_eq!(config.port, 8080);
        assert_eq!(config.ocr_settings().preset, Preset::Aggressive);
        assert_eq!(config.ocr_settings().scale, 3.0);
        assert_eq!(config.cache_root(), PathBuf::from("/tmp/models"));
    }
}
