//! Page-level text recognition
//!
//! [`OcrWorkerManager`] owns the one live recognition engine; [`OcrService`]
//! exposes it to async callers with a timeout.

pub mod aggregate;
pub mod engine;
pub mod languages;
pub mod manager;
pub mod service;

pub use aggregate::{aggregate, Bounds, OcrBlock, OcrResult};
pub use engine::{EngineFactory, EngineMode, EngineOutput, EngineWord, RecognitionEngine};
pub use languages::{supported_languages, Language};
pub use manager::{OcrSettings, OcrWorkerManager, OcrWorkerState, DEFAULT_OCR_SCALE};
pub use service::{OcrService, DEFAULT_OCR_TIMEOUT};
