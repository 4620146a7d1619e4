//! Lifecycle of the single recognition engine
//!
//! The engine is a heavyweight resource, so at most one is ever live. The
//! manager owns it behind a mutex and is the only place where the requested
//! language is compared with the active one.

use super::aggregate::{aggregate, OcrResult};
use super::engine::{EngineFactory, EngineMode, RecognitionEngine};
use super::languages;
use crate::document::DocumentHandle;
use crate::error::OcrError;
use crate::raster::{self, Preset};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Default raster scale for recognition.
pub const DEFAULT_OCR_SCALE: f32 = 2.0;

/// Snapshot of the worker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "language", rename_all = "camelCase")]
pub enum OcrWorkerState {
    Uninitialized,
    Ready(String),
    Terminated,
}

impl fmt::Display for OcrWorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Ready(language) => write!(f, "ready({})", language),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

/// How pages are prepared for, and handed to, the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcrSettings {
    pub scale: f32,
    pub preset: Preset,
    pub mode: EngineMode,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            scale: DEFAULT_OCR_SCALE,
            preset: Preset::default(),
            mode: EngineMode::default(),
        }
    }
}

enum Slot {
    Uninitialized,
    Ready {
        language: String,
        engine: Box<dyn RecognitionEngine>,
    },
    Terminated,
}

impl Slot {
    fn state(&self) -> OcrWorkerState {
        match self {
            Slot::Uninitialized => OcrWorkerState::Uninitialized,
            Slot::Ready { language, .. } => OcrWorkerState::Ready(language.clone()),
            Slot::Terminated => OcrWorkerState::Terminated,
        }
    }
}

/// Owns the recognition engine and serializes every call into it.
pub struct OcrWorkerManager {
    factory: Arc<dyn EngineFactory>,
    settings: OcrSettings,
    slot: Mutex<Slot>,
}

impl OcrWorkerManager {
    pub fn new(factory: Arc<dyn EngineFactory>, settings: OcrSettings) -> Self {
        Self {
            factory,
            settings,
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    pub fn state(&self) -> OcrWorkerState {
        self.slot.lock().state()
    }

    pub fn settings(&self) -> &OcrSettings {
        &self.settings
    }

    pub fn engine_name(&self) -> &'static str {
        self.factory.name()
    }

    pub fn engine_description(&self) -> &'static str {
        self.factory.description()
    }

    pub fn engine_languages(&self) -> Vec<String> {
        self.factory.supported_languages()
    }

    /// Make the worker ready for `language`, allocating or switching engines as needed.
    pub fn ensure_ready(&self, language: &str) -> Result<(), OcrError> {
        self.check_language(language)?;
        let mut slot = self.slot.lock();
        self.ensure_ready_locked(&mut slot, language)
    }

    /// Recognize one page (1-indexed) of `doc`.
    #[instrument(skip(self, doc), fields(engine = self.factory.name()))]
    pub fn recognize_page(
        &self,
        doc: &DocumentHandle,
        page: u32,
        language: &str,
    ) -> Result<OcrResult, OcrError> {
        self.check_language(language)?;

        let mut slot = self.slot.lock();
        self.ensure_ready_locked(&mut slot, language)?;

        let raster = raster::rasterize(doc, page, self.settings.scale)?
            .preprocess(self.settings.preset);

        let Slot::Ready { engine, .. } = &mut *slot else {
            return Err(OcrError::EngineFailure(
                "Engine not available after initialization".to_string(),
            ));
        };

        let start = Instant::now();
        let output = engine.recognize(&raster).map_err(|e| match e {
            OcrError::EngineFailure(_) => e,
            other => OcrError::EngineFailure(other.to_string()),
        })?;

        let result = aggregate(output, page, language);
        tracing::info!(
            "Recognized page {} ({}): {} chars, {} blocks, confidence {:.1} in {}ms",
            page,
            language,
            result.text.len(),
            result.blocks.len(),
            result.confidence,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Release the engine, if any, and move to `Terminated`. Idempotent.
    pub fn terminate(&self) {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Terminated) {
            Slot::Ready { language, engine } => {
                tracing::info!("Terminating {} engine ({})", self.factory.name(), language);
                engine.shutdown();
            }
            _ => tracing::debug!("Terminate requested with no live engine"),
        }
    }

    fn check_language(&self, language: &str) -> Result<(), OcrError> {
        if !languages::is_supported(language) || !self.factory.supports_language(language) {
            return Err(OcrError::UnsupportedLanguage(language.to_string()));
        }
        Ok(())
    }

    fn ensure_ready_locked(&self, slot: &mut Slot, language: &str) -> Result<(), OcrError> {
        if let Slot::Ready { language: active, .. } = slot {
            if active.as_str() == language {
                return Ok(());
            }
        }

        let previous = std::mem::replace(slot, Slot::Uninitialized);
        let restore = match previous {
            Slot::Ready {
                language: active,
                engine,
            } => {
                tracing::info!("Switching OCR language from {} to {}", active, language);
                engine.shutdown();
                Slot::Uninitialized
            }
            other => other,
        };

        let start = Instant::now();
        match self.factory.allocate(language, self.settings.mode) {
            Ok(engine) => {
                tracing::info!(
                    "{} engine ready for {} in {}ms",
                    self.factory.name(),
                    language,
                    start.elapsed().as_millis()
                );
                *slot = Slot::Ready {
                    language: language.to_string(),
                    engine,
                };
                Ok(())
            }
            Err(e) => {
                *slot = restore;
                let err = match e {
                    OcrError::Initialization(_) | OcrError::UnsupportedLanguage(_) => e,
                    other => OcrError::Initialization(other.to_string()),
                };
                tracing::error!("Failed to initialize OCR engine for {}: {}", language, err);
                Err(err)
            }
        }
    }
}

impl fmt::Debug for OcrWorkerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrWorkerManager")
            .field("engine", &self.factory.name())
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}
