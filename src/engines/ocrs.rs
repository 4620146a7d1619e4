//! ocrs backend
//!
//! Pure Rust recognition with the ocrs library. No system dependencies
//! required; the detection and recognition models are downloaded into the
//! cache on first allocation.

use super::ensure_cached;
use crate::error::OcrError;
use crate::ocr::{EngineFactory, EngineMode, EngineOutput, EngineWord, RecognitionEngine};
use crate::raster::PageRaster;
use ocrs::{DecodeMethod, ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use std::path::PathBuf;

const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

pub struct OcrsFactory {
    model_dir: PathBuf,
}

impl OcrsFactory {
    pub fn new(model_dir: PathBuf) -> Self {
        Self { model_dir }
    }

    fn load_model(&self, url: &str, filename: &str) -> Result<Model, OcrError> {
        let path = ensure_cached(&self.model_dir, filename, url)?;
        Model::load_file(&path).map_err(|e| {
            OcrError::Initialization(format!("Failed to load {}: {}", path.display(), e))
        })
    }
}

impl EngineFactory for OcrsFactory {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    fn supported_languages(&self) -> Vec<String> {
        // ocrs models only cover the Latin alphabet
        vec!["eng".to_string()]
    }

    fn allocate(
        &self,
        language: &str,
        mode: EngineMode,
    ) -> Result<Box<dyn RecognitionEngine>, OcrError> {
        if !self.supports_language(language) {
            return Err(OcrError::UnsupportedLanguage(language.to_string()));
        }
        tracing::debug!("ocrs finds its own layout; ignoring {:?}", mode);

        let detection_model = self.load_model(DETECTION_MODEL_URL, "text-detection.rten")?;
        let recognition_model = self.load_model(RECOGNITION_MODEL_URL, "text-recognition.rten")?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| OcrError::Initialization(format!("Failed to create ocrs engine: {}", e)))?;

        Ok(Box::new(OcrsEngine {
            engine,
            language: language.to_string(),
        }))
    }
}

pub struct OcrsEngine {
    engine: OcrEngine,
    language: String,
}

impl RecognitionEngine for OcrsEngine {
    fn language(&self) -> &str {
        &self.language
    }

    fn recognize(&mut self, raster: &PageRaster) -> Result<EngineOutput, OcrError> {
        let rgb = raster.image().to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| failure("create image source", e))?;

        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| failure("prepare input", e))?;
        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|e| failure("detect words", e))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| failure("recognize text", e))?;

        let mut boxes = Vec::new();
        let mut text_lines = Vec::new();
        for line in lines.iter().flatten() {
            let mut words = Vec::new();
            for word in line.words() {
                let text = word.to_string();
                let rect = word.bounding_rect();
                boxes.push((
                    text.clone(),
                    rect.left() as f32,
                    rect.top() as f32,
                    rect.width() as f32,
                    rect.height() as f32,
                ));
                words.push(text);
            }
            text_lines.push(words.join(" "));
        }

        let text = text_lines.join("\n");
        // ocrs reports no per-word scores, so every word carries the page score
        let confidence = text_quality(&text);
        let words = boxes
            .into_iter()
            .map(|(text, x, y, width, height)| EngineWord {
                text,
                confidence,
                x,
                y,
                width,
                height,
            })
            .collect();

        Ok(EngineOutput {
            text,
            mean_confidence: Some(confidence),
            words,
        })
    }

    fn shutdown(self: Box<Self>) {
        tracing::debug!("Releasing ocrs models ({})", self.language);
    }
}

fn failure(step: &str, e: impl std::fmt::Display) -> OcrError {
    OcrError::EngineFailure(format!("Failed to {}: {}", step, e))
}

/// Plausibility of recognized text as a 0-100 score.
///
/// Garbled recognition tends to show up as symbol soup, fragmented or
/// run-together words, odd spacing and long runs of one character.
fn text_quality(text: &str) -> f32 {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return 0.0;
    }
    if chars.len() < 5 {
        return 50.0;
    }

    let score = 0.40 * character_mix(&chars)
        + 0.30 * word_shape(text)
        + 0.15 * spacing(&chars)
        + 0.15 * run_length(&chars);

    (score * 100.0).clamp(0.0, 100.0)
}

fn character_mix(chars: &[char]) -> f32 {
    let total = chars.len() as f32;
    let letters = chars.iter().filter(|c| c.is_alphabetic()).count() as f32;
    let symbols = chars
        .iter()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_ascii_punctuation())
        .count() as f32;

    let symbol_score = 1.0 - (symbols / total * 10.0).min(1.0);
    let letter_score = (letters / total * 1.5).min(1.0);
    0.6 * symbol_score + 0.4 * letter_score
}

fn word_shape(text: &str) -> f32 {
    let lengths: Vec<usize> = text.split_whitespace().map(|w| w.chars().count()).collect();
    if lengths.is_empty() {
        return 0.5;
    }

    let count = lengths.len() as f32;
    let average = lengths.iter().sum::<usize>() as f32 / count;
    let average_score = if average < 2.0 {
        0.3
    } else if average < 4.0 {
        0.7
    } else if average < 9.0 {
        1.0
    } else if average < 13.0 {
        0.8
    } else {
        0.4
    };

    let singles = lengths.iter().filter(|&&len| len == 1).count() as f32;
    average_score * (1.0 - (singles / count * 1.5).min(0.5))
}

fn spacing(chars: &[char]) -> f32 {
    let percent = chars.iter().filter(|c| c.is_whitespace()).count() as f32 * 100.0
        / chars.len() as f32;

    match percent {
        p if p < 6.0 => 0.5,
        p if p < 11.0 => 0.8,
        p if p < 26.0 => 1.0,
        p if p < 41.0 => 0.7,
        _ => 0.3,
    }
}

fn run_length(chars: &[char]) -> f32 {
    let mut longest = 1;
    let mut current = 1;
    for pair in chars.windows(2) {
        if pair[0] == pair[1] && !pair[1].is_whitespace() {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 1;
        }
    }

    match longest {
        1..=3 => 1.0,
        4..=5 => 0.8,
        6..=10 => 0.5,
        _ => 0.2,
    }
}
