//! Mapping from raw engine output to the stable [`OcrResult`] shape

use super::engine::{EngineOutput, EngineWord};
use serde::Serialize;

/// Bounding box in raster pixel coordinates, origin at the top left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrBlock {
    pub text: String,
    pub confidence: f32,
    pub bounds: Bounds,
}

/// Recognized text of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub text: String,
    /// Overall confidence, 0-100
    pub confidence: f32,
    pub language: String,
    pub page_number: u32,
    pub blocks: Vec<OcrBlock>,
}

/// Map engine output for `page` into an [`OcrResult`].
pub fn aggregate(output: EngineOutput, page: u32, language: &str) -> OcrResult {
    let blocks = output
        .words
        .into_iter()
        .filter(|word| !word.text.trim().is_empty() && word.confidence >= 0.0)
        .map(block)
        .collect::<Vec<_>>();

    let text = match output.text.trim() {
        "" => blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        trimmed => trimmed.to_string(),
    };

    let confidence = output
        .mean_confidence
        .filter(|c| c.is_finite())
        .or_else(|| mean(blocks.iter().map(|b| b.confidence)))
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);

    OcrResult {
        text,
        confidence,
        language: language.to_string(),
        page_number: page,
        blocks,
    }
}

fn block(word: EngineWord) -> OcrBlock {
    OcrBlock {
        text: word.text.trim().to_string(),
        confidence: word.confidence.clamp(0.0, 100.0),
        bounds: Bounds {
            x: word.x,
            y: word.y,
            width: word.width,
            height: word.height,
        },
    }
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f32)
}
