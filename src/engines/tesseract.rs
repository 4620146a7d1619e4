//! Tesseract backend
//!
//! Uses the statically linked Tesseract library. Language data is downloaded
//! per language on allocation unless already present in the tessdata directory.

use super::ensure_cached;
use crate::error::OcrError;
use crate::ocr::engine::{Network, Segmentation};
use crate::ocr::{EngineFactory, EngineMode, EngineOutput, EngineWord, RecognitionEngine};
use crate::raster::PageRaster;
use std::io::Cursor;
use std::path::PathBuf;
use tesseract_static::tesseract::{OcrEngineMode, PageSegMode, Tesseract};

/// Fast LSTM models from the tesseract-ocr project
const TESSDATA_URL: &str = "https://github.com/tesseract-ocr/tessdata_fast/raw/main";

/// TSV row level of a single word
const WORD_LEVEL: u32 = 5;

pub struct TesseractFactory {
    tessdata: PathBuf,
}

impl TesseractFactory {
    pub fn new(tessdata: PathBuf) -> Self {
        Self { tessdata }
    }
}

impl EngineFactory for TesseractFactory {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - better for noisy/messy scans, many languages"
    }

    fn supported_languages(&self) -> Vec<String> {
        [
            "eng", "deu", "fra", "spa", "ita", "por", "nld", "pol", "rus", "ara", "hin", "jpn",
            "kor", "chi_sim", "chi_tra",
        ]
        .iter()
        .map(|code| code.to_string())
        .collect()
    }

    fn allocate(
        &self,
        language: &str,
        mode: EngineMode,
    ) -> Result<Box<dyn RecognitionEngine>, OcrError> {
        if !self.supports_language(language) {
            return Err(OcrError::UnsupportedLanguage(language.to_string()));
        }

        let filename = format!("{}.traineddata", language);
        let url = format!("{}/{}", TESSDATA_URL, filename);
        ensure_cached(&self.tessdata, &filename, &url)?;

        let engine = TesseractEngine {
            datapath: self.tessdata.to_string_lossy().into_owned(),
            language: language.to_string(),
            mode,
        };

        // Fails fast on unreadable language data
        engine.instance().map_err(|e| match e {
            OcrError::EngineFailure(reason) => OcrError::Initialization(reason),
            other => other,
        })?;

        tracing::info!(
            "Tesseract ready (tessdata: {}, language: {}, mode: {:?})",
            engine.datapath,
            language,
            mode
        );
        Ok(Box::new(engine))
    }
}

/// Validated language data plus mode.
///
/// A Tesseract handle is consumed by each recognition step, so a fresh one is
/// created for every page.
pub struct TesseractEngine {
    datapath: String,
    language: String,
    mode: EngineMode,
}

impl TesseractEngine {
    fn instance(&self) -> Result<Tesseract, OcrError> {
        let oem = match self.mode.network {
            Network::LstmOnly => OcrEngineMode::LstmOnly,
            Network::Legacy => OcrEngineMode::TesseractOnly,
        };
        let mut tess = Tesseract::new_with_oem(Some(&self.datapath), Some(&self.language), oem)
            .map_err(|e| {
                OcrError::EngineFailure(format!("Failed to create Tesseract: {}", e))
            })?;

        tess.set_page_seg_mode(match self.mode.segmentation {
            Segmentation::SingleBlock => PageSegMode::PsmSingleBlock,
            Segmentation::Auto => PageSegMode::PsmAuto,
        });
        Ok(tess)
    }
}

impl RecognitionEngine for TesseractEngine {
    fn language(&self) -> &str {
        &self.language
    }

    fn recognize(&mut self, raster: &PageRaster) -> Result<EngineOutput, OcrError> {
        // BMP is always readable by leptonica
        let rgb = raster.image().to_rgb8();
        let mut bmp = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut bmp), image::ImageFormat::Bmp)
            .map_err(|e| OcrError::EngineFailure(format!("Failed to encode page: {}", e)))?;

        tracing::debug!(
            "Tesseract input: {}x{}, {} bytes",
            rgb.width(),
            rgb.height(),
            bmp.len()
        );

        let mut tess = self
            .instance()?
            .set_image_from_mem(&bmp)
            .map_err(|e| OcrError::EngineFailure(format!("Failed to set image: {}", e)))?
            .recognize()
            .map_err(|e| OcrError::EngineFailure(format!("Failed to recognize text: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| OcrError::EngineFailure(format!("Failed to get text: {}", e)))?;
        let mean_confidence = tess.mean_text_conf();
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| OcrError::EngineFailure(format!("Failed to get word boxes: {}", e)))?;

        Ok(EngineOutput {
            text,
            mean_confidence: (mean_confidence >= 0).then_some(mean_confidence as f32),
            words: parse_tsv_words(&tsv),
        })
    }
}

/// Word rows of Tesseract TSV output.
///
/// Columns: level, page, block, paragraph, line, word, left, top, width,
/// height, conf, text. An optional header row is skipped.
fn parse_tsv_words(tsv: &str) -> Vec<EngineWord> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0].parse::<u32>().ok()? != WORD_LEVEL {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            Some(EngineWord {
                text: text.to_string(),
                confidence: cols[10].trim().parse().ok()?,
                x: cols[6].parse().ok()?,
                y: cols[7].parse().ok()?,
                width: cols[8].parse().ok()?,
                height: cols[9].parse().ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t400\t100\t-1\t
4\t1\t1\t1\t1\t0\t10\t20\t300\t30\t-1\t
5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t96.5\tSample
5\t1\t1\t1\t1\t2\t100\t20\t50\t30\t91.25\tOCR
5\t1\t1\t1\t1\t3\t160\t20\t60\t30\t-1\t
5\t1\t1\t1\t1\t4\t230\t20\t60\t30\t88\ttext";

    #[test]
    fn test_parse_tsv_keeps_word_rows() {
        let words = parse_tsv_words(TSV);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, ["Sample", "OCR", "text"]);
        assert_eq!(words[1].confidence, 91.25);
        assert_eq!(words[2].x, 230.0);
        assert_eq!(words[0].height, 30.0);
    }

    #[test]
    fn test_parse_tsv_ignores_short_rows() {
        assert!(parse_tsv_words("5\t1\t1\n\n").is_empty());
    }

    #[test]
    fn test_factory_rejects_uncatalogued_language() {
        let factory = TesseractFactory::new(std::env::temp_dir());
        assert!(factory.supports_language("chi_sim"));
        assert!(matches!(
            factory.allocate("tlh", EngineMode::default()),
            Err(OcrError::UnsupportedLanguage(_))
        ));
    }
}
