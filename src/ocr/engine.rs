use crate::error::OcrError;
use crate::raster::PageRaster;

/// Page segmentation the engine is asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Segmentation {
    /// Treat the page as a single uniform block of text
    #[default]
    SingleBlock,
    /// Let the engine analyse the layout
    Auto,
}

/// Recognition network the engine is asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    LstmOnly,
    Legacy,
}

/// Operating mode applied when an engine is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineMode {
    pub segmentation: Segmentation,
    pub network: Network,
}

/// A recognized word as the engine reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineWord {
    pub text: String,
    /// Engine confidence, 0-100. Negative means the engine produced no word.
    pub confidence: f32,
    /// Bounding box in raster pixels
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Native output of one recognition pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub text: String,
    /// Page-level mean confidence, when the engine reports one
    pub mean_confidence: Option<f32>,
    pub words: Vec<EngineWord>,
}

/// A live recognition engine bound to one language.
pub trait RecognitionEngine: Send {
    fn language(&self) -> &str;

    /// Recognize the text in a rendered page.
    fn recognize(&mut self, raster: &PageRaster) -> Result<EngineOutput, OcrError>;

    /// Release the engine's resources. Called exactly once before the engine is dropped
    /// by the worker manager.
    fn shutdown(self: Box<Self>) {}
}

/// Allocates recognition engines.
pub trait EngineFactory: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs", "tesseract")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Language codes this engine can be allocated for
    fn supported_languages(&self) -> Vec<String>;

    fn supports_language(&self, code: &str) -> bool {
        self.supported_languages().iter().any(|l| l == code)
    }

    /// Allocate a new engine for `language`.
    fn allocate(
        &self,
        language: &str,
        mode: EngineMode,
    ) -> Result<Box<dyn RecognitionEngine>, OcrError>;
}
