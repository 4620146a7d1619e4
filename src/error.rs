use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Malformed or inaccessible input bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer is empty")]
    Empty,

    #[error("Buffer too small: {len} bytes (min: {min} bytes)")]
    TooSmall { len: usize, min: usize },

    #[error("Buffer too large: {len} bytes (max: {max} bytes)")]
    TooLarge { len: usize, max: usize },

    #[error("Missing %PDF- header")]
    HeaderMismatch,

    #[error("No %%EOF marker near end of buffer")]
    MissingEof,

    #[error("Failed to copy source bytes: expected {expected}, copied {copied}")]
    CopyFailed { expected: usize, copied: usize },
}

/// A PDF that cannot become a [`crate::DocumentHandle`].
#[derive(Error, Debug)]
pub enum DocError {
    #[error("PDF is corrupt: {0}")]
    Corrupt(String),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("PDF has no pages")]
    Empty,

    #[error("Invalid PDF bytes: {0}")]
    Buffer(#[from] BufferError),

    #[error("Failed to read PDF: {0}")]
    Io(#[from] std::io::Error),
}

/// Page-level render failure. Never invalidates the document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    #[error("Page {page} out of range (total: {total})")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("Invalid raster scale: {0}")]
    InvalidScale(f32),

    #[error("Raster too large: {width}x{height} pixels")]
    TooLarge { width: u64, height: u64 },

    #[error("Failed to render page {page}: {reason}")]
    RenderFailed { page: u32, reason: String },
}

/// Engine-level or page-source failure during OCR.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("Unsupported OCR language: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to initialize OCR engine: {0}")]
    Initialization(String),

    #[error("Source page unavailable: {0}")]
    SourcePage(#[from] RasterError),

    #[error("OCR engine failure: {0}")]
    EngineFailure(String),
}

/// Invalid structural-edit arguments, or a failure producing the output.
#[derive(Error, Debug)]
pub enum EditError {
    #[error("No input documents")]
    NoInputs,

    #[error("Split point {at} invalid for {page_count} page document")]
    InvalidSplitPoint { at: u32, page_count: u32 },

    #[error("Rotation must be a multiple of 90, got {0}")]
    InvalidRotation(i32),

    #[error("Page {page} out of range (total: {total})")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("Page selection would produce an empty document")]
    EmptySelection,

    #[error("PDF manipulation failed: {0}")]
    Pdf(String),

    #[error("Edited output rejected: {0}")]
    Buffer(#[from] BufferError),

    #[error("Edited output unreadable: {0}")]
    Document(#[from] DocError),
}

/// Errors surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Document(#[from] DocError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Buffer(BufferError::TooLarge { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE")
            }
            ApiError::Buffer(_) => (StatusCode::BAD_REQUEST, "INVALID_PDF_BYTES"),
            ApiError::Document(DocError::Corrupt(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CORRUPT_PDF")
            }
            ApiError::Document(DocError::Encrypted) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ENCRYPTED_PDF")
            }
            ApiError::Document(DocError::Empty) => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_PDF"),
            ApiError::Document(DocError::Buffer(_)) => (StatusCode::BAD_REQUEST, "INVALID_PDF_BYTES"),
            ApiError::Document(DocError::Io(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            ApiError::Raster(RasterError::RenderFailed { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "RENDER_FAILED")
            }
            ApiError::Raster(_) => (StatusCode::BAD_REQUEST, "INVALID_PAGE"),
            ApiError::Ocr(OcrError::UnsupportedLanguage(_)) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_LANGUAGE")
            }
            ApiError::Ocr(OcrError::Initialization(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "INIT_ERROR")
            }
            ApiError::Ocr(OcrError::SourcePage(RasterError::RenderFailed { .. })) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "RENDER_FAILED")
            }
            ApiError::Ocr(OcrError::SourcePage(_)) => (StatusCode::BAD_REQUEST, "INVALID_PAGE"),
            ApiError::Ocr(OcrError::EngineFailure(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ENGINE_FAILURE")
            }
            ApiError::Edit(EditError::Pdf(_)) => (StatusCode::UNPROCESSABLE_ENTITY, "EDIT_FAILED"),
            ApiError::Edit(EditError::Buffer(_)) | ApiError::Edit(EditError::Document(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "EDIT_OUTPUT_INVALID")
            }
            ApiError::Edit(_) => (StatusCode::BAD_REQUEST, "INVALID_EDIT"),
            ApiError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!("{} ({})", self, code);
        } else {
            tracing::debug!("Rejected request: {} ({})", self, code);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
