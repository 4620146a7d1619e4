//! PDF document processing core
//!
//! Raw bytes enter through [`BufferGuard`] and become a [`DocumentHandle`].
//! From there a document can be edited ([`edit`]), rendered ([`raster`]) or
//! recognized page by page ([`ocr`]). The [`server`] module exposes all of it
//! over HTTP.

pub mod buffer;
pub mod config;
pub mod document;
pub mod edit;
pub mod engines;
pub mod error;
pub mod ocr;
mod pdf;
pub mod raster;
pub mod server;

pub use buffer::{guard, BufferGuard, OwnedBuffer};
pub use config::{Args, Config};
pub use document::{DocumentHandle, DocumentInfo, PageInfo};
pub use edit::{extract_pages, merge, remove_pages, rotate, split, MergeResult, SplitResult};
pub use error::{ApiError, BufferError, DocError, EditError, OcrError, RasterError};
pub use ocr::{OcrResult, OcrService, OcrWorkerManager, OcrWorkerState};
pub use raster::{rasterize, PageRaster, Preset};
