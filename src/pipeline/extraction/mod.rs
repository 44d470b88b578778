pub mod types;
pub mod normalize;
pub mod assemble;
pub mod confidence;
pub mod sanitize;
pub mod preprocess;
pub mod pdf;
pub mod ocr;
pub mod pdf_renderer;
pub mod orchestrator;

pub use types::*;
pub use normalize::*;
pub use assemble::*;
pub use confidence::*;
pub use sanitize::*;
pub use preprocess::*;
pub use pdf::*;
pub use ocr::*;
pub use pdf_renderer::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR engine initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Image decoding failed: {0}")]
    ImageDecode(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Page rendering failed: {0}")]
    PageRender(String),

    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),

    #[error("Unsupported format for extraction")]
    UnsupportedFormat,
}

impl ExtractionError {
    /// True when the failure says something about the document itself
    /// rather than about the host (missing engine, disk errors).
    pub fn is_source_fault(&self) -> bool {
        matches!(
            self,
            Self::OcrProcessing(_)
                | Self::PdfParsing(_)
                | Self::ImageDecode(_)
                | Self::ImageProcessing(_)
                | Self::PageRender(_)
                | Self::UnsupportedFormat
        )
    }
}
