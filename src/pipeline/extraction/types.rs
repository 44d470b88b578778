use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::normalize::RawOcrPage;
use super::ExtractionError;

/// One detected text span with its confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub confidence: f32,
}

impl TextLine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

/// How the winning text was obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PdfText,
    PdfTextSecondary,
    PdfOcr,
    ImageOcr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfText => "pdf_text",
            Self::PdfTextSecondary => "pdf_text_secondary",
            Self::PdfOcr => "pdf_ocr",
            Self::ImageOcr => "image_ocr",
        }
    }
}

/// One step of the fallback chain, recorded for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub backend: String,
    pub chars: usize,
    pub error: Option<String>,
}

impl ExtractionAttempt {
    pub fn ok(backend: &str, chars: usize) -> Self {
        Self {
            backend: backend.to_string(),
            chars,
            error: None,
        }
    }

    pub fn failed(backend: &str, error: &ExtractionError) -> Self {
        Self {
            backend: backend.to_string(),
            chars: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Warnings about extraction quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtractionWarning {
    LowConfidence { confidence: f32 },
    BlurryImage,
    HandwritingDetected,
    RawImageFallback,
    PartialExtraction { reason: String },
}

/// Text that made it through the fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub attempts: Vec<ExtractionAttempt>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Outcome of the chain. Running out of text is an expected result, not
/// an error; errors are reserved for sources nothing could open.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Text(ExtractedText),
    NoReadableText { attempts: Vec<ExtractionAttempt> },
}

/// OCR engine abstraction (allows mocking for tests).
///
/// Engines return raw pages in whatever shape they produce; the
/// normalizer owns the interpretation.
pub trait OcrEngine {
    fn detect_text(&self, image_bytes: &[u8]) -> Result<Vec<RawOcrPage>, ExtractionError>;

    fn name(&self) -> &str {
        "ocr"
    }
}

/// Structured PDF text-layer backend.
pub trait PdfTextBackend {
    fn name(&self) -> &'static str;

    /// Text per page, in page order. Pages without text are empty strings.
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// Rasterizes PDF pages to image files for OCR.
pub trait PdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Write page `page_index` (0-based) as a PNG inside `out_dir` and
    /// return its path. The caller owns `out_dir` and its cleanup.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, ExtractionError>;
}
