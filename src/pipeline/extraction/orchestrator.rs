use std::path::Path;

use super::assemble::assemble;
use super::confidence::{analyze_line_quality, pdf_text_confidence, weighted_page_confidence};
use super::pdf::{join_pages, LopdfTextBackend, PdfExtractBackend};
use super::pdf_renderer::LopdfPageRenderer;
use super::preprocess::{ImageOcrOutcome, PreprocessingChain};
use super::sanitize::{sanitize_extracted_text, visible_chars};
use super::types::{
    ExtractedText, ExtractionAttempt, ExtractionMethod, ExtractionOutcome, ExtractionWarning,
    OcrEngine, PdfPageRenderer, PdfTextBackend,
};
use super::ExtractionError;
use crate::models::DocumentKind;
use crate::pipeline_config::PipelineConfig;

/// Gets raw text out of an image or PDF through the fallback chain.
/// Collaborators are trait objects so tests can inject mocks.
pub struct DocumentTextExtractor {
    ocr_engine: Box<dyn OcrEngine + Send + Sync>,
    primary: Box<dyn PdfTextBackend + Send + Sync>,
    secondary: Option<Box<dyn PdfTextBackend + Send + Sync>>,
    pdf_renderer: Option<Box<dyn PdfPageRenderer + Send + Sync>>,
    chain: PreprocessingChain,
    config: PipelineConfig,
}

/// Best text so far for a PDF, from whichever step produced it.
struct PdfCandidate {
    text: String,
    chars: usize,
    method: ExtractionMethod,
    confidence: f32,
}

impl DocumentTextExtractor {
    /// pdf-extract, then lopdf, then lopdf page rendering + `ocr_engine`.
    pub fn new(ocr_engine: Box<dyn OcrEngine + Send + Sync>, config: PipelineConfig) -> Self {
        Self {
            ocr_engine,
            primary: Box::new(PdfExtractBackend),
            secondary: Some(Box::new(LopdfTextBackend)),
            pdf_renderer: Some(Box::new(LopdfPageRenderer::new())),
            chain: PreprocessingChain::new(config.preprocess.clone()),
            config,
        }
    }

    pub fn with_primary_backend(mut self, backend: Box<dyn PdfTextBackend + Send + Sync>) -> Self {
        self.primary = backend;
        self
    }

    pub fn with_secondary_backend(
        mut self,
        backend: Option<Box<dyn PdfTextBackend + Send + Sync>>,
    ) -> Self {
        self.secondary = backend;
        self
    }

    /// `None` disables OCR of scanned PDF pages.
    pub fn with_pdf_renderer(
        mut self,
        renderer: Option<Box<dyn PdfPageRenderer + Send + Sync>>,
    ) -> Self {
        self.pdf_renderer = renderer;
        self
    }

    /// Run the chain for `kind`. `Err` means the source itself could not be
    /// opened; running out of text is `ExtractionOutcome::NoReadableText`.
    pub fn extract(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        tracing::info!(kind = kind.as_str(), size = bytes.len(), "Starting text extraction");
        match kind {
            DocumentKind::Image => self.extract_image(bytes),
            DocumentKind::Pdf => self.extract_pdf(bytes),
            DocumentKind::Unsupported => Err(ExtractionError::UnsupportedFormat),
        }
    }

    fn extract_image(&self, bytes: &[u8]) -> Result<ExtractionOutcome, ExtractionError> {
        let outcome = self.chain.ocr_with_fallback(&*self.ocr_engine, bytes)?;
        let assembled = assemble(&outcome.lines, self.config.min_confidence);

        let mut warnings = outcome.warnings;
        for w in analyze_line_quality(&outcome.lines, assembled.mean_confidence()) {
            push_unique(&mut warnings, w);
        }
        if assembled.dropped() > 0 && assembled.kept() > 0 {
            warnings.push(ExtractionWarning::PartialExtraction {
                reason: format!("{} low-confidence lines dropped", assembled.dropped()),
            });
        }

        let confidence = assembled.mean_confidence();
        let text = assembled.into_string();
        let attempts = vec![ExtractionAttempt::ok(self.ocr_engine.name(), char_len(&text))];
        Ok(self.finish(text, ExtractionMethod::ImageOcr, confidence, attempts, warnings))
    }

    fn extract_pdf(&self, bytes: &[u8]) -> Result<ExtractionOutcome, ExtractionError> {
        let mut attempts = Vec::new();
        let mut warnings = Vec::new();
        let mut first_error: Option<ExtractionError> = None;
        let mut best: Option<PdfCandidate> = None;

        // Step 1: primary text layer
        match structured_text(&*self.primary, bytes, ExtractionMethod::PdfText) {
            Ok(candidate) => {
                attempts.push(ExtractionAttempt::ok(self.primary.name(), candidate.chars));
                best = Some(candidate);
            }
            Err(e) => {
                tracing::warn!(backend = self.primary.name(), error = %e, "PDF text backend failed");
                attempts.push(ExtractionAttempt::failed(self.primary.name(), &e));
                first_error = Some(e);
            }
        }

        // Step 2: secondary text layer, longer result wins
        if best_chars(&best) < self.config.pdf_structured_min_chars {
            if let Some(secondary) = &self.secondary {
                match structured_text(&**secondary, bytes, ExtractionMethod::PdfTextSecondary) {
                    Ok(candidate) => {
                        attempts.push(ExtractionAttempt::ok(secondary.name(), candidate.chars));
                        if candidate.chars > best_chars(&best) {
                            best = Some(candidate);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(backend = secondary.name(), error = %e, "PDF text backend failed");
                        attempts.push(ExtractionAttempt::failed(secondary.name(), &e));
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        // Step 3: OCR of rendered pages; the temp dir is removed on drop
        if best_chars(&best) < self.config.pdf_ocr_trigger_chars {
            if let Some(renderer) = &self.pdf_renderer {
                let render_dir = tempfile::Builder::new().prefix("medscan-pages-").tempdir()?;
                match self.ocr_pdf_pages(&**renderer, bytes, render_dir.path(), &mut warnings) {
                    Ok(candidate) => {
                        attempts.push(ExtractionAttempt::ok("pdf-ocr", candidate.chars));
                        if candidate.chars > best_chars(&best) {
                            best = Some(candidate);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Scanned-page OCR failed");
                        attempts.push(ExtractionAttempt::failed("pdf-ocr", &e));
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match best {
            Some(c) => Ok(self.finish(c.text, c.method, c.confidence, attempts, warnings)),
            None => Err(first_error.unwrap_or_else(|| {
                ExtractionError::PdfParsing("No backend could read the document".into())
            })),
        }
    }

    /// OCR the first pages of a scanned PDF. Pages whose text is too short
    /// to be meaningful are skipped. Fails only when no page could be
    /// rendered and OCR'd at all.
    fn ocr_pdf_pages(
        &self,
        renderer: &dyn PdfPageRenderer,
        bytes: &[u8],
        out_dir: &Path,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Result<PdfCandidate, ExtractionError> {
        let page_count = renderer.page_count(bytes)?;
        let pages = page_count.min(self.config.pdf_ocr_max_pages);
        if page_count > pages {
            warnings.push(ExtractionWarning::PartialExtraction {
                reason: format!("OCR limited to the first {pages} of {page_count} pages"),
            });
        }

        let mut sections = Vec::new();
        let mut page_confidence = Vec::new();
        let mut processed = 0usize;
        let mut last_error = None;

        for index in 0..pages {
            let lines = match self.ocr_rendered_page(renderer, bytes, index, out_dir) {
                Ok(outcome) => {
                    processed += 1;
                    for w in outcome.warnings {
                        push_unique(warnings, w);
                    }
                    outcome.lines
                }
                Err(e) => {
                    tracing::warn!(page = index + 1, error = %e, "Page OCR failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let assembled = assemble(&lines, self.config.min_confidence);
            let text = assembled.as_str().trim();
            if char_len(text) <= self.config.pdf_ocr_min_page_chars {
                tracing::debug!(page = index + 1, chars = char_len(text), "OCR page too short, skipped");
                continue;
            }
            sections.push(format!("Page {} (OCR):\n{}", index + 1, text));
            page_confidence.push((text.to_string(), assembled.mean_confidence()));
        }

        if processed == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let text = sections.join("\n\n");
        Ok(PdfCandidate {
            chars: char_len(&text),
            confidence: weighted_page_confidence(&page_confidence),
            method: ExtractionMethod::PdfOcr,
            text,
        })
    }

    fn ocr_rendered_page(
        &self,
        renderer: &dyn PdfPageRenderer,
        bytes: &[u8],
        index: usize,
        out_dir: &Path,
    ) -> Result<ImageOcrOutcome, ExtractionError> {
        let path = renderer.render_page(bytes, index, self.config.render_dpi, out_dir)?;
        let image = std::fs::read(&path)?;
        self.chain.ocr_with_fallback(&*self.ocr_engine, &image)
    }

    fn finish(
        &self,
        text: String,
        method: ExtractionMethod,
        confidence: f32,
        attempts: Vec<ExtractionAttempt>,
        warnings: Vec<ExtractionWarning>,
    ) -> ExtractionOutcome {
        let readable = visible_chars(&text);
        if readable < self.config.min_readable_chars {
            tracing::info!(
                method = method.as_str(),
                readable,
                attempts = attempts.len(),
                "No readable text found"
            );
            return ExtractionOutcome::NoReadableText { attempts };
        }

        tracing::info!(
            method = method.as_str(),
            chars = char_len(&text),
            confidence,
            warnings = warnings.len(),
            "Text extraction complete"
        );
        ExtractionOutcome::Text(ExtractedText {
            text,
            method,
            confidence,
            attempts,
            warnings,
        })
    }
}

fn structured_text(
    backend: &dyn PdfTextBackend,
    bytes: &[u8],
    method: ExtractionMethod,
) -> Result<PdfCandidate, ExtractionError> {
    let pages: Vec<String> = backend
        .extract_pages(bytes)?
        .iter()
        .map(|p| sanitize_extracted_text(p))
        .collect();
    let text = join_pages(&pages);
    tracing::debug!(backend = backend.name(), pages = pages.len(), chars = char_len(&text), "PDF text layer read");
    Ok(PdfCandidate {
        chars: char_len(&text),
        confidence: pdf_text_confidence(&pages),
        method,
        text,
    })
}

fn best_chars(best: &Option<PdfCandidate>) -> usize {
    best.as_ref().map_or(0, |c| c.chars)
}

fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

fn push_unique(warnings: &mut Vec<ExtractionWarning>, warning: ExtractionWarning) {
    if !warnings.contains(&warning) {
        warnings.push(warning);
    }
}
