//! Document analysis orchestrator.
//!
//! Single entry point that drives the full pipeline:
//! detect → extract → fields (+ oracle) → verify labs → interactions.
//!
//! Degraded documents come back as an `AnalysisResult` with a status; only
//! setup faults (bad reference table, no OCR engine, temp dir failure) are
//! returned as `Err`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::intelligence::{InteractionChecker, LabVerifier, ReferenceError, ReferenceTables};
use crate::models::{
    AnalysisResult, AnalysisStatus, DocumentKind, ExtractionSummary, Gender, Recommendations,
};
use crate::pipeline::extraction::ocr::{CommandOcrEngine, UnavailableOcrEngine};
use crate::pipeline::extraction::orchestrator::DocumentTextExtractor;
use crate::pipeline::extraction::types::{ExtractedText, ExtractionOutcome, OcrEngine};
use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::fields::{detect_conditions, scan_lab_values, scan_medications, FieldExtractor};
use crate::pipeline::import::{read_document, ImportError};
use crate::pipeline::structuring::{
    api_key_from_env, ChatCompletionsClient, LlmClient, OllamaClient, Oracle, OracleError,
    OracleSummary,
};
use crate::pipeline_config::{OracleConfig, OracleProvider, PipelineConfig};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Faults of the host or its configuration, never of the document.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Reference data error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Could not read document: {0}")]
    Import(#[from] ImportError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Oracle setup failed: {0}")]
    Oracle(#[from] OracleError),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs one document at a time through every stage. Holds no per-document
/// state, so one instance can serve many callers.
pub struct AnalysisOrchestrator {
    extractor: DocumentTextExtractor,
    fields: FieldExtractor,
    labs: LabVerifier,
    interactions: InteractionChecker,
    oracle: Option<Oracle>,
}

impl AnalysisOrchestrator {
    pub fn new(
        extractor: DocumentTextExtractor,
        fields: FieldExtractor,
        tables: Arc<ReferenceTables>,
    ) -> Self {
        Self {
            extractor,
            fields,
            labs: LabVerifier::new(tables.clone()),
            interactions: InteractionChecker::new(tables),
            oracle: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Oracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn extractor(&self) -> &DocumentTextExtractor {
        &self.extractor
    }

    pub fn field_extractor(&self) -> &FieldExtractor {
        &self.fields
    }

    /// Analyze a file on disk. The kind is detected from magic bytes.
    ///
    /// `gender` overrides whatever the oracle reports when choosing
    /// gender-specific lab ranges.
    pub fn analyze_file(
        &self,
        path: &Path,
        gender: Option<Gender>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let (bytes, detection) = match read_document(path) {
            Ok(read) => read,
            Err(e @ (ImportError::EmptyFile | ImportError::FileTooLarge { .. })) => {
                tracing::warn!(path = %path.display(), error = %e, "Document rejected");
                return Ok(AnalysisResult::terminal(
                    Uuid::new_v4(),
                    DocumentKind::Unsupported,
                    AnalysisStatus::UnreadableSource,
                    e.to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        self.analyze_bytes(&bytes, detection.kind, gender)
    }

    /// Analyze in-memory document bytes of a known kind.
    pub fn analyze_bytes(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
        gender: Option<Gender>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let document_id = Uuid::new_v4();

        // Step 1: kind
        if kind == DocumentKind::Unsupported {
            tracing::info!(document_id = %document_id, "Unsupported document format");
            return Ok(AnalysisResult::terminal(
                document_id,
                kind,
                AnalysisStatus::UnreadableSource,
                "Unsupported document format",
            ));
        }

        // Step 2: text
        let extracted = match self.extractor.extract(bytes, kind) {
            Ok(ExtractionOutcome::Text(extracted)) => extracted,
            Ok(ExtractionOutcome::NoReadableText { attempts }) => {
                tracing::info!(
                    document_id = %document_id,
                    attempts = attempts.len(),
                    "No readable text, analysis stopped"
                );
                return Ok(AnalysisResult::terminal(
                    document_id,
                    kind,
                    AnalysisStatus::NoReadableText,
                    "No readable text found in document",
                ));
            }
            Err(e) if e.is_source_fault() => {
                tracing::warn!(document_id = %document_id, error = %e, "Document could not be read");
                return Ok(AnalysisResult::terminal(
                    document_id,
                    kind,
                    AnalysisStatus::UnreadableSource,
                    e.to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self.analyze_extracted(document_id, kind, extracted, gender))
    }

    /// Steps 3-7 over text that is known to be readable.
    fn analyze_extracted(
        &self,
        document_id: Uuid,
        kind: DocumentKind,
        extracted: ExtractedText,
        gender: Option<Gender>,
    ) -> AnalysisResult {
        let mut result = AnalysisResult::new(document_id, kind);
        let text = extracted.text;

        // Step 3: local scans
        result.vitals = self.fields.extract(&text);
        let local_medications = scan_medications(&text);
        let local_labs = scan_lab_values(&text);
        let local_conditions = detect_conditions(&text);

        // Step 4: oracle
        let mut oracle_failed = false;
        let summary = match &self.oracle {
            Some(oracle) => match oracle.summarize(&text) {
                Ok((summary, raw)) => {
                    result.raw_oracle_response = Some(raw);
                    summary
                }
                Err(e) => {
                    tracing::warn!(
                        document_id = %document_id,
                        error = %e,
                        "Oracle summary failed, using local scan"
                    );
                    oracle_failed = true;
                    result.raw_oracle_response = e.raw_response().map(str::to_string);
                    result.error = Some(e.to_string());
                    OracleSummary::default()
                }
            },
            None => OracleSummary::default(),
        };

        let medications = prefer_non_empty(summary.medications, local_medications);
        let raw_labs = prefer_non_empty(summary.lab_values, local_labs);
        result.conditions = prefer_non_empty(summary.conditions, local_conditions);

        // Step 5: labs
        let lab_gender = gender
            .filter(|g| *g != Gender::Unknown)
            .or_else(|| summary.patient.gender.as_deref().map(Gender::parse_loose))
            .unwrap_or_default();
        result.lab_values = self.labs.verify(&raw_labs, lab_gender);

        // Step 6: interactions
        result.interactions = self.interactions.check(&medications);
        result.medications = medications;

        let mut recommendations = Recommendations::from_items(summary.recommendations);
        recommendations.red_flags.extend(result.interactions.iter().cloned());
        result.recommendations = recommendations;
        result.patient = summary.patient;
        result.risk = summary.risk;
        result.overall_assessment = summary.overall_assessment;

        // Step 7: status
        let nothing_found = result.vitals.is_empty()
            && result.lab_values.is_empty()
            && result.medications.is_empty();
        result.status = if oracle_failed {
            AnalysisStatus::NeedsReview
        } else if nothing_found {
            result.error = Some("No vitals, lab values or medications recognized".into());
            AnalysisStatus::UnableToExtract
        } else {
            AnalysisStatus::Completed
        };

        result.extraction = Some(ExtractionSummary {
            method: extracted.method,
            confidence: extracted.confidence,
            attempts: extracted.attempts,
            warnings: extracted.warnings,
        });
        result.raw_text = text;

        tracing::info!(
            document_id = %document_id,
            status = result.status.as_str(),
            vitals = result.vitals.populated(),
            medications = result.medications.len(),
            labs = result.lab_values.len(),
            interactions = result.interactions.len(),
            "Analysis complete"
        );
        result
    }
}

fn prefer_non_empty<T>(preferred: Vec<T>, fallback: Vec<T>) -> Vec<T> {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build an orchestrator from configuration.
///
/// - OCR: `ocr_command` sidecar if given, else `BundledTesseract`
///   (feature-gated), else an engine that reports OCR as unavailable
/// - PDF: pdf-extract, lopdf, lopdf page rendering
/// - Oracle: only when `config.oracle` is set
pub fn build_orchestrator(
    config: &PipelineConfig,
    ocr_command: Option<&[String]>,
) -> Result<AnalysisOrchestrator, AnalysisError> {
    let tables = match &config.reference_table {
        Some(path) => ReferenceTables::load(path)?,
        None => ReferenceTables::builtin(),
    };

    let ocr = build_ocr_engine(ocr_command);
    let extractor = DocumentTextExtractor::new(ocr, config.clone());
    let fields = FieldExtractor::new(config.temperature.clone());
    let mut orchestrator = AnalysisOrchestrator::new(extractor, fields, Arc::new(tables));

    if let Some(oracle_config) = &config.oracle {
        let client = build_llm_client(oracle_config)?;
        tracing::info!(
            provider = ?oracle_config.provider,
            model = %oracle_config.model,
            "Oracle summarization enabled"
        );
        orchestrator = orchestrator.with_oracle(Oracle::new(client, &oracle_config.model));
    }

    Ok(orchestrator)
}

fn build_llm_client(config: &OracleConfig) -> Result<Box<dyn LlmClient + Send + Sync>, OracleError> {
    match config.provider {
        OracleProvider::ChatCompletions => {
            let api_key = api_key_from_env(config.api_key_env.as_deref())?;
            let client = ChatCompletionsClient::new(&config.base_url, api_key, config.timeout_secs)?
                .with_sampling(config.temperature, config.max_tokens);
            Ok(Box::new(client))
        }
        OracleProvider::Ollama => Ok(Box::new(OllamaClient::new(
            &config.base_url,
            config.timeout_secs,
        )?)),
    }
}

/// Build the OCR engine, respecting feature flags.
fn build_ocr_engine(ocr_command: Option<&[String]>) -> Box<dyn OcrEngine + Send + Sync> {
    if let Some((program, args)) = ocr_command.and_then(|c| c.split_first()) {
        tracing::info!(program = %program, "Using OCR sidecar command");
        return Box::new(CommandOcrEngine::new(program).with_args(args.to_vec()));
    }

    #[cfg(feature = "ocr")]
    {
        match find_tessdata_dir() {
            Some(tessdata) => {
                match crate::pipeline::extraction::ocr::BundledTesseract::new(&tessdata) {
                    Ok(engine) => {
                        tracing::info!(tessdata = %tessdata.display(), "Tesseract OCR initialized");
                        return Box::new(engine);
                    }
                    Err(e) => tracing::warn!(error = %e, "Tesseract initialization failed"),
                }
            }
            None => tracing::warn!("Tesseract data not found, images will not be OCR'd"),
        }
    }

    tracing::info!("No OCR engine available, image OCR disabled");
    Box::new(UnavailableOcrEngine::new(
        "No OCR engine configured. Pass --ocr-command or build with the `ocr` feature",
    ))
}

/// Locate tessdata directory from environment or system paths.
pub fn find_tessdata_dir() -> Option<PathBuf> {
    // 1. Check TESSDATA_PREFIX environment variable
    if let Ok(path) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&path);
        if p.join("eng.traineddata").exists() {
            return Some(p);
        }
    }

    // 2. Try common system paths
    let candidates = [
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.join("eng.traineddata").exists())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GrayImage, ImageFormat, Luma};

    use super::*;
    use crate::models::{LabStatus, RiskLevel};
    use crate::pipeline::extraction::ocr::MockOcrEngine;
    use crate::pipeline::extraction::pdf::test_support::make_test_pdf;
    use crate::pipeline::structuring::MockLlmClient;

    fn png_bytes() -> Vec<u8> {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 4 + y) % 256) as u8]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn orchestrator(ocr_text: &str) -> AnalysisOrchestrator {
        let config = PipelineConfig::default();
        let extractor =
            DocumentTextExtractor::new(Box::new(MockOcrEngine::new(ocr_text, 0.9)), config.clone());
        AnalysisOrchestrator::new(
            extractor,
            FieldExtractor::new(config.temperature),
            Arc::new(ReferenceTables::builtin()),
        )
    }

    fn oracle(response: &str) -> Oracle {
        Oracle::new(Box::new(MockLlmClient::new(response)), "test-model")
    }

    const PRESCRIPTION: &str = "Patient: Jane Roe\n\
        BP: 130/85\n\
        Pulse 78\n\
        Fasting Blood Sugar 145 mg/dL\n\
        Warfarin 5 mg once daily\n\
        Aspirin 75 mg at night";

    #[test]
    fn image_runs_every_local_stage() {
        let result = orchestrator(PRESCRIPTION)
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap();

        assert_eq!(result.status, AnalysisStatus::Completed);
        assert_eq!(result.vitals.systolic.as_deref(), Some("130"));
        assert_eq!(result.vitals.heart_rate.as_deref(), Some("78"));
        assert_eq!(result.medications.len(), 2);
        assert_eq!(result.lab_values.len(), 1);
        assert_eq!(result.lab_values[0].status, Some(LabStatus::High));
        assert_eq!(
            result.interactions,
            vec!["Potential interaction: warfarin and aspirin"]
        );
        assert_eq!(result.recommendations.red_flags, result.interactions);
        assert!(result.conditions.contains(&"hypertension".to_string()));
        assert!(result.raw_text.contains("Warfarin"));
        assert!(result.raw_oracle_response.is_none());
        assert!(result.extraction.is_some());
    }

    #[test]
    fn oracle_values_take_precedence() {
        let response = r#"{
            "patientInfo": {"name": "Jane Roe", "gender": "Female"},
            "conditions": [{"name": "Type 2 Diabetes"}],
            "medications": [{"name": "Metformin", "dosage": "500 mg"}],
            "labValues": [{"test": "HDL", "value": "45", "normalRange": "50-999 mg/dL"}],
            "riskAssessment": {"level": "High", "score": 70},
            "recommendations": ["Reduce sugar intake"]
        }"#;
        let result = orchestrator(PRESCRIPTION)
            .with_oracle(oracle(response))
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap();

        assert_eq!(result.status, AnalysisStatus::Completed);
        assert_eq!(result.patient.name.as_deref(), Some("Jane Roe"));
        assert_eq!(result.conditions, vec!["Type 2 Diabetes"]);
        assert_eq!(result.medications.len(), 1);
        assert!(result.interactions.is_empty());
        // Female from the oracle selects hdl_female (50+)
        assert_eq!(result.lab_values[0].reference_key.as_deref(), Some("hdl_female"));
        assert_eq!(result.lab_values[0].status, Some(LabStatus::Low));
        assert_eq!(result.risk.level, RiskLevel::High);
        assert_eq!(result.recommendations.diet, vec!["Reduce sugar intake"]);
        assert!(result.raw_oracle_response.is_some());
        // Vitals always come from the local scan
        assert_eq!(result.vitals.diastolic.as_deref(), Some("85"));
    }

    #[test]
    fn caller_gender_overrides_oracle() {
        let response = r#"{"patientInfo": {"gender": "Female"},
            "labValues": [{"test": "HDL", "value": 45, "normalRange": "40-999 mg/dL"}]}"#;
        let result = orchestrator("HDL 45 mg/dL")
            .with_oracle(oracle(response))
            .analyze_bytes(&png_bytes(), DocumentKind::Image, Some(Gender::Male))
            .unwrap();
        assert_eq!(result.lab_values[0].reference_key.as_deref(), Some("hdl_male"));
        assert_eq!(result.lab_values[0].status, Some(LabStatus::Normal));
    }

    #[test]
    fn empty_oracle_answer_falls_back_to_local_scan() {
        let result = orchestrator(PRESCRIPTION)
            .with_oracle(oracle("{}"))
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::Completed);
        assert_eq!(result.medications.len(), 2);
        assert_eq!(result.interactions.len(), 1);
    }

    #[test]
    fn malformed_oracle_answer_needs_review_with_raw() {
        let result = orchestrator(PRESCRIPTION)
            .with_oracle(oracle("Sorry, I can't read that."))
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::NeedsReview);
        assert_eq!(result.raw_oracle_response.as_deref(), Some("Sorry, I can't read that."));
        assert!(result.error.is_some());
        // Local results still present
        assert_eq!(result.medications.len(), 2);
        assert_eq!(result.interactions.len(), 1);
    }

    #[test]
    fn oracle_outage_needs_review() {
        let result = orchestrator(PRESCRIPTION)
            .with_oracle(Oracle::new(Box::new(MockLlmClient::failing("refused")), "m"))
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::NeedsReview);
        assert!(result.raw_oracle_response.is_none());
        assert!(result.error.as_deref().unwrap_or_default().contains("refused"));
    }

    #[test]
    fn text_without_fields_is_unable_to_extract() {
        let result = orchestrator("Thank you for visiting\nFollow up next week")
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::UnableToExtract);
        assert!(result.raw_text.contains("Follow up"));
        assert!(result.error.is_some());
    }

    #[test]
    fn no_readable_text_is_terminal() {
        let result = orchestrator("")
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::NoReadableText);
        assert!(result.lab_values.is_empty());
        assert!(result.interactions.is_empty());
        assert!(result.extraction.is_none());
    }

    #[test]
    fn undecodable_image_is_unreadable_source() {
        let result = orchestrator("BP 120/80")
            .analyze_bytes(b"\x89PNG\r\n\x1a\nnot really a png", DocumentKind::Image, None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::UnreadableSource);
        assert!(result.error.is_some());
    }

    #[test]
    fn unsupported_kind_is_unreadable_source() {
        let result = orchestrator("")
            .analyze_bytes(b"MZ\x00\x00", DocumentKind::Unsupported, None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::UnreadableSource);
    }

    #[test]
    fn missing_ocr_engine_is_an_error() {
        let config = PipelineConfig::default();
        let extractor = DocumentTextExtractor::new(
            Box::new(UnavailableOcrEngine::new("none")),
            config.clone(),
        );
        let orchestrator = AnalysisOrchestrator::new(
            extractor,
            FieldExtractor::default(),
            Arc::new(ReferenceTables::builtin()),
        );
        let err = orchestrator
            .analyze_bytes(&png_bytes(), DocumentKind::Image, None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Extraction(ExtractionError::OcrInit(_))));
    }

    #[test]
    fn analyze_digital_pdf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        let pdf = make_test_pdf(&[
            "Lab Report for routine annual checkup visit",
            "Total Cholesterol 230 mg/dL and Weight 72 kg recorded today",
        ]);
        std::fs::write(&path, pdf).unwrap();

        let ocr = MockOcrEngine::new("should not be used", 0.9);
        let config = PipelineConfig::default();
        let orchestrator = AnalysisOrchestrator::new(
            DocumentTextExtractor::new(Box::new(ocr), config.clone()),
            FieldExtractor::new(config.temperature),
            Arc::new(ReferenceTables::builtin()),
        );
        let result = orchestrator.analyze_file(&path, None).unwrap();

        assert_eq!(result.document_kind, DocumentKind::Pdf);
        assert_ne!(result.status, AnalysisStatus::UnreadableSource);
        assert!(result.raw_text.contains("Page 1:"));
    }

    #[test]
    fn empty_and_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator("");

        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        let result = orchestrator.analyze_file(&empty, None).unwrap();
        assert_eq!(result.status, AnalysisStatus::UnreadableSource);

        let exe = dir.path().join("program.exe");
        std::fs::write(&exe, b"MZ\x90\x00\x03\x00\x00\x00").unwrap();
        let result = orchestrator.analyze_file(&exe, None).unwrap();
        assert_eq!(result.status, AnalysisStatus::UnreadableSource);
        assert_eq!(result.document_kind, DocumentKind::Unsupported);

        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            orchestrator.analyze_file(&missing, None),
            Err(AnalysisError::Import(ImportError::Io(_)))
        ));
    }

    #[test]
    fn build_from_default_config() {
        let orchestrator = build_orchestrator(&PipelineConfig::default(), None).unwrap();
        assert!(orchestrator.oracle.is_none());
    }

    #[test]
    fn build_with_bad_reference_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = PipelineConfig {
            reference_table: Some(path),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            build_orchestrator(&config, None),
            Err(AnalysisError::Reference(_))
        ));
    }

    #[test]
    fn sidecar_command_selected() {
        let command = vec!["paddle-ocr-json".to_string(), "--lang=en".to_string()];
        let engine = build_ocr_engine(Some(command.as_slice()));
        assert_eq!(engine.name(), "command");

        let empty: Vec<String> = Vec::new();
        let engine = build_ocr_engine(Some(empty.as_slice()));
        assert_ne!(engine.name(), "command");
    }
}
