use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::normalize::{parse_engine_output, RawOcrItem, RawOcrPage};
use super::types::OcrEngine;
use super::ExtractionError;

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: PathBuf,
    default_lang: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Initialize with a tessdata directory. Uses "eng+fra" when French
    /// traineddata is installed, "eng" otherwise.
    pub fn new(tessdata_dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.join("eng.traineddata").exists() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }

        let default_lang = if tessdata_dir.join("fra.traineddata").exists() {
            tracing::info!("French traineddata found, defaulting to eng+fra");
            "eng+fra".to_string()
        } else {
            "eng".to_string()
        };

        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
            default_lang,
        })
    }

    /// Set language(s) for OCR (e.g., "eng", "eng+fra")
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.default_lang = langs.to_string();
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn detect_text(&self, image_bytes: &[u8]) -> Result<Vec<RawOcrPage>, ExtractionError> {
        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(&self.default_lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        // Word-level TSV grouped into lines; plain text with the page mean
        // when TSV is unavailable.
        let items = match tess.get_tsv_text(0) {
            Ok(tsv) => parse_tsv_lines(&tsv),
            Err(_) => {
                let text = tess
                    .get_text()
                    .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
                let mean = tess.mean_text_conf();
                let confidence = (mean >= 0).then(|| f64::from(mean) / 100.0);
                text.lines()
                    .map(|l| RawOcrItem::Record {
                        text: l.to_string(),
                        confidence,
                    })
                    .collect()
            }
        };

        Ok(vec![RawOcrPage::Items(items)])
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Group Tesseract TSV words into line records.
///
/// TSV columns: level page_num block_num par_num line_num word_num left top
/// width height conf text. Level 5 rows are words; a line is keyed by
/// (page, block, paragraph, line). Line confidence is the mean of the word
/// confidences Tesseract could score (it reports -1 for the rest), scaled
/// from 0-100 to 0-1.
pub fn parse_tsv_lines(tsv: &str) -> Vec<RawOcrItem> {
    struct LineAcc {
        key: [u32; 4],
        words: Vec<String>,
        conf_sum: f64,
        conf_count: u32,
    }

    let mut lines: Vec<LineAcc> = Vec::new();

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        if fields[0].parse::<i32>().ok() != Some(5) {
            continue;
        }
        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }
        let mut key = [0u32; 4];
        let mut bad_key = false;
        for (slot, field) in key.iter_mut().zip(&fields[1..5]) {
            match field.parse() {
                Ok(v) => *slot = v,
                Err(_) => bad_key = true,
            }
        }
        if bad_key {
            continue;
        }
        let conf: Option<f64> = fields[10].parse().ok().filter(|c: &f64| *c >= 0.0);

        if !lines.last().is_some_and(|acc| acc.key == key) {
            lines.push(LineAcc {
                key,
                words: Vec::new(),
                conf_sum: 0.0,
                conf_count: 0,
            });
        }
        let Some(acc) = lines.last_mut() else {
            continue;
        };
        acc.words.push(word.to_string());
        if let Some(c) = conf {
            acc.conf_sum += c;
            acc.conf_count += 1;
        }
    }

    lines
        .into_iter()
        .map(|acc| RawOcrItem::Record {
            text: acc.words.join(" "),
            confidence: (acc.conf_count > 0)
                .then(|| acc.conf_sum / f64::from(acc.conf_count) / 100.0),
        })
        .collect()
}

/// External OCR program (PaddleOCR wrapper, cloud CLI, ...).
///
/// The program is run as `program [args..] <image-path>` and must print its
/// result as JSON on stdout, in any shape the normalizer accepts. The image
/// file's extension matches its content (`.png`, `.jpg`, `.tiff`, ...).
pub struct CommandOcrEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandOcrEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl OcrEngine for CommandOcrEngine {
    fn detect_text(&self, image_bytes: &[u8]) -> Result<Vec<RawOcrPage>, ExtractionError> {
        let mut image = tempfile::Builder::new()
            .prefix("medscan-ocr-")
            .suffix(&image_suffix(image_bytes))
            .tempfile()?;
        image.write_all(image_bytes)?;
        image.flush()?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image.path())
            .output()
            .map_err(|e| {
                ExtractionError::OcrInit(format!("{}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::OcrProcessing(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            ExtractionError::OcrProcessing(format!("engine output is not JSON: {e}"))
        })?;

        Ok(parse_engine_output(&value))
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// File extension for the sniffed image format; `.png` when unknown.
fn image_suffix(image_bytes: &[u8]) -> String {
    let ext = image::guess_format(image_bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png");
    format!(".{ext}")
}

/// Mock OCR engine for unit testing without a real engine.
///
/// Returns one record per line of `text`, all at `confidence`, and counts
/// how often it was called.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcrEngine {
    fn detect_text(&self, _image_bytes: &[u8]) -> Result<Vec<RawOcrPage>, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items = self
            .text
            .lines()
            .map(|l| RawOcrItem::Record {
                text: l.to_string(),
                confidence: Some(f64::from(self.confidence)),
            })
            .collect();
        Ok(vec![RawOcrPage::Items(items)])
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Stand-in when no OCR engine is installed. Every call fails with
/// `OcrInit`, so image documents surface a setup error instead of empty text.
pub struct UnavailableOcrEngine {
    reason: String,
}

impl UnavailableOcrEngine {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl OcrEngine for UnavailableOcrEngine {
    fn detect_text(&self, _image_bytes: &[u8]) -> Result<Vec<RawOcrPage>, ExtractionError> {
        Err(ExtractionError::OcrInit(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
