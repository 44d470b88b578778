//! Normalization of OCR engine output.
//!
//! Engines disagree on output shape, and the same engine changes shape
//! across versions. Three shapes are accepted per page:
//!
//! - a mapping with parallel `texts`/`scores` arrays (`rec_texts`/`rec_scores`
//!   in PaddleOCR 3.x),
//! - a list of records, each with a text field and a confidence field,
//! - a list of `[geometry, [text, confidence]]` or `[geometry, text]` pairs
//!   (PaddleOCR 2.x).
//!
//! A list may mix records and pairs. Anything else is `Unrecognized` and
//! contributes no lines.

use serde_json::Value;

use super::types::TextLine;

const TEXT_KEYS: &[&str] = &["texts", "rec_texts"];
const SCORE_KEYS: &[&str] = &["scores", "rec_scores"];
const RECORD_TEXT_KEYS: &[&str] = &["text", "rec_text", "transcription"];
const RECORD_CONF_KEYS: &[&str] = &["confidence", "score", "conf"];

/// One page of raw engine output, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOcrPage {
    Parallel {
        texts: Vec<String>,
        scores: Vec<Option<f64>>,
    },
    Items(Vec<RawOcrItem>),
    Unrecognized,
}

/// One entry of a list-shaped page.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOcrItem {
    Record {
        text: String,
        confidence: Option<f64>,
    },
    Pair {
        text: String,
        confidence: Option<f64>,
    },
    Unrecognized,
}

impl RawOcrItem {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let text = RECORD_TEXT_KEYS
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str));
                match text {
                    Some(text) => RawOcrItem::Record {
                        text: text.to_string(),
                        confidence: RECORD_CONF_KEYS
                            .iter()
                            .find_map(|k| map.get(*k).and_then(Value::as_f64)),
                    },
                    None => RawOcrItem::Unrecognized,
                }
            }
            Value::Array(parts) if parts.len() >= 2 => match &parts[1] {
                Value::String(text) => RawOcrItem::Pair {
                    text: text.clone(),
                    confidence: None,
                },
                Value::Array(inner) => match inner.first().and_then(Value::as_str) {
                    Some(text) => RawOcrItem::Pair {
                        text: text.to_string(),
                        confidence: inner.get(1).and_then(Value::as_f64),
                    },
                    None => RawOcrItem::Unrecognized,
                },
                _ => RawOcrItem::Unrecognized,
            },
            _ => RawOcrItem::Unrecognized,
        }
    }

    fn is_recognized(&self) -> bool {
        !matches!(self, RawOcrItem::Unrecognized)
    }
}

impl RawOcrPage {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RawOcrPage::Items(Vec::new()),
            Value::Array(items) => {
                RawOcrPage::Items(items.iter().map(RawOcrItem::from_json).collect())
            }
            Value::Object(map) => {
                let texts = TEXT_KEYS
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_array));
                if let Some(texts) = texts {
                    let scores = SCORE_KEYS
                        .iter()
                        .find_map(|k| map.get(*k).and_then(Value::as_array))
                        .map(|s| s.iter().map(Value::as_f64).collect())
                        .unwrap_or_default();
                    return RawOcrPage::Parallel {
                        // Non-string entries keep their slot so scores stay aligned
                        texts: texts
                            .iter()
                            .map(|t| t.as_str().unwrap_or_default().to_string())
                            .collect(),
                        scores,
                    };
                }
                match RawOcrItem::from_json(value) {
                    RawOcrItem::Unrecognized => RawOcrPage::Unrecognized,
                    record => RawOcrPage::Items(vec![record]),
                }
            }
            _ => RawOcrPage::Unrecognized,
        }
    }

    /// Lines of this page in detection order.
    pub fn lines(&self) -> Vec<TextLine> {
        let mut lines = Vec::new();
        match self {
            RawOcrPage::Parallel { texts, scores } => {
                for (i, text) in texts.iter().enumerate() {
                    push_line(&mut lines, text, scores.get(i).copied().flatten());
                }
            }
            RawOcrPage::Items(items) => {
                for item in items {
                    match item {
                        RawOcrItem::Record { text, confidence }
                        | RawOcrItem::Pair { text, confidence } => {
                            push_line(&mut lines, text, *confidence)
                        }
                        RawOcrItem::Unrecognized => {}
                    }
                }
            }
            RawOcrPage::Unrecognized => {}
        }
        lines
    }
}

/// Split a full engine response into pages.
///
/// A top-level list is a list of pages when any element is page-shaped
/// (a parallel mapping, or a list holding line items). Otherwise it is a
/// single page as soon as one element is a line item; malformed entries
/// beside it are skipped, not promoted to pages.
pub fn parse_engine_output(value: &Value) -> Vec<RawOcrPage> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(elements) if elements.is_empty() => Vec::new(),
        Value::Array(elements) => {
            let items: Vec<RawOcrItem> = elements.iter().map(RawOcrItem::from_json).collect();
            let single_page = !elements.iter().any(is_page_shaped)
                && items.iter().any(RawOcrItem::is_recognized);
            if single_page {
                vec![RawOcrPage::Items(items)]
            } else {
                elements.iter().map(RawOcrPage::from_json).collect()
            }
        }
        other => vec![RawOcrPage::from_json(other)],
    }
}

fn is_page_shaped(value: &Value) -> bool {
    match value {
        Value::Array(_) => match RawOcrPage::from_json(value) {
            RawOcrPage::Items(items) => items.iter().any(RawOcrItem::is_recognized),
            _ => false,
        },
        Value::Object(_) => matches!(RawOcrPage::from_json(value), RawOcrPage::Parallel { .. }),
        _ => false,
    }
}

/// Flatten pages into one ordered line sequence.
pub fn normalize(pages: &[RawOcrPage]) -> Vec<TextLine> {
    let lines: Vec<TextLine> = pages.iter().flat_map(RawOcrPage::lines).collect();
    let unrecognized = pages
        .iter()
        .filter(|p| matches!(p, RawOcrPage::Unrecognized))
        .count();
    if unrecognized > 0 {
        tracing::warn!(
            pages = pages.len(),
            unrecognized,
            "OCR output contained pages of unrecognized shape"
        );
    }
    lines
}

/// Missing, non-finite and out-of-range confidences all become 1.0.
pub fn normalize_confidence(raw: Option<f64>) -> f32 {
    match raw {
        Some(c) if c.is_finite() && (0.0..=1.0).contains(&c) => c as f32,
        _ => 1.0,
    }
}

fn push_line(lines: &mut Vec<TextLine>, text: &str, confidence: Option<f64>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    lines.push(TextLine {
        text: trimmed.to_string(),
        confidence: normalize_confidence(confidence),
    });
}
