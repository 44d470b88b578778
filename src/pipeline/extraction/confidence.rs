use super::types::{ExtractionWarning, TextLine};

/// Confidence thresholds used across the pipeline
pub mod thresholds {
    /// Below this: extraction likely failed.
    pub const VERY_LOW: f32 = 0.30;

    /// Below this: significant uncertainty. Warn the caller.
    pub const LOW: f32 = 0.50;

    /// Below this: some uncertainty.
    pub const MODERATE: f32 = 0.70;

    /// Above this: high confidence.
    pub const HIGH: f32 = 0.85;

    /// Text read straight from a digital PDF.
    pub const VERY_HIGH: f32 = 0.95;

    /// A line under this is treated as a likely handwritten span.
    pub const HANDWRITING_LINE: f32 = 0.40;
}

/// Digital PDFs: base 0.95, scaled by ratio of pages with text
pub fn pdf_text_confidence(pages: &[String]) -> f32 {
    if pages.is_empty() {
        return 0.0;
    }
    let with_text = pages.iter().filter(|p| !p.trim().is_empty()).count();
    thresholds::VERY_HIGH * (with_text as f32 / pages.len() as f32)
}

/// OCR pages: average confidence weighted by text length
pub fn weighted_page_confidence(pages: &[(String, f32)]) -> f32 {
    let total_chars: usize = pages.iter().map(|(t, _)| t.len()).sum();
    if total_chars == 0 {
        return 0.0;
    }
    let weighted: f32 = pages.iter().map(|(t, c)| c * t.len() as f32).sum();
    weighted / total_chars as f32
}

/// Quality warnings for a set of recognized lines.
pub fn analyze_line_quality(lines: &[TextLine], mean_confidence: f32) -> Vec<ExtractionWarning> {
    let mut warnings = Vec::new();
    if lines.is_empty() {
        return warnings;
    }

    if mean_confidence < thresholds::LOW {
        warnings.push(ExtractionWarning::LowConfidence {
            confidence: mean_confidence,
        });
    }

    // Majority of lines under the handwriting cutoff
    let low = lines
        .iter()
        .filter(|l| l.confidence < thresholds::HANDWRITING_LINE)
        .count();
    if low as f64 / lines.len() as f64 > 0.50 {
        warnings.push(ExtractionWarning::HandwritingDetected);
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digital_pdf_high_confidence() {
        let pages = vec!["Page one.".to_string(), "Page two.".to_string()];
        assert!((pdf_text_confidence(&pages) - 0.95).abs() < 1e-6);
    }

    #[test]
    fn digital_pdf_empty_page_lowers_confidence() {
        let pages = vec!["Page with text.".to_string(), "   ".to_string()];
        let conf = pdf_text_confidence(&pages);
        assert!((conf - 0.475).abs() < 0.01, "Expected ~0.475, got {conf}");
        assert_eq!(pdf_text_confidence(&[]), 0.0);
    }

    #[test]
    fn ocr_weighted_by_text_length() {
        let pages = vec![
            ("Clear text on page one ".repeat(10), 0.85),
            ("Blurry".to_string(), 0.30),
        ];
        let conf = weighted_page_confidence(&pages);
        assert!(conf > 0.80, "Long clear page should dominate, got {conf}");
        assert_eq!(weighted_page_confidence(&[]), 0.0);
    }

    #[test]
    fn low_mean_flags_low_confidence() {
        let lines = vec![TextLine::new("Hb 12", 0.45), TextLine::new("WBC 7", 0.48)];
        let warnings = analyze_line_quality(&lines, 0.465);
        assert!(matches!(
            warnings.as_slice(),
            [ExtractionWarning::LowConfidence { .. }]
        ));
    }

    #[test]
    fn mostly_low_lines_flag_handwriting() {
        let lines = vec![
            TextLine::new("Rx", 0.2),
            TextLine::new("amox", 0.3),
            TextLine::new("Dr. Patel", 0.9),
        ];
        let warnings = analyze_line_quality(&lines, 0.9);
        assert!(warnings.contains(&ExtractionWarning::HandwritingDetected));
    }

    #[test]
    fn clean_lines_no_warnings() {
        let lines = vec![TextLine::new("Weight 70 kg", 0.95)];
        assert!(analyze_line_quality(&lines, 0.95).is_empty());
        assert!(analyze_line_quality(&[], 0.0).is_empty());
    }
}
