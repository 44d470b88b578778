use super::types::TextLine;

/// Confidence-filtered text, in detection order. Built once by
/// [`assemble`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledText {
    text: String,
    kept: usize,
    dropped: usize,
    mean_confidence: f32,
}

impl AssembledText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn kept(&self) -> usize {
        self.kept
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Mean confidence of the kept lines, 0.0 when nothing was kept.
    pub fn mean_confidence(&self) -> f32 {
        self.mean_confidence
    }
}

/// Keep lines with `confidence >= min_confidence` and join them with `\n`.
pub fn assemble(lines: &[TextLine], min_confidence: f32) -> AssembledText {
    let kept: Vec<&TextLine> = lines
        .iter()
        .filter(|l| l.confidence >= min_confidence)
        .collect();

    let mean_confidence = if kept.is_empty() {
        0.0
    } else {
        kept.iter().map(|l| l.confidence).sum::<f32>() / kept.len() as f32
    };

    let text = kept
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    AssembledText {
        text,
        kept: kept.len(),
        dropped: lines.len() - kept.len(),
        mean_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_confidence_line_excluded() {
        let lines = vec![TextLine::new("Weight 70kg", 0.9), TextLine::new("???", 0.2)];
        let assembled = assemble(&lines, 0.45);
        assert!(assembled.as_str().contains("Weight 70kg"));
        assert!(!assembled.as_str().contains("???"));
        assert_eq!(assembled.kept(), 1);
        assert_eq!(assembled.dropped(), 1);
    }

    #[test]
    fn threshold_is_inclusive_and_order_preserved() {
        let lines = vec![
            TextLine::new("first", 0.45),
            TextLine::new("noise", 0.449),
            TextLine::new("second", 1.0),
        ];
        let assembled = assemble(&lines, 0.45);
        assert_eq!(assembled.as_str(), "first\nsecond");
        assert!((assembled.mean_confidence() - 0.725).abs() < 1e-6);
    }

    #[test]
    fn nothing_kept_is_empty() {
        let assembled = assemble(&[TextLine::new("smudge", 0.1)], 0.45);
        assert!(assembled.is_empty());
        assert_eq!(assembled.mean_confidence(), 0.0);
        assert!(assemble(&[], 0.45).is_empty());
    }
}
