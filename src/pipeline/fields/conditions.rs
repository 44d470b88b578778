use std::sync::LazyLock;

use regex::Regex;

/// Condition name and the words that suggest it, in reporting order.
const CONDITION_KEYWORDS: &[(&str, &[&str])] = &[
    ("diabetes", &["diabetes", "diabetic", "blood sugar", "glucose", "hba1c"]),
    ("hypertension", &["hypertension", "blood pressure", "bp", "systolic", "diastolic"]),
    ("hyperlipidemia", &["cholesterol", "lipid", "triglycerides", "ldl", "hdl"]),
    ("heart disease", &["cardiac", "heart", "cardiovascular", "ecg", "ekg"]),
    ("kidney disease", &["kidney", "renal", "creatinine", "urea", "dialysis"]),
];

static CONDITION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    CONDITION_KEYWORDS
        .iter()
        .map(|(condition, words)| {
            let alternatives: Vec<String> = words
                .iter()
                .map(|w| regex::escape(w).replace(' ', r"\s+"))
                .collect();
            let re = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
                .expect("valid condition regex");
            (*condition, re)
        })
        .collect()
});

/// Conditions suggested by keywords anywhere in the text. Used when no
/// oracle summary is available; a keyword hit is a hint, not a diagnosis.
pub fn detect_conditions(text: &str) -> Vec<String> {
    CONDITION_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(condition, _)| condition.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_table_order() {
        let text = "Serum Creatinine 1.1 mg/dL\nFasting glucose 145 mg/dL";
        assert_eq!(detect_conditions(text), vec!["diabetes", "kidney disease"]);
    }

    #[test]
    fn each_condition_reported_once() {
        let text = "LDL 160 mg/dL\nHDL 35 mg/dL\nTotal cholesterol 240";
        assert_eq!(detect_conditions(text), vec!["hyperlipidemia"]);
    }

    #[test]
    fn short_keywords_need_word_boundaries() {
        // "bpm" and "heartburn" must not count
        assert!(detect_conditions("Pulse 72 bpm, mild heartburn").is_empty());
        assert_eq!(detect_conditions("BP: 140/90"), vec!["hypertension"]);
    }

    #[test]
    fn plain_text_has_no_conditions() {
        assert!(detect_conditions("Follow up in two weeks").is_empty());
    }
}
