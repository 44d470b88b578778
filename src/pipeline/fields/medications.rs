use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::Medication;

/// Medication names recognized without an oracle. Matching is
/// case-insensitive on whole words.
const KNOWN_MEDICATIONS: &[&str] = &[
    "expectorant",
    "paracetamol",
    "acetaminophen",
    "ibuprofen",
    "naproxen",
    "aspirin",
    "antibiotic",
    "amoxicillin",
    "penicillin",
    "azithromycin",
    "erythromycin",
    "clarithromycin",
    "vitamin b12",
    "vitamin c",
    "vitamin d",
    "calcium",
    "iron",
    "metformin",
    "insulin",
    "losartan",
    "lisinopril",
    "spironolactone",
    "amlodipine",
    "atorvastatin",
    "simvastatin",
    "gemfibrozil",
    "warfarin",
    "omeprazole",
    "pantoprazole",
    "cetirizine",
    "loratadine",
];

static MEDICATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = KNOWN_MEDICATIONS
        .iter()
        .map(|name| regex::escape(name).replace(' ', r"\s+"))
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
        .expect("valid medication regex")
});

static DOSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:mg|mcg|ml|g|iu|units?|tablets?|capsules?)\b")
        .expect("valid dosage regex")
});

static FREQUENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        every\s+\d+\s+hours?
        | (?:once|twice|thrice)\s+(?:a\s+day|daily)
        | \d+\s+times?\s+(?:a\s+day|daily)
        | \b(?:morning|evening|night)\b",
    )
    .expect("valid frequency regex")
});

/// Find known medications in free text, in order of first appearance.
///
/// Dosage and frequency are read from the rest of the line after the name,
/// then from the next line, so a dose belonging to the previous drug on the
/// same line is not picked up.
pub fn scan_medications(text: &str) -> Vec<Medication> {
    let lines: Vec<&str> = text.lines().collect();
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let matches: Vec<_> = MEDICATION_NAME.find_iter(line).collect();
        for (j, m) in matches.iter().enumerate() {
            let name = display_name(m.as_str());
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            // Up to the next medication on this line
            let end = matches.get(j + 1).map_or(line.len(), |next| next.start());
            let same_line = &line[m.end()..end];
            let next_line = lines.get(i + 1).copied().unwrap_or_default();
            let next_line = if MEDICATION_NAME.is_match(next_line) { "" } else { next_line };

            let pick = |re: &Regex| {
                re.find(same_line)
                    .or_else(|| re.find(next_line))
                    .map(|m| m.as_str().to_string())
            };

            found.push(Medication {
                name,
                dosage: pick(&DOSAGE),
                frequency: pick(&FREQUENCY),
            });
        }
    }

    tracing::debug!(count = found.len(), "Medication scan complete");
    found
}

/// "vitamin   b12" → "Vitamin B12"
fn display_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_medication_with_dosage_and_frequency() {
        let meds = scan_medications("Rx: METFORMIN 500 mg twice a day after meals");
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].name, "Metformin");
        assert_eq!(meds[0].dosage.as_deref(), Some("500 mg"));
        assert_eq!(meds[0].frequency.as_deref(), Some("twice a day"));
    }

    #[test]
    fn dosage_on_following_line() {
        let meds = scan_medications("Amoxicillin\n250mg every 8 hours");
        assert_eq!(meds[0].dosage.as_deref(), Some("250mg"));
        assert_eq!(meds[0].frequency.as_deref(), Some("every 8 hours"));
    }

    #[test]
    fn doses_stay_with_their_own_drug() {
        let meds = scan_medications("Warfarin 5 mg, Aspirin 75 mg at night");
        assert_eq!(meds.len(), 2);
        assert_eq!(meds[0].name, "Warfarin");
        assert_eq!(meds[0].dosage.as_deref(), Some("5 mg"));
        assert_eq!(meds[0].frequency, None);
        assert_eq!(meds[1].name, "Aspirin");
        assert_eq!(meds[1].dosage.as_deref(), Some("75 mg"));
        assert_eq!(meds[1].frequency.as_deref(), Some("night"));
    }

    #[test]
    fn repeated_mentions_reported_once_in_text_order() {
        let meds = scan_medications("Ibuprofen 400mg\nParacetamol 500mg\nstop ibuprofen if pain");
        let names: Vec<&str> = meds.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Ibuprofen", "Paracetamol"]);
    }

    #[test]
    fn multi_word_names_and_boundaries() {
        let meds = scan_medications("Vitamin  D 1000 IU daily\nIronman triathlon");
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].name, "Vitamin D");
        assert_eq!(meds[0].dosage.as_deref(), Some("1000 IU"));
    }

    #[test]
    fn no_medications_in_lab_report() {
        assert!(scan_medications("Fasting Blood Sugar 145 mg/dL").is_empty());
    }
}
