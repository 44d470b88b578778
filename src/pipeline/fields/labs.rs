use std::sync::LazyLock;

use regex::Regex;

use crate::models::RawLabValue;

/// `<parameter> [:-=] <value> <unit>` on one line. The parameter must start
/// with a letter and cannot contain `:` so "BP: 120/80 mmHg" is not a lab.
static LAB_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*
        (?P<parameter>[a-z][a-z0-9\ ()/.\-]*?)
        \s*[:=\-]?\s*
        (?P<value>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)
        \s*
        (?P<unit>mg/dl|mmol/l|g/dl|u/l|iu/l|ng/ml|µmol/l|umol/l|mmhg|%)
        (?:\s|$|[,;(])",
    )
    .expect("valid lab line regex")
});

/// Scan plain text for lab result lines. Values stay as text; coercion and
/// range checks happen in verification.
pub fn scan_lab_values(text: &str) -> Vec<RawLabValue> {
    let labs: Vec<RawLabValue> = text
        .lines()
        .filter_map(|line| {
            let caps = LAB_LINE.captures(line)?;
            let parameter = caps.name("parameter")?.as_str().trim();
            if parameter.is_empty() {
                return None;
            }
            Some(RawLabValue::new(
                parameter,
                caps.name("value")?.as_str(),
                caps.name("unit")?.as_str(),
            ))
        })
        .collect();

    tracing::debug!(count = labs.len(), "Lab line scan complete");
    labs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabValueInput;

    #[test]
    fn reads_parameter_value_unit() {
        let labs = scan_lab_values("Fasting Blood Sugar: 145 mg/dL\nHbA1c 6.1 %\n");
        assert_eq!(labs.len(), 2);
        assert_eq!(labs[0].parameter, "Fasting Blood Sugar");
        assert_eq!(labs[0].value, LabValueInput::from("145"));
        assert_eq!(labs[0].unit, "mg/dL");
        assert_eq!(labs[1].parameter, "HbA1c");
        assert_eq!(labs[1].value.coerce(), Some(6.1));
        assert_eq!(labs[1].unit, "%");
    }

    #[test]
    fn keeps_thousands_separator_for_coercion() {
        let labs = scan_lab_values("Platelet Count - 1,250 U/L");
        assert_eq!(labs.len(), 1);
        assert_eq!(labs[0].value.coerce(), Some(1250.0));
    }

    #[test]
    fn trailing_reference_range_ignored() {
        let labs = scan_lab_values("Total Cholesterol 230 mg/dL (125-200)");
        assert_eq!(labs[0].parameter, "Total Cholesterol");
        assert_eq!(labs[0].value.coerce(), Some(230.0));
    }

    #[test]
    fn vitals_and_page_headers_are_not_labs() {
        let text = "Page 1:\nBP: 120/80 mmHg\nWeight 70 kg\nPulse 72 bpm";
        assert!(scan_lab_values(text).is_empty());
    }

    #[test]
    fn unit_must_end_the_token() {
        assert!(scan_lab_values("Ratio 5 %ile").is_empty());
    }
}
