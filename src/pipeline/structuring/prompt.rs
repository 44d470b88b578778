pub const SUMMARY_SYSTEM_PROMPT: &str = r#"
You are a medical document analysis assistant. You read the text of a medical
report or prescription and extract the information it contains.

RULES:
1. Extract information that is present in the document, even if abbreviated
   or poorly formatted (e.g. "45 yrs", "Mr.", "Dr.").
2. If a field is missing, output null (or an empty list).
3. Preserve values (doses, lab values, dates) as written.
4. Lab "normalRange" ends with the unit, e.g. "70-100 mg/dL".
5. Respond with ONLY valid JSON, no other text.

OUTPUT FORMAT:
{
  "patientInfo": {"name": null, "age": null, "gender": null, "reportDate": null, "doctor": null},
  "conditions": [{"name": "condition"}],
  "medications": [{"name": "", "dosage": "", "frequency": "", "duration": "", "notes": ""}],
  "labValues": [{"test": "", "value": "", "normalRange": "", "status": "", "interpretation": ""}],
  "riskAssessment": {"level": "low | moderate | high", "score": 0, "factors": []},
  "recommendations": ["recommendation"],
  "overallAssessment": "one paragraph"
}
"#;

/// Build the user prompt for one document.
pub fn build_summary_prompt(raw_text: &str) -> String {
    format!("Analyze this medical report/prescription:\n\n{raw_text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_document_text() {
        let prompt = build_summary_prompt("BP: 120/80");
        assert!(prompt.starts_with("Analyze this medical report/prescription:"));
        assert!(prompt.ends_with("\n\nBP: 120/80"));
    }

    #[test]
    fn system_prompt_names_every_section() {
        for key in [
            "patientInfo",
            "conditions",
            "medications",
            "labValues",
            "riskAssessment",
            "recommendations",
            "overallAssessment",
        ] {
            assert!(SUMMARY_SYSTEM_PROMPT.contains(key), "missing {key}");
        }
    }
}
