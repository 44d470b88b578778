use serde::{Deserialize, Serialize};

use super::OracleError;
use crate::models::{Medication, PatientDetails, RawLabValue, RiskAssessment};

/// What the oracle said about a document, after lenient parsing. Every
/// field may be empty; none is trusted until verified downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleSummary {
    pub patient: PatientDetails,
    pub conditions: Vec<String>,
    pub medications: Vec<Medication>,
    pub lab_values: Vec<RawLabValue>,
    pub risk: RiskAssessment,
    pub recommendations: Vec<String>,
    pub overall_assessment: Option<String>,
}

impl OracleSummary {
    /// True when the oracle gave nothing the pipeline can use.
    pub fn is_empty(&self) -> bool {
        self.patient == PatientDetails::default()
            && self.conditions.is_empty()
            && self.medications.is_empty()
            && self.lab_values.is_empty()
            && self.recommendations.is_empty()
            && self.overall_assessment.is_none()
    }
}

/// LLM client abstraction (allows mocking)
pub trait LlmClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, OracleError>;
}

/// Oracle client together with the model it should be asked for.
pub struct Oracle {
    client: Box<dyn LlmClient + Send + Sync>,
    model: String,
}

impl Oracle {
    pub fn new(client: Box<dyn LlmClient + Send + Sync>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for a summary of `text`. Returns the parsed summary and the raw
    /// answer, which callers keep for review.
    pub fn summarize(&self, text: &str) -> Result<(OracleSummary, String), OracleError> {
        let prompt = super::prompt::build_summary_prompt(text);
        let raw = self
            .client
            .generate(&self.model, &prompt, super::prompt::SUMMARY_SYSTEM_PROMPT)?;
        let summary = super::parser::parse_summary_response(&raw)?;
        tracing::info!(
            model = %self.model,
            medications = summary.medications.len(),
            labs = summary.lab_values.len(),
            "Oracle summary parsed"
        );
        Ok((summary, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::MockLlmClient;

    #[test]
    fn summarize_parses_mock_answer() {
        let oracle = Oracle::new(
            Box::new(MockLlmClient::new(
                r#"{"medications":[{"name":"Metformin","dosage":"500 mg"}]}"#,
            )),
            "test-model",
        );
        let (summary, raw) = oracle.summarize("Metformin 500 mg").unwrap();
        assert_eq!(summary.medications[0].name, "Metformin");
        assert!(raw.contains("Metformin"));
        assert_eq!(oracle.model(), "test-model");
    }

    #[test]
    fn malformed_answer_keeps_raw_text() {
        let oracle = Oracle::new(Box::new(MockLlmClient::new("I cannot help with that")), "m");
        let err = oracle.summarize("text").unwrap_err();
        assert_eq!(err.raw_response(), Some("I cannot help with that"));
    }

    #[test]
    fn transport_failure_has_no_raw_text() {
        let oracle = Oracle::new(Box::new(MockLlmClient::failing("connection refused")), "m");
        let err = oracle.summarize("text").unwrap_err();
        assert!(matches!(err, OracleError::Connection(_)));
        assert!(err.raw_response().is_none());
    }

    #[test]
    fn empty_summary_detected() {
        assert!(OracleSummary::default().is_empty());
        let summary = OracleSummary {
            conditions: vec!["diabetes".into()],
            ..Default::default()
        };
        assert!(!summary.is_empty());
    }
}
