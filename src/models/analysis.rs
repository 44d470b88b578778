use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AnalysisStatus, DocumentKind, RiskLevel};
use super::lab::LabEntry;
use super::medication::Medication;
use super::vital_sign::FieldRecord;
use crate::pipeline::extraction::types::{ExtractionAttempt, ExtractionMethod, ExtractionWarning};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientDetails {
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub report_date: Option<String>,
    pub doctor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: Option<f64>,
    pub factors: Vec<String>,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            level: RiskLevel::Unknown,
            score: None,
            factors: Vec::new(),
        }
    }
}

const DIET_WORDS: &[&str] = &["diet", "food", "sugar", "eat"];
const EXERCISE_WORDS: &[&str] = &["exercise", "activity", "walk"];

/// Recommendations grouped for display. `red_flags` also receives the
/// interaction warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub diet: Vec<String>,
    pub exercise: Vec<String>,
    pub lifestyle_changes: Vec<String>,
    pub red_flags: Vec<String>,
}

impl Recommendations {
    /// Sort free-text recommendations into diet/exercise buckets by keyword.
    /// Every item is kept under `lifestyle_changes` as well.
    pub fn from_items(items: Vec<String>) -> Self {
        let matches_any = |item: &str, words: &[&str]| {
            let lower = item.to_lowercase();
            words.iter().any(|w| lower.contains(w))
        };
        Self {
            diet: items.iter().filter(|r| matches_any(r, DIET_WORDS)).cloned().collect(),
            exercise: items.iter().filter(|r| matches_any(r, EXERCISE_WORDS)).cloned().collect(),
            lifestyle_changes: items,
            red_flags: Vec::new(),
        }
    }
}

/// How the text was obtained, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub attempts: Vec<ExtractionAttempt>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Final per-document output. Degraded inputs are described by `status`
/// and `error`; they never surface as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document_id: Uuid,
    pub status: AnalysisStatus,
    pub document_kind: DocumentKind,
    pub extraction: Option<ExtractionSummary>,
    pub vitals: FieldRecord,
    pub patient: PatientDetails,
    pub conditions: Vec<String>,
    pub medications: Vec<Medication>,
    pub lab_values: Vec<LabEntry>,
    pub interactions: Vec<String>,
    pub risk: RiskAssessment,
    pub recommendations: Recommendations,
    pub overall_assessment: Option<String>,
    pub raw_text: String,
    pub raw_oracle_response: Option<String>,
    pub error: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(document_id: Uuid, document_kind: DocumentKind) -> Self {
        Self {
            document_id,
            status: AnalysisStatus::Completed,
            document_kind,
            extraction: None,
            vitals: FieldRecord::default(),
            patient: PatientDetails::default(),
            conditions: Vec::new(),
            medications: Vec::new(),
            lab_values: Vec::new(),
            interactions: Vec::new(),
            risk: RiskAssessment::default(),
            recommendations: Recommendations::default(),
            overall_assessment: None,
            raw_text: String::new(),
            raw_oracle_response: None,
            error: None,
            analyzed_at: Utc::now(),
        }
    }

    /// A result that stops the pipeline before any clinical stage ran.
    pub fn terminal(
        document_id: Uuid,
        document_kind: DocumentKind,
        status: AnalysisStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            error: Some(message.into()),
            ..Self::new(document_id, document_kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendations_split_by_keyword() {
        let recs = Recommendations::from_items(vec![
            "Reduce sugar intake".into(),
            "Walk 30 minutes daily".into(),
            "Recheck HbA1c in 3 months".into(),
        ]);
        assert_eq!(recs.diet, vec!["Reduce sugar intake"]);
        assert_eq!(recs.exercise, vec!["Walk 30 minutes daily"]);
        assert_eq!(recs.lifestyle_changes.len(), 3);
        assert!(recs.red_flags.is_empty());
    }

    #[test]
    fn terminal_result_carries_status_and_message() {
        let id = Uuid::new_v4();
        let result = AnalysisResult::terminal(
            id,
            DocumentKind::Pdf,
            AnalysisStatus::NoReadableText,
            "No readable text found",
        );
        assert_eq!(result.document_id, id);
        assert_eq!(result.status, AnalysisStatus::NoReadableText);
        assert_eq!(result.error.as_deref(), Some("No readable text found"));
        assert!(result.lab_values.is_empty());
        assert!(result.interactions.is_empty());
    }

    #[test]
    fn default_risk_is_unknown() {
        let risk = RiskAssessment::default();
        assert_eq!(risk.level, RiskLevel::Unknown);
        assert!(risk.score.is_none());
    }
}
