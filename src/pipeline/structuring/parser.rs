use serde::Deserialize;
use serde_json::Value;

use super::types::OracleSummary;
use super::OracleError;
use crate::models::{
    LabValueInput, Medication, PatientDetails, RawLabValue, RiskAssessment, RiskLevel,
};

/// Parse the oracle's answer into a summary.
///
/// Only the outer shape is required: a JSON object, either bare, fenced in
/// ```` ```json ```` or surrounded by prose. Each section is read on its
/// own and a section of the wrong type is treated as absent.
pub fn parse_summary_response(response: &str) -> Result<OracleSummary, OracleError> {
    let malformed = |message: String| OracleError::Malformed {
        message,
        raw: response.to_string(),
    };

    let json_str = extract_json(response).ok_or_else(|| malformed("No JSON object found".into()))?;
    let raw: RawResponse =
        serde_json::from_str(json_str).map_err(|e| malformed(e.to_string()))?;

    Ok(OracleSummary {
        patient: parse_patient(raw.patient_info.as_ref()),
        conditions: array(raw.conditions.as_ref())
            .filter_map(|c| text(c).or_else(|| field(c, "name")))
            .collect(),
        medications: array(raw.medications.as_ref()).filter_map(parse_medication).collect(),
        lab_values: array(raw.lab_values.as_ref()).filter_map(parse_lab).collect(),
        risk: parse_risk(raw.risk_assessment.as_ref()),
        recommendations: array(raw.recommendations.as_ref()).filter_map(text).collect(),
        overall_assessment: raw.overall_assessment.as_ref().and_then(text),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    patient_info: Option<Value>,
    conditions: Option<Value>,
    medications: Option<Value>,
    lab_values: Option<Value>,
    risk_assessment: Option<Value>,
    recommendations: Option<Value>,
    overall_assessment: Option<Value>,
}

/// Locate the JSON object in a response that may carry fences or prose.
fn extract_json(response: &str) -> Option<&str> {
    if let Some(fence) = response.find("```json") {
        let start = fence + 7;
        if let Some(len) = response[start..].find("```") {
            return Some(response[start..start + len].trim());
        }
    }
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

fn array(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value.and_then(Value::as_array).into_iter().flatten()
}

/// Non-empty text from a string or number. Placeholders count as absent.
fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lower = s.to_lowercase();
    if s.is_empty() || lower == "null" || lower == "not available" || lower == "n/a" {
        None
    } else {
        Some(s)
    }
}

fn field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(text)
}

fn parse_patient(value: Option<&Value>) -> PatientDetails {
    let Some(info) = value.filter(|v| v.is_object()) else {
        return PatientDetails::default();
    };
    PatientDetails {
        name: field(info, "name"),
        age: field(info, "age"),
        gender: field(info, "gender"),
        report_date: field(info, "reportDate"),
        doctor: field(info, "doctor"),
    }
}

fn parse_medication(value: &Value) -> Option<Medication> {
    let name = field(value, "name")?;
    Some(Medication {
        name,
        dosage: field(value, "dosage"),
        frequency: field(value, "frequency"),
    })
}

/// `{test, value, normalRange}`. The unit is taken from an explicit `unit`
/// key, else the last token of the normal range ("70-100 mg/dL").
fn parse_lab(value: &Value) -> Option<RawLabValue> {
    let parameter = field(value, "test").or_else(|| field(value, "parameter"))?;
    let reading = match value.get("value")? {
        Value::Number(n) => LabValueInput::Number(n.as_f64()?),
        Value::String(s) => LabValueInput::Text(s.clone()),
        _ => return None,
    };
    let unit = field(value, "unit")
        .or_else(|| {
            field(value, "normalRange")
                .and_then(|range| range.split_whitespace().last().map(str::to_string))
        })
        .unwrap_or_default();
    Some(RawLabValue {
        parameter,
        value: reading,
        unit,
    })
}

fn parse_risk(value: Option<&Value>) -> RiskAssessment {
    let Some(risk) = value.filter(|v| v.is_object()) else {
        return RiskAssessment::default();
    };
    RiskAssessment {
        level: field(risk, "level")
            .map(|l| RiskLevel::parse_loose(&l))
            .unwrap_or(RiskLevel::Unknown),
        score: risk.get("score").and_then(|s| match s {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }),
        factors: array(risk.get("factors")).filter_map(text).collect(),
    }
}
