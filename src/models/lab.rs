use serde::{Deserialize, Serialize};

use super::enums::LabStatus;

/// A lab value as it arrives from the page scanner or the oracle.
/// Numbers may come through as JSON numbers or as text with separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabValueInput {
    Number(f64),
    Text(String),
}

impl LabValueInput {
    /// Coerce to a finite number. Thousands separators and surrounding
    /// whitespace are ignored; anything else that fails to parse is `None`.
    pub fn coerce(&self) -> Option<f64> {
        let value = match self {
            LabValueInput::Number(n) => *n,
            LabValueInput::Text(s) => {
                let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
                cleaned.parse::<f64>().ok()?
            }
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for LabValueInput {
    fn from(value: f64) -> Self {
        LabValueInput::Number(value)
    }
}

impl From<&str> for LabValueInput {
    fn from(value: &str) -> Self {
        LabValueInput::Text(value.to_string())
    }
}

/// Unverified `{parameter, value, unit}` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLabValue {
    pub parameter: String,
    pub value: LabValueInput,
    #[serde(default)]
    pub unit: String,
}

impl RawLabValue {
    pub fn new(parameter: &str, value: impl Into<LabValueInput>, unit: &str) -> Self {
        Self {
            parameter: parameter.to_string(),
            value: value.into(),
            unit: unit.to_string(),
        }
    }
}

/// A lab value after verification. `status` and `reference_range` are
/// derived from the reference table and absent when no key matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabEntry {
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub status: Option<LabStatus>,
    pub reference_range: Option<String>,
    /// Reference key that produced the status, for audit.
    pub reference_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_strips_thousands_separators() {
        assert_eq!(LabValueInput::from("1,250").coerce(), Some(1250.0));
        assert_eq!(LabValueInput::from(" 6.5 ").coerce(), Some(6.5));
    }

    #[test]
    fn coerce_rejects_non_numeric() {
        assert_eq!(LabValueInput::from("pending").coerce(), None);
        assert_eq!(LabValueInput::from("<5").coerce(), None);
        assert_eq!(LabValueInput::Number(f64::NAN).coerce(), None);
    }

    #[test]
    fn raw_value_deserializes_number_or_string() {
        let a: RawLabValue =
            serde_json::from_str(r#"{"parameter":"HbA1c","value":6.1,"unit":"%"}"#).unwrap();
        let b: RawLabValue =
            serde_json::from_str(r#"{"parameter":"HbA1c","value":"6.1"}"#).unwrap();
        assert_eq!(a.value.coerce(), b.value.coerce());
        assert_eq!(b.unit, "");
    }
}
