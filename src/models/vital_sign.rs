use serde::{Deserialize, Serialize};

/// The vital-sign labels the field scanner recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VitalLabel {
    Weight,
    HeartRate,
    BloodPressure,
    Temperature,
}

impl VitalLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            VitalLabel::Weight => "weight",
            VitalLabel::HeartRate => "heartRate",
            VitalLabel::BloodPressure => "bloodPressure",
            VitalLabel::Temperature => "temperature",
        }
    }
}

/// Flat record of vital signs recognized in one document.
///
/// Values stay as the numeric strings read from the page so the original
/// formatting survives. A temperature converted from Celsius is the one
/// exception and carries one decimal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub weight: Option<String>,
    pub heart_rate: Option<String>,
    pub systolic: Option<String>,
    pub diastolic: Option<String>,
    pub temperature: Option<String>,
}

impl FieldRecord {
    pub fn is_empty(&self) -> bool {
        self.weight.is_none()
            && self.heart_rate.is_none()
            && self.systolic.is_none()
            && self.diastolic.is_none()
            && self.temperature.is_none()
    }

    /// Number of populated fields; systolic/diastolic count separately.
    pub fn populated(&self) -> usize {
        [
            &self.weight,
            &self.heart_rate,
            &self.systolic,
            &self.diastolic,
            &self.temperature,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }
}
