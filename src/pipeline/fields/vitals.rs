//! Vital-sign field extraction.
//!
//! A single pass over assembled text, one line at a time, driven by an
//! explicit two-state machine. A label may carry its value on the same line
//! ("BP: 120/80") or leave it for a following line ("Weight" / "70 kg").
//! Per line the first matching rule wins:
//!
//! 1. blood-pressure label with an inline `NN/NN` reading: assign both
//! 2. blood-pressure label alone: wait for a reading
//! 3. weight, heart-rate or temperature label with a numeral: assign
//! 4. the same labels without a numeral: wait for a value
//! 5. waiting, and the line has a numeral (`NN/NN` for blood pressure): assign
//! 6. anything else: discard the line, state unchanged
//!
//! A label still waiting at end of input is dropped. Later values overwrite
//! earlier ones.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{FieldRecord, VitalLabel};
use crate::pipeline_config::{TemperatureConfig, TemperatureUnitPolicy};

static BP_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:blood\s*pressure|b\.?\s?p)\b").expect("valid blood pressure regex")
});
static BP_READING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,3})\s*/\s*(\d{2,3})").expect("valid reading regex"));
static WEIGHT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:weight|wt)\b").expect("valid weight regex"));
static HEART_RATE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:heart\s*rate|pulse(?:\s*rate)?)\b|^\s*hr\b").expect("valid heart rate regex")
});
static TEMPERATURE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:temperature|temp)\b").expect("valid temperature regex"));
static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid numeral regex"));
static CELSIUS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[°º]\s*c\b|\d\s*c\b|\bcelsius\b|\bdeg(?:rees?)?\.?\s*c\b|\(c\)")
        .expect("valid celsius regex")
});
static FAHRENHEIT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[°º]\s*f\b|\d\s*f\b|\bfahrenheit\b|\bdeg(?:rees?)?\.?\s*f\b|\(f\)")
        .expect("valid fahrenheit regex")
});

/// Unit named explicitly next to a temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    fn detect(line: &str) -> Option<Self> {
        if CELSIUS_MARKER.is_match(line) {
            Some(Self::Celsius)
        } else if FAHRENHEIT_MARKER.is_match(line) {
            Some(Self::Fahrenheit)
        } else {
            None
        }
    }
}

/// A label seen without its value. The unit marker on the label's line is
/// remembered so "Temperature (°C)" / "37.2" still converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingLabel {
    pub label: VitalLabel,
    pub unit: Option<TemperatureUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Scanning,
    AwaitingValueFor(PendingLabel),
}

/// What one line does to the record and the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    AssignBloodPressure { systolic: String, diastolic: String },
    Assign { label: VitalLabel, value: String },
    Await(PendingLabel),
    Discard,
}

impl LineAction {
    pub fn next_state(&self, current: ScanState) -> ScanState {
        match self {
            LineAction::AssignBloodPressure { .. } | LineAction::Assign { .. } => ScanState::Scanning,
            LineAction::Await(pending) => ScanState::AwaitingValueFor(*pending),
            LineAction::Discard => current,
        }
    }
}

pub struct FieldExtractor {
    temperature: TemperatureConfig,
}

impl FieldExtractor {
    pub fn new(temperature: TemperatureConfig) -> Self {
        Self { temperature }
    }

    /// Scan `text` and build the vital-sign record.
    pub fn extract(&self, text: &str) -> FieldRecord {
        let mut record = FieldRecord::default();
        let mut state = ScanState::Scanning;

        for line in text.lines() {
            let action = self.classify_line(line, state);
            state = action.next_state(state);
            match action {
                LineAction::AssignBloodPressure {
                    systolic,
                    diastolic,
                } => {
                    record.systolic = Some(systolic);
                    record.diastolic = Some(diastolic);
                }
                LineAction::Assign { label, value } => {
                    let slot = match label {
                        VitalLabel::Weight => &mut record.weight,
                        VitalLabel::HeartRate => &mut record.heart_rate,
                        VitalLabel::Temperature => &mut record.temperature,
                        // Blood pressure always arrives as a pair
                        VitalLabel::BloodPressure => continue,
                    };
                    *slot = Some(value);
                }
                LineAction::Await(_) | LineAction::Discard => {}
            }
        }

        if let ScanState::AwaitingValueFor(pending) = state {
            tracing::debug!(label = pending.label.as_str(), "Label without value at end of text");
        }
        tracing::debug!(fields = record.populated(), "Vital-sign scan complete");
        record
    }

    /// Apply the transition rules to one line.
    pub fn classify_line(&self, line: &str, state: ScanState) -> LineAction {
        // Rules 1 and 2
        if BP_LABEL.is_match(line) {
            return match blood_pressure(line) {
                Some((systolic, diastolic)) => LineAction::AssignBloodPressure {
                    systolic,
                    diastolic,
                },
                None => LineAction::Await(PendingLabel {
                    label: VitalLabel::BloodPressure,
                    unit: None,
                }),
            };
        }

        // Rules 3 and 4
        if let Some(label) = scalar_label(line) {
            return match first_numeral(line) {
                Some(raw) => LineAction::Assign {
                    label,
                    value: self.finish_value(label, raw, line, None),
                },
                None => LineAction::Await(PendingLabel {
                    label,
                    unit: TemperatureUnit::detect(line),
                }),
            };
        }

        // Rule 5
        if let ScanState::AwaitingValueFor(pending) = state {
            if pending.label == VitalLabel::BloodPressure {
                if let Some((systolic, diastolic)) = blood_pressure(line) {
                    return LineAction::AssignBloodPressure {
                        systolic,
                        diastolic,
                    };
                }
            } else if let Some(raw) = first_numeral(line) {
                return LineAction::Assign {
                    label: pending.label,
                    value: self.finish_value(pending.label, raw, line, pending.unit),
                };
            }
        }

        LineAction::Discard
    }

    fn finish_value(
        &self,
        label: VitalLabel,
        raw: &str,
        line: &str,
        label_unit: Option<TemperatureUnit>,
    ) -> String {
        if label != VitalLabel::Temperature {
            return raw.to_string();
        }
        let unit = TemperatureUnit::detect(line).or(label_unit);
        match raw.parse::<f64>() {
            Ok(value) if self.is_celsius(value, unit) => {
                format!("{:.1}", value * 9.0 / 5.0 + 32.0)
            }
            _ => raw.to_string(),
        }
    }

    /// Readings at or above the threshold are Fahrenheit whatever the marker.
    fn is_celsius(&self, value: f64, unit: Option<TemperatureUnit>) -> bool {
        if value >= self.temperature.celsius_threshold {
            return false;
        }
        match self.temperature.policy {
            TemperatureUnitPolicy::InferBelowThreshold => unit != Some(TemperatureUnit::Fahrenheit),
            TemperatureUnitPolicy::RequireCelsiusMarker => unit == Some(TemperatureUnit::Celsius),
        }
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(TemperatureConfig::default())
    }
}

fn scalar_label(line: &str) -> Option<VitalLabel> {
    if WEIGHT_LABEL.is_match(line) {
        Some(VitalLabel::Weight)
    } else if HEART_RATE_LABEL.is_match(line) {
        Some(VitalLabel::HeartRate)
    } else if TEMPERATURE_LABEL.is_match(line) {
        Some(VitalLabel::Temperature)
    } else {
        None
    }
}

fn blood_pressure(line: &str) -> Option<(String, String)> {
    BP_READING
        .captures(line)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// The first numeral on the line is the line's value, even when more follow.
fn first_numeral(line: &str) -> Option<&str> {
    NUMERAL.find(line).map(|m| m.as_str())
}
