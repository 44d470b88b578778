use std::sync::Arc;

use super::reference::{ReferenceRange, ReferenceTables};
use crate::models::{Gender, LabEntry, LabStatus, RawLabValue};

/// Classifies raw lab values against the reference table.
///
/// Matching is keyword based: a table key matches when any of its
/// underscore tokens occurs in the lowercased parameter name, and the first
/// matching key in table order wins. Because `cholesterol_total` precedes
/// `ldl`, "LDL Cholesterol" resolves to the total-cholesterol range; callers
/// wanting a different outcome supply a table in a different order.
pub struct LabVerifier {
    tables: Arc<ReferenceTables>,
}

impl LabVerifier {
    pub fn new(tables: Arc<ReferenceTables>) -> Self {
        Self { tables }
    }

    /// Resolve the reference range for a parameter, applying the female
    /// substitution for `_male` keys.
    pub fn resolve(&self, parameter: &str, gender: Gender) -> Option<&ReferenceRange> {
        let lowered = parameter.to_lowercase();
        let winner = self
            .tables
            .ranges()
            .iter()
            .find(|range| range.keywords().any(|kw| lowered.contains(kw)))?;

        if gender == Gender::Female {
            if let Some(base) = winner.key.strip_suffix("_male") {
                if let Some(female) = self.tables.range(&format!("{base}_female")) {
                    return Some(female);
                }
            }
        }
        Some(winner)
    }

    /// Verify a single entry. `None` means the value was not numeric.
    pub fn verify_one(&self, raw: &RawLabValue, gender: Gender) -> Option<LabEntry> {
        let value = raw.value.coerce()?;

        let entry = match self.resolve(&raw.parameter, gender) {
            Some(range) => LabEntry {
                parameter: raw.parameter.clone(),
                value,
                unit: raw.unit.clone(),
                status: Some(classify(value, range)),
                reference_range: Some(range.render()),
                reference_key: Some(range.key.clone()),
            },
            None => LabEntry {
                parameter: raw.parameter.clone(),
                value,
                unit: raw.unit.clone(),
                status: None,
                reference_range: None,
                reference_key: None,
            },
        };
        Some(entry)
    }

    /// Verify a panel. Non-numeric values are dropped; unmatched
    /// parameters pass through without status.
    pub fn verify(&self, raw: &[RawLabValue], gender: Gender) -> Vec<LabEntry> {
        let entries: Vec<LabEntry> = raw
            .iter()
            .filter_map(|r| self.verify_one(r, gender))
            .collect();

        let dropped = raw.len() - entries.len();
        let flagged = entries
            .iter()
            .filter(|e| matches!(e.status, Some(LabStatus::Low | LabStatus::High)))
            .count();
        tracing::debug!(
            verified = entries.len(),
            dropped,
            flagged,
            gender = gender.as_str(),
            "Lab values verified"
        );
        entries
    }
}

fn classify(value: f64, range: &ReferenceRange) -> LabStatus {
    if value < range.min {
        LabStatus::Low
    } else if value > range.max {
        LabStatus::High
    } else {
        LabStatus::Normal
    }
}
