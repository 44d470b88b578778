use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ReferenceError;

/// Normal interval for one lab parameter.
///
/// Keys use underscores between keywords (`blood_sugar_fasting`); a
/// `_male`/`_female` suffix marks a gender-qualified pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub key: String,
    pub min: f64,
    pub max: f64,
    pub unit: String,
}

impl ReferenceRange {
    /// Underscore-separated keyword tokens of the key.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.key.split('_').filter(|k| !k.is_empty())
    }

    /// Display form, e.g. `70-100 mg/dL`.
    pub fn render(&self) -> String {
        format!("{}-{} {}", self.min, self.max, self.unit)
    }
}

/// One medication and the substances it is known to interact with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEntry {
    pub medication: String,
    pub interacts_with: Vec<String>,
}

/// Built-in ranges. Order matters: lookup takes the first key whose
/// keyword appears in the parameter name.
const BUILTIN_RANGES: &[(&str, f64, f64, &str)] = &[
    ("blood_sugar_fasting", 70.0, 100.0, "mg/dL"),
    ("blood_sugar_random", 70.0, 140.0, "mg/dL"),
    ("hba1c", 4.0, 5.6, "%"),
    ("cholesterol_total", 125.0, 200.0, "mg/dL"),
    ("ldl", 0.0, 100.0, "mg/dL"),
    ("hdl_male", 40.0, 999.0, "mg/dL"),
    ("hdl_female", 50.0, 999.0, "mg/dL"),
    ("triglycerides", 0.0, 150.0, "mg/dL"),
    ("blood_pressure_systolic", 90.0, 120.0, "mmHg"),
    ("blood_pressure_diastolic", 60.0, 80.0, "mmHg"),
    ("creatinine_male", 0.74, 1.35, "mg/dL"),
    ("creatinine_female", 0.59, 1.04, "mg/dL"),
];

const BUILTIN_INTERACTIONS: &[(&str, &[&str])] = &[
    ("warfarin", &["aspirin", "ibuprofen", "naproxen"]),
    ("metformin", &["alcohol", "contrast dye"]),
    ("lisinopril", &["potassium supplements", "spironolactone"]),
    ("simvastatin", &["erythromycin", "clarithromycin", "gemfibrozil"]),
];

/// On-disk shape of a domain-expert supplied table.
#[derive(Debug, Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    ranges: Vec<ReferenceRange>,
    #[serde(default)]
    interactions: Vec<InteractionEntry>,
}

/// Reference ranges and the interaction table. Read-only once built, so a
/// single instance is shared across pipelines behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    ranges: Vec<ReferenceRange>,
    interactions: Vec<InteractionEntry>,
}

impl ReferenceTables {
    /// The compiled-in tables.
    pub fn builtin() -> Self {
        Self {
            ranges: BUILTIN_RANGES
                .iter()
                .map(|(key, min, max, unit)| ReferenceRange {
                    key: (*key).to_string(),
                    min: *min,
                    max: *max,
                    unit: (*unit).to_string(),
                })
                .collect(),
            interactions: BUILTIN_INTERACTIONS
                .iter()
                .map(|(med, others)| InteractionEntry {
                    medication: (*med).to_string(),
                    interacts_with: others.iter().map(|o| (*o).to_string()).collect(),
                })
                .collect(),
        }
    }

    /// Build from explicit parts, rejecting a misconfigured table.
    pub fn from_parts(
        ranges: Vec<ReferenceRange>,
        interactions: Vec<InteractionEntry>,
    ) -> Result<Self, ReferenceError> {
        let tables = Self {
            ranges,
            interactions: interactions
                .into_iter()
                .map(|e| InteractionEntry {
                    medication: e.medication.trim().to_lowercase(),
                    interacts_with: e
                        .interacts_with
                        .iter()
                        .map(|o| o.trim().to_lowercase())
                        .collect(),
                })
                .collect(),
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Load a JSON table (`{"ranges": [...], "interactions": [...]}`).
    /// A section left out of the file falls back to the built-in one.
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ReferenceError::Load(path.display().to_string(), e.to_string()))?;
        let file: ReferenceFile = serde_json::from_str(&json)
            .map_err(|e| ReferenceError::Parse(path.display().to_string(), e.to_string()))?;

        let builtin = Self::builtin();
        let ranges = if file.ranges.is_empty() {
            builtin.ranges
        } else {
            file.ranges
        };
        let interactions = if file.interactions.is_empty() {
            builtin.interactions
        } else {
            file.interactions
        };

        let tables = Self::from_parts(ranges, interactions)?;
        tracing::info!(
            path = %path.display(),
            ranges = tables.ranges.len(),
            interactions = tables.interactions.len(),
            "Loaded reference tables"
        );
        Ok(tables)
    }

    fn validate(&self) -> Result<(), ReferenceError> {
        if self.ranges.is_empty() {
            return Err(ReferenceError::Invalid("reference range table is empty".into()));
        }

        let mut seen = HashSet::new();
        for range in &self.ranges {
            if range.keywords().next().is_none() {
                return Err(ReferenceError::Invalid(format!(
                    "range key '{}' has no keywords",
                    range.key
                )));
            }
            if range.key != range.key.to_lowercase() {
                return Err(ReferenceError::Invalid(format!(
                    "range key '{}' must be lowercase",
                    range.key
                )));
            }
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(ReferenceError::Invalid(format!(
                    "range '{}' has invalid bounds {}..{}",
                    range.key, range.min, range.max
                )));
            }
            if !seen.insert(range.key.as_str()) {
                return Err(ReferenceError::Invalid(format!(
                    "duplicate range key '{}'",
                    range.key
                )));
            }
        }

        let mut meds = HashSet::new();
        for entry in &self.interactions {
            if entry.medication.is_empty() || entry.interacts_with.iter().any(|o| o.is_empty()) {
                return Err(ReferenceError::Invalid(format!(
                    "interaction entry '{}' has an empty name",
                    entry.medication
                )));
            }
            if !meds.insert(entry.medication.as_str()) {
                return Err(ReferenceError::Invalid(format!(
                    "duplicate interaction entry '{}'",
                    entry.medication
                )));
            }
        }

        Ok(())
    }

    /// Ranges in lookup order.
    pub fn ranges(&self) -> &[ReferenceRange] {
        &self.ranges
    }

    pub fn range(&self, key: &str) -> Option<&ReferenceRange> {
        self.ranges.iter().find(|r| r.key == key)
    }

    pub fn interactions(&self) -> &[InteractionEntry] {
        &self.interactions
    }

    /// Interaction list for a lowercased medication name.
    pub fn interactions_for(&self, medication: &str) -> Option<&[String]> {
        self.interactions
            .iter()
            .find(|e| e.medication == medication)
            .map(|e| e.interacts_with.as_slice())
    }
}

impl Default for ReferenceTables {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_validate() {
        let builtin = ReferenceTables::builtin();
        let rebuilt =
            ReferenceTables::from_parts(builtin.ranges.clone(), builtin.interactions.clone());
        assert!(rebuilt.is_ok());
        assert_eq!(builtin.ranges().len(), 12);
        assert_eq!(builtin.interactions().len(), 4);
    }

    #[test]
    fn builtin_order_starts_with_fasting_sugar() {
        let tables = ReferenceTables::builtin();
        let keys: Vec<&str> = tables
            .ranges()
            .iter()
            .map(|r| r.key.as_str())
            .take(4)
            .collect();
        assert_eq!(
            keys,
            ["blood_sugar_fasting", "blood_sugar_random", "hba1c", "cholesterol_total"]
        );
    }

    #[test]
    fn render_formats_bounds_and_unit() {
        let tables = ReferenceTables::builtin();
        assert_eq!(tables.range("blood_sugar_fasting").unwrap().render(), "70-100 mg/dL");
        assert_eq!(tables.range("creatinine_male").unwrap().render(), "0.74-1.35 mg/dL");
    }

    #[test]
    fn keywords_split_on_underscore() {
        let tables = ReferenceTables::builtin();
        let kws: Vec<&str> = tables.range("hdl_female").unwrap().keywords().collect();
        assert_eq!(kws, ["hdl", "female"]);
    }

    #[test]
    fn interactions_for_is_exact_lowercase_lookup() {
        let tables = ReferenceTables::builtin();
        assert_eq!(
            tables.interactions_for("warfarin").unwrap(),
            ["aspirin", "ibuprofen", "naproxen"]
        );
        assert!(tables.interactions_for("Warfarin").is_none());
        assert!(tables.interactions_for("aspirin").is_none());
    }

    #[test]
    fn rejects_inverted_bounds() {
        let ranges = vec![ReferenceRange {
            key: "potassium".into(),
            min: 5.0,
            max: 3.5,
            unit: "mmol/L".into(),
        }];
        let err = ReferenceTables::from_parts(ranges, vec![]).unwrap_err();
        assert!(matches!(err, ReferenceError::Invalid(_)));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let range = ReferenceRange {
            key: "ldl".into(),
            min: 0.0,
            max: 100.0,
            unit: "mg/dL".into(),
        };
        let err = ReferenceTables::from_parts(vec![range.clone(), range], vec![]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_empty_table() {
        assert!(ReferenceTables::from_parts(vec![], vec![]).is_err());
    }

    #[test]
    fn from_parts_lowercases_interaction_names() {
        let tables = ReferenceTables::from_parts(
            ReferenceTables::builtin().ranges,
            vec![InteractionEntry {
                medication: " Clopidogrel ".into(),
                interacts_with: vec!["Omeprazole".into()],
            }],
        )
        .unwrap();
        assert_eq!(tables.interactions_for("clopidogrel").unwrap(), ["omeprazole"]);
    }

    #[test]
    fn load_from_file_keeps_builtin_interactions_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.json");
        std::fs::write(
            &path,
            r#"{"ranges":[{"key":"potassium","min":3.5,"max":5.1,"unit":"mmol/L"}]}"#,
        )
        .unwrap();

        let tables = ReferenceTables::load(&path).unwrap();
        assert_eq!(tables.ranges().len(), 1);
        assert_eq!(tables.range("potassium").unwrap().unit, "mmol/L");
        assert!(tables.interactions_for("warfarin").is_some());
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ReferenceTables::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ReferenceError::Load(_, _)));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        let err = ReferenceTables::load(&bad).unwrap_err();
        assert!(matches!(err, ReferenceError::Parse(_, _)));
    }
}
