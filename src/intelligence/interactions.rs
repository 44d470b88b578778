use std::sync::Arc;

use super::reference::ReferenceTables;
use crate::models::Medication;

/// Flags known interacting pairs within one medication list.
pub struct InteractionChecker {
    tables: Arc<ReferenceTables>,
}

impl InteractionChecker {
    pub fn new(tables: Arc<ReferenceTables>) -> Self {
        Self { tables }
    }

    /// Warnings for every (A, B) where A is a table key, B is in A's list
    /// and B is also in the input. Input order drives A, table order drives
    /// B. Symmetric table entries produce one warning per direction.
    pub fn check_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let lowered: Vec<String> = names
            .iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .collect();

        let mut warnings = Vec::new();
        for med in &lowered {
            let Some(partners) = self.tables.interactions_for(med) else {
                continue;
            };
            for partner in partners {
                if lowered.iter().any(|m| m == partner) {
                    warnings.push(format!("Potential interaction: {med} and {partner}"));
                }
            }
        }

        if !warnings.is_empty() {
            tracing::info!(
                medications = lowered.len(),
                interactions = warnings.len(),
                "Drug interactions flagged"
            );
        }
        warnings
    }

    pub fn check(&self, medications: &[Medication]) -> Vec<String> {
        let names: Vec<&str> = medications.iter().map(|m| m.name.as_str()).collect();
        self.check_names(&names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::reference::InteractionEntry;

    fn checker() -> InteractionChecker {
        InteractionChecker::new(Arc::new(ReferenceTables::builtin()))
    }

    #[test]
    fn warfarin_and_aspirin_yield_one_warning() {
        let warnings = checker().check_names(&["Warfarin", "Aspirin"]);
        assert_eq!(warnings, vec!["Potential interaction: warfarin and aspirin"]);
    }

    #[test]
    fn order_follows_input_then_table() {
        let warnings = checker().check_names(&["naproxen", "Simvastatin", "aspirin", "WARFARIN", "Gemfibrozil"]);
        assert_eq!(
            warnings,
            vec![
                "Potential interaction: simvastatin and gemfibrozil",
                "Potential interaction: warfarin and aspirin",
                "Potential interaction: warfarin and naproxen",
            ]
        );
    }

    #[test]
    fn no_partner_present_no_warning() {
        assert!(checker().check_names(&["Metformin", "Atorvastatin"]).is_empty());
        assert!(checker().check_names::<&str>(&[]).is_empty());
    }

    #[test]
    fn multi_word_partner_matches_whole_name() {
        let warnings = checker().check_names(&["Lisinopril", " Potassium Supplements "]);
        assert_eq!(
            warnings,
            vec!["Potential interaction: lisinopril and potassium supplements"]
        );
        assert!(checker().check_names(&["Lisinopril", "Potassium"]).is_empty());
    }

    #[test]
    fn symmetric_entries_warn_in_both_directions() {
        let tables = ReferenceTables::from_parts(
            ReferenceTables::builtin().ranges().to_vec(),
            vec![
                InteractionEntry {
                    medication: "warfarin".into(),
                    interacts_with: vec!["aspirin".into()],
                },
                InteractionEntry {
                    medication: "aspirin".into(),
                    interacts_with: vec!["warfarin".into()],
                },
            ],
        )
        .unwrap();
        let warnings = InteractionChecker::new(Arc::new(tables)).check_names(&["Aspirin", "Warfarin"]);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0], "Potential interaction: aspirin and warfarin");
        assert_eq!(warnings[1], "Potential interaction: warfarin and aspirin");
    }

    #[test]
    fn check_uses_medication_names() {
        let meds = vec![
            Medication {
                name: "Simvastatin".into(),
                dosage: Some("20 mg".into()),
                frequency: None,
            },
            Medication::named("Clarithromycin"),
        ];
        assert_eq!(
            checker().check(&meds),
            vec!["Potential interaction: simvastatin and clarithromycin"]
        );
    }
}
