use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
}

impl Medication {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dosage: None,
            frequency: None,
        }
    }

    /// Lookup key: trimmed, lowercased name.
    pub fn key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}
