pub mod interactions;
pub mod labs;
pub mod reference;

pub use interactions::InteractionChecker;
pub use labs::LabVerifier;
pub use reference::{InteractionEntry, ReferenceRange, ReferenceTables};

use thiserror::Error;

/// Reference-table faults. These are configuration errors, not properties
/// of a document, and abort the pipeline.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference data load failed ({0}): {1}")]
    Load(String, String),

    #[error("Reference data parse failed ({0}): {1}")]
    Parse(String, String),

    #[error("Invalid reference table: {0}")]
    Invalid(String),
}
