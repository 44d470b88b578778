pub mod extraction;
pub mod fields;
pub mod import;
pub mod processor; // Document analysis orchestrator
pub mod structuring;
