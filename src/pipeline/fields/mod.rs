//! Field recognition over assembled text. Everything here is local and
//! deterministic; the oracle can refine but never replaces these scans.

pub mod conditions;
pub mod labs;
pub mod medications;
pub mod vitals;

pub use conditions::detect_conditions;
pub use labs::scan_lab_values;
pub use medications::scan_medications;
pub use vitals::*;
