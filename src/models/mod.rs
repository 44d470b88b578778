pub mod analysis;
pub mod enums;
pub mod lab;
pub mod medication;
pub mod vital_sign;

pub use analysis::*;
pub use enums::*;
pub use lab::*;
pub use medication::*;
pub use vital_sign::*;
