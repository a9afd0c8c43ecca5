pub mod enums;
pub mod medication;
pub mod patient;
pub mod vital_sign;

pub use enums::*;
pub use medication::*;
pub use patient::*;
pub use vital_sign::*;
