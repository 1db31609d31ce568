pub mod file;
pub mod unit;

pub use file::{FileApplier, FileApplyError};
pub use unit::{UnitApplier, UnitApplyError};
