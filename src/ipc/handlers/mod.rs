pub mod attendance;
pub mod core;
pub mod import;
pub mod insights;
pub mod notes;
pub mod remarks;
pub mod reports;
pub mod students;
