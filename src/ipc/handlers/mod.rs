pub mod academic_years;
pub mod classes;
pub mod core;
pub mod divisions;
pub mod grading;
pub mod marks;
pub mod reports;
pub mod setup;
pub mod stats;
pub mod students;
pub mod subjects;
