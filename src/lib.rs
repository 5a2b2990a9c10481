//! Grade and division engine for primary-leaving style assessment, plus the
//! JSON-lines sidecar that serves it over a workspace database.

pub mod calc;
pub mod config;
pub mod db;
pub mod division;
pub mod grading;
pub mod ipc;
pub mod logging;
pub mod stats;
