//! Input/output helpers.
//!
//! - tabular ingest + validation (`ingest`, `spreadsheet`, `json`)
//! - column-role detection (`detect`) and manual re-assignment (`assign`)
//! - result exports (JSON/CSV) (`export`)

pub mod assign;
pub mod detect;
pub mod export;
pub mod ingest;
pub mod json;
pub mod spreadsheet;

pub use assign::*;
pub use export::*;
pub use ingest::*;
