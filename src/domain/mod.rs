//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the immutable measurement set (`DataSet`, `RawTable`)
//! - column interpretation tags (`ColumnFormat`, `ColumnRole`)
//! - fit configuration and outputs (`FitMethod`, `FitOptions`, `FitResult`)

pub mod dataset;
pub mod types;

pub use dataset::*;
pub use types::*;
