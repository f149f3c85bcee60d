//! `labfit` library crate.
//!
//! The binary (`labfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable from another front-end (GUI, notebook bindings)
//! - code stays easy to navigate as the project grows
//!
//! Main entry points:
//!
//! - [`io::read_tabular`]: measurement file to `DataSet`
//! - [`expr::compile_equation`]: equation text to `CompiledModel`
//! - [`fit::run_fit`]: one fit, any method
//! - [`history::FitHistory`]: navigable log of completed fits
//! - [`session::Session`]: all of the above behind one owner

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod expr;
pub mod fit;
pub mod history;
pub mod io;
pub mod math;
pub mod report;
pub mod session;
