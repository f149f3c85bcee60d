//! Equation compiler.
//!
//! Pipeline: text -> normalized source -> `symb_anafis` expression ->
//! symbolic partial derivatives -> compiled evaluators run over the `x` column.

pub mod cache;
pub mod functions;
pub mod model;
pub mod names;
pub mod source;

pub use cache::ModelCache;
pub use model::{CompiledModel, Compiler, ParsedEquation, compile_equation};
pub use names::validate_parameter_names;
