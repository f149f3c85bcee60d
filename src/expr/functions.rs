//! Whitelisted functions and constants.
//!
//! Any identifier in an equation that is not listed here and is not the
//! independent variable becomes a fit parameter.

/// Names accepted as function calls. `log`, `min`, `max` and `sign` are
/// rewritten before parsing (see `expr::source`).
pub const FUNCTION_NAMES: &[&str] = &[
    "sin", "cos", "tan", "sec", "csc", "cot", "asin", "acos", "atan", "sinh", "cosh", "tanh", "asinh",
    "acosh", "atanh", "exp", "log", "ln", "log10", "log2", "sqrt", "cbrt", "abs", "sign", "floor",
    "ceil", "gamma", "digamma", "erf", "erfc", "beta", "min", "max",
];

/// Names resolved to numeric constants.
pub const CONSTANT_NAMES: &[&str] = &["pi", "e", "E", "oo", "inf", "GoldenRatio", "EulerGamma"];

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub fn is_function_name(name: &str) -> bool {
    FUNCTION_NAMES.contains(&name)
}

pub fn constant_value(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" | "E" => Some(std::f64::consts::E),
        "oo" | "inf" => Some(f64::INFINITY),
        "GoldenRatio" => Some((1.0 + 5.0_f64.sqrt()) / 2.0),
        "EulerGamma" => Some(EULER_GAMMA),
        _ => None,
    }
}

/// True when `name` equals (ignoring case) any whitelisted function or constant.
pub fn collides_with_builtin(name: &str) -> bool {
    FUNCTION_NAMES
        .iter()
        .chain(CONSTANT_NAMES.iter())
        .any(|b| b.eq_ignore_ascii_case(name))
}
