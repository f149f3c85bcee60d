//! Equation text to `CompiledModel`.

use std::collections::HashSet;

use nalgebra::DMatrix;
use symb_anafis::{CompiledEvaluator, Diff, Expr, parse, symb};

use crate::error::{LabFitError, Result};
use crate::expr::functions::{CONSTANT_NAMES, constant_value};
use crate::expr::names::validate_parameter_names;
use crate::expr::source::{normalize, strip_assignment};

/// Depth and size limits handed to the differentiator.
const MAX_DEPTH: usize = 100;
const MAX_NODES: usize = 10_000;

/// An equation ready for fitting.
///
/// `parameters` is sorted lexically and every per-parameter vector
/// (`derivatives`, parameter values, errors) follows that order.
///
/// Compiled functions take their inputs as `[x, parameters.., constants..]`.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    equation_text: String,
    parameters: Vec<String>,
    constants: Vec<f64>,
    expression: Expr,
    derivative_exprs: Vec<Expr>,
    function: CompiledEvaluator,
    derivatives: Vec<CompiledEvaluator>,
    x_derivative: Option<CompiledEvaluator>,
}

impl CompiledModel {
    pub fn equation_text(&self) -> &str {
        &self.equation_text
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn n_params(&self) -> usize {
        self.parameters.len()
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    pub fn derivative_expressions(&self) -> &[Expr] {
        &self.derivative_exprs
    }

    pub fn has_x_derivative(&self) -> bool {
        self.x_derivative.is_some()
    }

    /// `f(x_i; params)` for every `x_i`.
    pub fn evaluate(&self, params: &[f64], xs: &[f64]) -> Vec<f64> {
        self.eval_batch(&self.function, params, xs)
    }

    pub fn evaluate_at(&self, params: &[f64], x: f64) -> f64 {
        match self.inputs(params) {
            Some(mut inputs) => {
                inputs[0] = x;
                self.function.evaluate(&inputs)
            }
            None => f64::NAN,
        }
    }

    /// `∂f/∂p_j` at every `x_i`, in parameter order.
    pub fn evaluate_derivative(&self, j: usize, params: &[f64], xs: &[f64]) -> Vec<f64> {
        match self.derivatives.get(j) {
            Some(d) => self.eval_batch(d, params, xs),
            None => vec![f64::NAN; xs.len()],
        }
    }

    /// Jacobian `J[i, j] = ∂f(x_i)/∂p_j` (n × p).
    pub fn jacobian(&self, params: &[f64], xs: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::<f64>::zeros(xs.len(), self.parameters.len());
        for (j, d) in self.derivatives.iter().enumerate() {
            let column = self.eval_batch(d, params, xs);
            jac.set_column(j, &nalgebra::DVector::from_vec(column));
        }
        jac
    }

    /// `∂f/∂x` at every `x_i`.
    ///
    /// Falls back to central differences when the symbolic derivative could not
    /// be formed.
    pub fn x_slope(&self, params: &[f64], xs: &[f64]) -> Vec<f64> {
        if let Some(dx) = &self.x_derivative {
            return self.eval_batch(dx, params, xs);
        }
        xs.iter()
            .map(|&x| {
                let h = f64::EPSILON.cbrt() * x.abs().max(1.0);
                let hi = self.evaluate_at(params, x + h);
                let lo = self.evaluate_at(params, x - h);
                (hi - lo) / (2.0 * h)
            })
            .collect()
    }

    /// Input row template, `None` when `params` has the wrong length.
    fn inputs(&self, params: &[f64]) -> Option<Vec<f64>> {
        if params.len() != self.parameters.len() {
            return None;
        }
        let mut inputs = Vec::with_capacity(1 + params.len() + self.constants.len());
        inputs.push(0.0);
        inputs.extend_from_slice(params);
        inputs.extend_from_slice(&self.constants);
        Some(inputs)
    }

    fn eval_batch(&self, f: &CompiledEvaluator, params: &[f64], xs: &[f64]) -> Vec<f64> {
        if xs.is_empty() {
            return Vec::new();
        }
        let Some(inputs) = self.inputs(params) else {
            return vec![f64::NAN; xs.len()];
        };
        let broadcast: Vec<Vec<f64>> = inputs[1..].iter().map(|&v| vec![v; xs.len()]).collect();
        let mut columns: Vec<&[f64]> = Vec::with_capacity(inputs.len());
        columns.push(xs);
        columns.extend(broadcast.iter().map(Vec::as_slice));

        let mut out = vec![0.0; xs.len()];
        match f.eval_batch(&columns, &mut out, None) {
            Ok(()) => out,
            Err(e) => {
                log::debug!("batch evaluation of '{}' failed: {e}", self.equation_text.trim());
                vec![f64::NAN; xs.len()]
            }
        }
    }
}

/// Parsed equation with its parameter list resolved, not yet differentiated.
#[derive(Debug, Clone)]
pub struct ParsedEquation {
    text: String,
    expression: Expr,
    parameters: Vec<String>,
    constants: Vec<String>,
}

impl ParsedEquation {
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }
}

/// Turns equation text into models.
#[derive(Debug, Clone)]
pub struct Compiler {
    x_symbol: String,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new("x")
    }
}

impl Compiler {
    pub fn new(x_symbol: impl Into<String>) -> Self {
        Self {
            x_symbol: x_symbol.into(),
        }
    }

    pub fn x_symbol(&self) -> &str {
        &self.x_symbol
    }

    /// Parse `text` and resolve its parameters. With `declared`, every free
    /// symbol must be one of those names; otherwise the free symbols become
    /// the parameters.
    pub fn parse(&self, text: &str, declared: Option<&[String]>) -> Result<ParsedEquation> {
        let source = normalize(strip_assignment(text)).map_err(|cause| LabFitError::formula(text, cause))?;

        let mut known: HashSet<String> = CONSTANT_NAMES.iter().map(|c| c.to_string()).collect();
        known.insert(self.x_symbol.clone());
        if let Some(names) = declared {
            known.extend(names.iter().cloned());
        }
        let expression = parse(&source, &known, &HashSet::new(), None)
            .map_err(|e| LabFitError::formula(text, e.to_string()))?;

        let mut found = Vec::new();
        let mut constants = Vec::new();
        for name in expression.variables() {
            if name == self.x_symbol {
                continue;
            }
            if constant_value(&name).is_some() {
                constants.push(name);
            } else {
                found.push(name);
            }
        }
        found.sort();
        constants.sort();

        let parameters = match declared {
            Some(declared) => {
                validate_parameter_names(declared, &self.x_symbol)?;
                if let Some(unknown) = found.iter().find(|name| !declared.contains(*name)) {
                    return Err(LabFitError::formula(text, format!("unknown symbol '{unknown}'")));
                }
                let mut sorted = declared.to_vec();
                sorted.sort();
                sorted
            }
            None => {
                validate_parameter_names(&found, &self.x_symbol)?;
                found
            }
        };

        Ok(ParsedEquation {
            text: text.to_string(),
            expression,
            parameters,
            constants,
        })
    }

    /// Differentiate and compile a parsed equation.
    pub fn build(&self, parsed: ParsedEquation) -> Result<CompiledModel> {
        let ParsedEquation {
            text,
            expression,
            parameters,
            constants,
        } = parsed;
        let diff = Diff::new().domain_safe(true).max_depth(MAX_DEPTH).max_nodes(MAX_NODES);

        let mut derivative_exprs = Vec::with_capacity(parameters.len());
        for name in &parameters {
            let d = diff
                .differentiate(&expression, &symb(name))
                .map_err(|e| LabFitError::Derivative {
                    parameter: name.clone(),
                    cause: e.to_string(),
                })?;
            derivative_exprs.push(d);
        }

        let mut inputs = Vec::with_capacity(1 + parameters.len() + constants.len());
        inputs.push(self.x_symbol.clone());
        inputs.extend(parameters.iter().cloned());
        inputs.extend(constants.iter().cloned());
        let compile = |e: &Expr| {
            CompiledEvaluator::compile(e, inputs.as_slice(), None).map_err(|err| LabFitError::formula(&text, err.to_string()))
        };

        let function = compile(&expression)?;
        let derivatives = derivative_exprs.iter().map(&compile).collect::<Result<Vec<_>>>()?;

        let x_derivative = match diff.differentiate(&expression, &symb(&self.x_symbol)) {
            Ok(dx) => compile(&dx).ok(),
            Err(cause) => {
                log::debug!("no symbolic x-derivative for '{text}' ({cause}); using finite differences");
                None
            }
        };

        log::debug!(
            "compiled '{}' with parameters [{}]",
            text.trim(),
            parameters.join(", ")
        );

        let constants = constants.iter().filter_map(|c| constant_value(c)).collect();
        Ok(CompiledModel {
            equation_text: text,
            parameters,
            constants,
            expression,
            derivative_exprs,
            function,
            derivatives,
            x_derivative,
        })
    }

    /// Parse, differentiate and compile `text`.
    pub fn compile(&self, text: &str, declared: Option<&[String]>) -> Result<CompiledModel> {
        self.build(self.parse(text, declared)?)
    }
}

/// Compile with automatic parameter extraction and `x` as the variable.
pub fn compile_equation(text: &str) -> Result<CompiledModel> {
    Compiler::default().compile(text, None)
}
