//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{DataSet, FitResult, UncertaintyProfile};
use crate::expr::CompiledModel;
use crate::fit::{FitWarning, MethodPolicy};
use crate::history::FitHistory;
use crate::io::Preview;
use crate::report::PointResidual;

/// Data set overview: format, size, ranges and the method policy.
pub fn format_data_summary(data: &DataSet, policy: &MethodPolicy) -> String {
    let mut out = String::new();

    out.push_str("=== labfit - data ===\n");
    out.push_str(&format!("Format: {}\n", data.column_format()));
    out.push_str(&format!("Points: n={}", data.len()));
    if let (Some(x), Some(y)) = (range(data.x()), range(data.y())) {
        out.push_str(&format!(
            " | x=[{:.4}, {:.4}] | y=[{:.4}, {:.4}]",
            x.0, x.1, y.0, y.1
        ));
    }
    out.push('\n');
    out.push_str(&format!("Uncertainties: {}\n", profile_label(policy.profile())));

    let methods: Vec<&str> = policy
        .available_methods()
        .into_iter()
        .map(|m| m.display_name())
        .collect();
    out.push_str(&format!(
        "Methods: {} (default {})\n",
        methods.join(", "),
        policy.default_method()
    ));
    out
}

fn profile_label(profile: UncertaintyProfile) -> &'static str {
    match profile {
        UncertaintyProfile::None => "none",
        UncertaintyProfile::YOnly => "σy only",
        UncertaintyProfile::XOnly => "σx only",
        UncertaintyProfile::Both => "σx and σy",
    }
}

fn range(v: &[f64]) -> Option<(f64, f64)> {
    let first = *v.first()?;
    Some(v.iter().fold((first, first), |(lo, hi), &x| (lo.min(x), hi.max(x))))
}

/// The first rows of the loaded table.
pub fn format_preview(preview: &Preview) -> String {
    let mut out = String::new();
    let header: Vec<String> = preview.headers.iter().map(|h| format!("{:>12}", truncate(h, 12))).collect();
    out.push_str(header.join(" ").trim_end());
    out.push('\n');
    let rule: Vec<String> = preview.headers.iter().map(|_| "-".repeat(12)).collect();
    out.push_str(&rule.join(" "));
    out.push('\n');
    for row in &preview.rows {
        let cells: Vec<String> = row.iter().map(|c| format!("{:>12}", truncate(c, 12))).collect();
        out.push_str(cells.join(" ").trim_end());
        out.push('\n');
    }
    if preview.total_rows > preview.rows.len() {
        out.push_str(&format!("... ({} rows total)\n", preview.total_rows));
    }
    out
}

/// A compiled equation: parameters and symbolic derivatives.
pub fn format_model(model: &CompiledModel) -> String {
    let mut out = String::new();
    out.push_str(&format!("Equation: {}\n", model.equation_text().trim()));
    out.push_str(&format!("Parsed:   {}\n", model.expression()));
    out.push_str(&format!("Parameters: {}\n", model.parameters().join(", ")));
    for (name, d) in model.parameters().iter().zip(model.derivative_expressions()) {
        out.push_str(&format!("  ∂f/∂{name} = {d}\n"));
    }
    out
}

/// Parameter table plus goodness-of-fit statistics.
pub fn format_fit_result(result: &FitResult, warning: Option<&FitWarning>) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {} fit: {} ===\n", result.method, result.equation_text.trim()));
    if let Some(w) = warning {
        out.push_str(&format!("warning: {w}\n"));
    }

    out.push_str(&format!("{:<16} {:>16} {:>16}\n", "parameter", "value", "error"));
    out.push_str(&format!("{:-<16} {:-<16} {:-<16}\n", "", "", ""));
    for ((name, value), error) in result
        .parameters
        .iter()
        .zip(&result.parameter_values)
        .zip(&result.parameter_errors)
    {
        out.push_str(&format!(
            "{:<16} {:>16} {:>16}\n",
            truncate(name, 16),
            fmt_num(*value),
            fmt_num(*error)
        ));
    }

    out.push('\n');
    out.push_str(&format!("χ²      = {}\n", fmt_num(result.chi_squared)));
    out.push_str(&format!(
        "χ²/dof  = {}\n",
        result.reduced_chi_squared.map_or_else(|| "n/a".to_string(), fmt_num)
    ));
    out.push_str(&format!("R²      = {}\n", fmt_num(result.r_squared)));
    out.push_str(&format!("n       = {}\n", result.n_points));

    let d = &result.diagnostics;
    out.push_str(&format!(
        "iterations={} converged={}",
        d.iterations,
        if d.converged { "yes" } else { "no" }
    ));
    if let Some(k) = d.resamples_used {
        out.push_str(&format!(" resamples={k}"));
    }
    if let Some(rate) = d.acceptance_rate {
        out.push_str(&format!(" acceptance={rate:.3}"));
    }
    if let Some(k) = d.inliers {
        out.push_str(&format!(" inliers={k}/{}", result.n_points));
    }
    out.push('\n');
    out
}

/// Points sorted by distance from the curve.
pub fn format_residual_table(rows: &[PointResidual]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:>5} {:>12} {:>12} {:>12} {:>12} {:>10}\n", "row", "x", "y", "y_fit", "residual", "r/σy").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<5} {:-<12} {:-<12} {:-<12} {:-<12} {:-<10}\n", "", "", "", "", "", "").trim_end());
    out.push('\n');
    for r in rows {
        let normalized = r.normalized.map_or_else(String::new, |v| format!("{v:.3}"));
        out.push_str(
            format!(
                "{:>5} {:>12} {:>12} {:>12} {:>12} {:>10}\n",
                r.row,
                fmt_num(r.x),
                fmt_num(r.y),
                fmt_num(r.y_fit),
                fmt_num(r.residual),
                normalized
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// One line per history entry; `>` marks the cursor.
pub fn format_history(history: &FitHistory) -> String {
    if history.is_empty() {
        return "History: empty\n".to_string();
    }
    let mut out = String::from("History:\n");
    for (i, entry) in history.entries().iter().enumerate() {
        let mark = if history.cursor() == Some(i) { ">" } else { " " };
        out.push_str(&format!(
            "{mark} {:>3} {} {:<14} {:<24} R²={}\n",
            i + 1,
            entry.recorded_at.format("%H:%M:%S"),
            entry.result.method.display_name(),
            truncate(entry.equation_text.trim(), 24),
            fmt_num(entry.result.r_squared)
        ));
    }
    out
}

fn fmt_num(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    let a = v.abs();
    if a != 0.0 && !(1e-4..1e6).contains(&a) {
        format!("{v:.6e}")
    } else {
        format!("{v:.6}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitDiagnostics, FitMethod};

    fn result() -> FitResult {
        FitResult {
            method: FitMethod::Bootstrap,
            equation_text: "a*x + b".to_string(),
            parameters: vec!["a".to_string(), "b".to_string()],
            parameter_values: vec![2.0, 1.0e-7],
            parameter_errors: vec![0.01, f64::NAN],
            covariance: None,
            chi_squared: f64::NAN,
            reduced_chi_squared: None,
            r_squared: 0.999,
            n_points: 10,
            diagnostics: FitDiagnostics {
                iterations: 4,
                converged: true,
                resamples_used: Some(998),
                ..FitDiagnostics::default()
            },
        }
    }

    #[test]
    fn fit_report_lists_parameters_and_statistics() {
        let text = format_fit_result(&result(), Some(&FitWarning::OdrWithoutUncertainty));
        assert!(text.starts_with("=== Bootstrap fit: a*x + b ==="));
        assert!(text.contains("warning: ODR"));
        assert!(text.contains("2.000000"));
        assert!(text.contains("1.000000e-7"));
        assert!(text.contains("χ²/dof  = n/a"));
        assert!(text.contains("resamples=998"));
    }

    #[test]
    fn history_marks_cursor() {
        let mut h = FitHistory::new();
        h.record(result());
        h.record(result());
        h.prev();
        let text = format_history(&h);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].starts_with('>'));
        assert!(lines[2].starts_with(' '));
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }
}
