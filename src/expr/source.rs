//! Equation text clean-up before it reaches the symbolic parser.
//!
//! - drops a `y =` / `f(x) =` prefix
//! - rejects unbalanced or over-deep parentheses and stray characters
//! - spells `**` as `^`
//! - rewrites `log(v, b)`, n-ary `min`/`max` and `sign` into functions the
//!   parser differentiates
//! - makes `name(` an explicit product unless `name` is whitelisted

use crate::expr::functions::is_function_name;

/// Longest equation accepted, in characters.
pub const MAX_SOURCE_LEN: usize = 4096;
/// Deepest parenthesis nesting accepted.
pub const MAX_NESTING: usize = 64;
/// Longest source after `min`/`max` expansion, which doubles its arguments.
pub const MAX_EXPANDED_LEN: usize = 16 * MAX_SOURCE_LEN;

/// Drop a `y =` / `f(x) =` prefix: everything up to the first `=`.
pub fn strip_assignment(text: &str) -> &str {
    match text.split_once('=') {
        Some((_, rhs)) => rhs,
        None => text,
    }
}

/// Normalized source for the symbolic parser, or a human-readable cause.
pub fn normalize(body: &str) -> Result<String, String> {
    if body.trim().is_empty() {
        return Err("the equation is empty".to_string());
    }
    if body.chars().count() > MAX_SOURCE_LEN {
        return Err(format!("longer than {MAX_SOURCE_LEN} characters"));
    }
    check_nesting(body)?;
    rewrite(body)
}

fn allowed(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || "_.+-*/^(),".contains(c)
}

fn check_nesting(src: &str) -> Result<(), String> {
    let mut depth = 0usize;
    for c in src.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(format!("parentheses nested deeper than {MAX_NESTING} levels"));
                }
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unmatched ')'".to_string())?;
            }
            c if allowed(c) => {}
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    if depth > 0 {
        return Err("unclosed '('".to_string());
    }
    Ok(())
}

fn rewrite(src: &str) -> Result<String, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '*' && chars.get(i + 1) == Some(&'*') {
            out.push('^');
            i += 2;
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let end = number_end(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            let mut open = i;
            while open < chars.len() && chars[open].is_whitespace() {
                open += 1;
            }
            if chars.get(open) != Some(&'(') {
                out.push_str(&name);
                continue;
            }
            match name.as_str() {
                "log" | "min" | "max" => {
                    let close = matching_paren(&chars, open)?;
                    let inner: String = chars[open + 1..close].iter().collect();
                    let args = split_args(&inner)
                        .into_iter()
                        .map(rewrite)
                        .collect::<Result<Vec<_>, _>>()?;
                    out.push_str(&expand_call(&name, &args)?);
                    if out.len() > MAX_EXPANDED_LEN {
                        return Err(too_long_after_expansion());
                    }
                    i = close + 1;
                }
                "sign" => out.push_str("signum"),
                n if is_function_name(n) => out.push_str(n),
                _ => {
                    out.push_str(&name);
                    out.push('*');
                }
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    Ok(out)
}

/// End of a numeric literal starting at `start`, exponent included.
fn number_end(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        let mut j = i + 1;
        if matches!(chars.get(j), Some('+' | '-')) {
            j += 1;
        }
        if chars.get(j).is_some_and(char::is_ascii_digit) {
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    i
}

fn matching_paren(chars: &[char], open: usize) -> Result<usize, String> {
    let mut depth = 0usize;
    for (k, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(k);
                }
            }
            _ => {}
        }
    }
    Err("unclosed '('".to_string())
}

/// Split a call's argument text at top-level commas.
fn split_args(inner: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (k, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(&inner[start..k]);
                start = k + 1;
            }
            _ => {}
        }
    }
    args.push(&inner[start..]);
    args
}

fn too_long_after_expansion() -> String {
    format!("min/max nesting expands past {MAX_EXPANDED_LEN} characters")
}

fn expand_call(name: &str, args: &[String]) -> Result<String, String> {
    if args.iter().any(|a| a.trim().is_empty()) {
        return Err(format!("empty argument in {name}(...)"));
    }
    match (name, args) {
        ("log", [v]) => Ok(format!("ln({v})")),
        ("log", [v, base]) => Ok(format!("(ln({v})/ln({base}))")),
        ("log", _) => Err("log takes one or two arguments".to_string()),
        (_, [first, rest @ ..]) => {
            // max(a, b) = (a + b + |a - b|) / 2, min with the sign flipped.
            let sign = if name == "max" { '+' } else { '-' };
            rest.iter().try_fold(format!("({first})"), |acc, b| {
                let next = format!("(({acc}+({b}){sign}abs({acc}-({b})))/2)");
                if next.len() > MAX_EXPANDED_LEN {
                    return Err(too_long_after_expansion());
                }
                Ok(next)
            })
        }
        _ => Err(format!("{name} needs at least one argument")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_dropped() {
        assert_eq!(strip_assignment("y = a*x"), " a*x");
        assert_eq!(strip_assignment("f(x) = a*x"), " a*x");
        assert_eq!(strip_assignment("a*x"), "a*x");
    }

    #[test]
    fn power_and_calls_are_rewritten() {
        assert_eq!(normalize("a*x**2").unwrap(), "a*x^2");
        assert_eq!(normalize("a(x+1)").unwrap(), "a*(x+1)");
        assert_eq!(normalize("sin (x)").unwrap(), "sin (x)");
        assert_eq!(normalize("sign(x)").unwrap(), "signum(x)");
        assert_eq!(normalize("log(x)").unwrap(), "ln(x)");
        assert_eq!(normalize("log(x, 2)").unwrap(), "(ln(x)/ln( 2))");
        assert_eq!(normalize("2.5e-3x").unwrap(), "2.5e-3x");
    }

    #[test]
    fn min_max_fold_pairwise() {
        assert_eq!(normalize("max(a)").unwrap(), "(a)");
        assert_eq!(
            normalize("min(a,x)").unwrap(),
            "(((a)+(x)-abs((a)-(x)))/2)"
        );
        assert!(normalize("max()").is_err());
        assert!(normalize("log(x, 2, 3)").is_err());
    }

    #[test]
    fn structural_problems_are_reported() {
        assert!(normalize("(x").unwrap_err().contains("unclosed"));
        assert!(normalize("x)").unwrap_err().contains("unmatched"));
        assert!(normalize("x $ 2").unwrap_err().contains("'$'"));
        assert!(normalize("  ").is_err());
    }

    #[test]
    fn nesting_and_length_are_capped() {
        let deep = format!("{}x{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(normalize(&deep).is_err());
        let just_inside = format!("{}x{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(normalize(&just_inside).is_ok());
        let too_deep = format!("{}x{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(normalize(&too_deep).unwrap_err().contains("nested"));
        let minus_chain = format!("{}x", "-".repeat(MAX_SOURCE_LEN));
        assert!(normalize(&minus_chain).unwrap_err().contains("longer"));
    }

    #[test]
    fn nested_max_cannot_explode() {
        let nested = format!("{}x{}", "max(".repeat(40), ", 1)".repeat(40));
        assert!(normalize(&nested).unwrap_err().contains("expands"));
    }
}
