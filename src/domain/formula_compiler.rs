//! Flatten a conditional chain into one `if(cond, then, else)` formula.

use crate::domain::conditional::{ConditionalBlock, ElseBranch};

/// Render a raw branch value as a formula literal.
///
/// Blank text becomes `0`; anything that reads as a finite number is emitted
/// unquoted; everything else becomes a double-quoted string literal.
pub fn wrap_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "0".to_string();
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => {
            if is_decimal_literal(trimmed) {
                trimmed.to_string()
            } else {
                format!("{}", n)
            }
        }
        _ => quote(raw),
    }
}

/// `-?digits(.digits)?` or `-?.digits`, the shapes the parser reads back verbatim.
fn is_decimal_literal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let mut parts = body.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    match frac_part {
        None => !int_part.is_empty() && all_digits(int_part),
        Some(frac) => {
            !frac.is_empty() && all_digits(frac) && all_digits(int_part)
        }
    }
}

fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

fn compile_condition(condition: &str) -> &str {
    if condition.trim().is_empty() {
        "0"
    } else {
        condition.trim()
    }
}

/// Compile a chain to a formula. An absent else compiles to `0`.
pub fn compile(block: &ConditionalBlock) -> String {
    let otherwise = match &block.otherwise {
        ElseBranch::None => "0".to_string(),
        ElseBranch::Value(v) => wrap_value(v),
        ElseBranch::Block(next) => compile(next),
    };
    format!(
        "if({}, {}, {})",
        compile_condition(&block.condition),
        wrap_value(&block.then),
        otherwise
    )
}
