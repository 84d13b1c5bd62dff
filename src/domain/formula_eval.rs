//! Formula evaluation engine.
//!
//! Evaluates a parsed formula against one trade's environment.
//!
//! # Evaluation Semantics
//!
//! - Arithmetic: both operands must read as numbers (text is read as a number
//!   when it parses to a finite decimal), otherwise `TypeMismatch`
//! - `/`: a zero divisor is `DivisionByZero`
//! - Comparisons: numeric when both operands read as numbers, otherwise a
//!   lexical comparison of their text forms
//! - `if(c, t, e)`: only the selected branch is evaluated
//! - A text result may itself be a formula: [`evaluate_with_reparse`] gives it
//!   one more evaluation when all of its inputs are present

use crate::domain::error::EvalError;
use crate::domain::formula::{BinaryOp, CompiledFormula, Expr};
use crate::domain::formula_parser;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_finite(s),
            Value::Bool(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Parse text as a finite decimal number; surrounding whitespace disqualifies it.
pub fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Normalized identifier to value, built fresh per trade.
pub type Environment = HashMap<String, Value>;

pub fn evaluate(formula: &CompiledFormula, env: &Environment) -> Result<Value, EvalError> {
    eval_expr(&formula.expr, env)
}

/// Evaluate, then give a text result one chance to be evaluated as a formula
/// of its own. The original text stands if it does not parse, references an
/// input missing from `env`, or fails to evaluate.
pub fn evaluate_with_reparse(
    formula: &CompiledFormula,
    env: &Environment,
) -> Result<Value, EvalError> {
    let value = evaluate(formula, env)?;
    let Value::Text(text) = &value else {
        return Ok(value);
    };
    let Ok(inner) = formula_parser::parse(text) else {
        return Ok(value);
    };
    if !inner.free_variables().iter().all(|name| env.contains_key(name)) {
        return Ok(value);
    }
    match evaluate(&inner, env) {
        Ok(reparsed) => Ok(reparsed),
        Err(_) => Ok(value),
    }
}

fn eval_expr(expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Text(s.clone())),
        Expr::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
        Expr::Neg(inner) => {
            let value = eval_expr(inner, env)?;
            let n = require_number("-", &value)?;
            Ok(Value::Number(-n))
        }
        Expr::Binary { op, left, right } => {
            let left_val = eval_expr(left, env)?;
            let right_val = eval_expr(right, env)?;
            if op.is_comparison() {
                Ok(Value::Bool(compare(*op, &left_val, &right_val)))
            } else {
                arithmetic(*op, &left_val, &right_val)
            }
        }
        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            if eval_expr(condition, env)?.is_truthy() {
                eval_expr(then, env)
            } else {
                eval_expr(otherwise, env)
            }
        }
    }
}

fn require_number(op: &str, value: &Value) -> Result<f64, EvalError> {
    value.as_number().ok_or_else(|| EvalError::TypeMismatch {
        op: op.to_string(),
        operand: format!("{} '{}'", value.type_name(), value),
    })
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let l = require_number(op.symbol(), left)?;
    let r = require_number(op.symbol(), right)?;
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            l / r
        }
        _ => unreachable!("comparison operators are handled by compare"),
    };
    Ok(Value::Number(result))
}

/// Two-mode comparison: numeric if both sides read as numbers, else lexical.
fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    let ordering = match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => Some(left.to_string().cmp(&right.to_string())),
    };
    match (op, ordering) {
        (BinaryOp::Ne, None) => true,
        (_, None) => false,
        (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
        (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
        (BinaryOp::Ge, Some(o)) => o != Ordering::Less,
        (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
        (BinaryOp::Eq, Some(o)) => o == Ordering::Equal,
        (BinaryOp::Ne, Some(o)) => o != Ordering::Equal,
        _ => unreachable!("arithmetic operators are handled by arithmetic"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::formula_parser::parse;
    use approx::assert_relative_eq;

    fn env(pairs: &[(&str, Value)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eval(formula: &str, env: &Environment) -> Result<Value, EvalError> {
        evaluate(&parse(formula).unwrap(), env)
    }

    fn num(formula: &str, env: &Environment) -> f64 {
        match eval(formula, env).unwrap() {
            Value::Number(n) => n,
            other => panic!("expected number from {formula}, got {other:?}"),
        }
    }

    #[test]
    fn if_selects_branch_on_pnl_sign() {
        let formula = parse("if(pnl>0, 1, 0)").unwrap();
        let win = env(&[("pnl", Value::Number(5.0))]);
        let loss = env(&[("pnl", Value::Number(-5.0))]);
        assert_eq!(evaluate(&formula, &win).unwrap(), Value::Number(1.0));
        assert_eq!(evaluate(&formula, &loss).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn arithmetic_precedence() {
        let e = env(&[
            ("a", Value::Number(2.0)),
            ("b", Value::Number(3.0)),
            ("c", Value::Number(4.0)),
        ]);
        assert_relative_eq!(num("a+b*c", &e), 14.0);
        assert_relative_eq!(num("(a+b)*c", &e), 20.0);
        assert_relative_eq!(num("c/a-b", &e), -1.0);
        assert_relative_eq!(num("-a*c", &e), -8.0);
    }

    #[test]
    fn numeric_text_participates_in_arithmetic() {
        let e = env(&[("entry", Value::Text("100.5".into()))]);
        assert_relative_eq!(num("entry * 2", &e), 201.0);
    }

    #[test]
    fn arithmetic_on_text_is_type_mismatch() {
        let e = env(&[("setup", Value::Text("breakout".into()))]);
        let err = eval("setup + 1", &e).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn arithmetic_on_bool_is_type_mismatch() {
        let e = env(&[("done", Value::Bool(true))]);
        assert!(matches!(
            eval("done * 2", &e),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert!(matches!(eval("-done", &e), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn division_by_zero() {
        let e = env(&[("risk", Value::Number(0.0))]);
        assert_eq!(eval("10 / risk", &e), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn undefined_variable() {
        assert_eq!(
            eval("targetwin + 1", &Environment::new()),
            Err(EvalError::UndefinedVariable("targetwin".into()))
        );
    }

    #[test]
    fn untaken_branch_is_not_evaluated() {
        let e = env(&[("pnl", Value::Number(1.0))]);
        assert_eq!(eval("if(pnl > 0, 1, missing)", &e).unwrap(), Value::Number(1.0));
        assert_eq!(eval("if(pnl > 0, 1, 1 / 0)", &e).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn numeric_comparison_when_both_numeric() {
        let e = env(&[("a", Value::Text("10".into())), ("b", Value::Number(9.0))]);
        assert_eq!(eval("a > b", &e).unwrap(), Value::Bool(true));
        assert_eq!(eval("a == 10", &e).unwrap(), Value::Bool(true));
        assert_eq!(eval("a >= 10", &e).unwrap(), Value::Bool(true));
        assert_eq!(eval("a <= 9", &e).unwrap(), Value::Bool(false));
    }

    #[test]
    fn lexical_comparison_otherwise() {
        let e = env(&[("setup", Value::Text("breakout".into()))]);
        assert_eq!(eval("setup == \"breakout\"", &e).unwrap(), Value::Bool(true));
        assert_eq!(eval("setup != \"pullback\"", &e).unwrap(), Value::Bool(true));
        assert_eq!(eval("setup < \"c\"", &e).unwrap(), Value::Bool(true));
        // "10" sorts before "9" lexically once either side is non-numeric
        assert_eq!(eval("\"10x\" < \"9\"", &e).unwrap(), Value::Bool(true));
    }

    #[test]
    fn bool_compares_as_text() {
        let e = env(&[("done", Value::Bool(true))]);
        assert_eq!(eval("done == \"true\"", &e).unwrap(), Value::Bool(true));
    }

    #[test]
    fn truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
    }

    #[test]
    fn text_condition_in_if() {
        let e = env(&[("notes", Value::Text(String::new()))]);
        assert_eq!(eval("if(notes, 1, 2)", &e).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn reparse_evaluates_formula_valued_text() {
        let e = env(&[("pnl", Value::Number(30.0)), ("risk", Value::Number(10.0))]);
        let formula = parse("if(pnl > 0, \"pnl / risk\", \"0\")").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &e).unwrap(),
            Value::Number(3.0)
        );
    }

    #[test]
    fn reparse_keeps_text_when_inputs_missing() {
        let e = env(&[("pnl", Value::Number(30.0))]);
        let formula = parse("if(pnl > 0, \"pnl / risk\", \"0\")").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &e).unwrap(),
            Value::Text("pnl / risk".into())
        );
    }

    #[test]
    fn reparse_keeps_text_that_does_not_parse() {
        let e = env(&[("pnl", Value::Number(30.0))]);
        let formula = parse("if(pnl > 0, \"big win\", \"loss\")").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &e).unwrap(),
            Value::Text("big win".into())
        );
    }

    #[test]
    fn reparse_keeps_text_when_inner_evaluation_fails() {
        let e = env(&[("pnl", Value::Number(30.0)), ("risk", Value::Number(0.0))]);
        let formula = parse("\"pnl / risk\"").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &e).unwrap(),
            Value::Text("pnl / risk".into())
        );
    }

    #[test]
    fn reparse_single_word_text_resolves_to_variable() {
        let e = env(&[("win", Value::Text("yes".into()))]);
        let formula = parse("\"win\"").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &e).unwrap(),
            Value::Text("yes".into())
        );
    }

    #[test]
    fn reparse_is_one_level_only() {
        let e = env(&[("a", Value::Text("b".into())), ("b", Value::Number(1.0))]);
        let formula = parse("\"a\"").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &e).unwrap(),
            Value::Text("b".into())
        );
    }

    #[test]
    fn reparse_keeps_deeply_nested_text() {
        let nested = format!("{}1", "(".repeat(200_000));
        let e = env(&[("notes", Value::Text(nested.clone()))]);
        let formula = parse("notes").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &e).unwrap(),
            Value::Text(nested)
        );
    }

    #[test]
    fn reparse_passes_numbers_through() {
        let formula = parse("1 + 1").unwrap();
        assert_eq!(
            evaluate_with_reparse(&formula, &Environment::new()).unwrap(),
            Value::Number(2.0)
        );
    }

    #[test]
    fn parse_finite_rejects_non_finite_and_padding() {
        assert_eq!(parse_finite("12.5"), Some(12.5));
        assert_eq!(parse_finite("-3"), Some(-3.0));
        assert_eq!(parse_finite("inf"), None);
        assert_eq!(parse_finite("NaN"), None);
        assert_eq!(parse_finite(" 1"), None);
        assert_eq!(parse_finite(""), None);
    }
}
