//! Runtime expression evaluation
//!
//! Conditions reach the VM as the flat token lists the parser produced, so
//! variable values resolve only when the branch actually executes. Tokens
//! are normalized first — word operators to their symbols, numeric-looking
//! identifiers to numbers, unresolved identifiers looked up as variables
//! with a string-literal fallback — then evaluated strictly left to right.
//! There is no precedence beyond token order and no parenthesized
//! sub-expressions.

use crate::error::ScriptError;
use crate::vars::{Value, VarTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

fn normalize_op(tok: &str) -> Option<Op> {
    match tok {
        "==" | "=" | "eq" => Some(Op::Eq),
        "!=" | "neq" => Some(Op::Ne),
        "<" | "lt" => Some(Op::Lt),
        ">" | "gt" => Some(Op::Gt),
        "<=" | "le" => Some(Op::Le),
        ">=" | "ge" => Some(Op::Ge),
        "and" => Some(Op::And),
        "or" => Some(Op::Or),
        _ => None,
    }
}

/// Resolve one term. `$name` is a variable reference; a bare identifier is
/// tried as a variable first and falls back to a quoted string literal.
fn resolve(tok: &str, vars: &VarTable) -> Value {
    if let Some(name) = tok.strip_prefix('$') {
        return match vars.get(name) {
            Some(v) => v.clone(),
            None => Value::Str(String::new()),
        };
    }
    if let Ok(n) = tok.parse::<i64>() {
        return Value::Int(n);
    }
    match vars.get(tok) {
        Some(v) => v.clone(),
        None => Value::Str(tok.to_string()),
    }
}

fn compare(lhs: &Value, op: Op, rhs: &Value) -> Result<bool, ScriptError> {
    // Numeric comparison when both sides have a numeric reading, otherwise
    // lexicographic on the rendered strings.
    let numeric = lhs.as_int().ok().zip(rhs.as_int().ok());
    let ordering = match numeric {
        Some((a, b)) => a.cmp(&b),
        None => lhs.to_string().cmp(&rhs.to_string()),
    };
    Ok(match op {
        Op::Eq => ordering.is_eq(),
        Op::Ne => !ordering.is_eq(),
        Op::Lt => ordering.is_lt(),
        Op::Gt => ordering.is_gt(),
        Op::Le => ordering.is_le(),
        Op::Ge => ordering.is_ge(),
        Op::And | Op::Or => {
            return Err(ScriptError::bad_parameter(
                "connector where a comparison operator belongs",
            ));
        }
    })
}

/// A lone term is truthy when it is a nonzero number or a nonempty string.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Int(n) => *n != 0,
        Value::Str(s) => !s.is_empty(),
    }
}

/// Evaluate one comparison (`term` or `term op term`) starting at `i`.
/// Returns the boolean and the next index.
fn eval_comparison(
    tokens: &[String],
    i: usize,
    vars: &VarTable,
) -> Result<(bool, usize), ScriptError> {
    let lhs_tok = tokens
        .get(i)
        .ok_or_else(|| ScriptError::bad_parameter("expression ends where a term belongs"))?;
    let lhs = resolve(lhs_tok, vars);

    match tokens.get(i + 1).map(|t| normalize_op(t)) {
        // term op term
        Some(Some(op)) if op != Op::And && op != Op::Or => {
            let rhs_tok = tokens.get(i + 2).ok_or_else(|| {
                ScriptError::bad_parameter("comparison is missing its right side")
            })?;
            let rhs = resolve(rhs_tok, vars);
            Ok((compare(&lhs, op, &rhs)?, i + 3))
        }
        // lone term, next token (if any) is a connector
        _ => Ok((truthy(&lhs), i + 1)),
    }
}

/// Evaluate a flat condition token list against the variable table.
pub fn eval(tokens: &[String], vars: &VarTable) -> Result<bool, ScriptError> {
    if tokens.is_empty() {
        return Err(ScriptError::bad_parameter("empty condition"));
    }

    let (mut acc, mut i) = eval_comparison(tokens, 0, vars)?;
    while i < tokens.len() {
        let conn = normalize_op(&tokens[i]).ok_or_else(|| {
            ScriptError::bad_parameter(format!("'{}' is not an operator", tokens[i]))
        })?;
        let (rhs, next) = eval_comparison(tokens, i + 1, vars)?;
        acc = match conn {
            Op::And => acc && rhs,
            Op::Or => acc || rhs,
            _ => {
                return Err(ScriptError::bad_parameter(format!(
                    "'{}' cannot join comparisons",
                    tokens[i]
                )));
            }
        };
        i = next;
    }
    Ok(acc)
}
