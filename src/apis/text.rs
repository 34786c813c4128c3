//! Text and buffer comparison operations

use similar::TextDiff;
use tracing::debug;

use crate::api::{ApiContext, ApiOp, ApiRegistry, ApiUsage};
use crate::error::ScriptError;
use crate::syntax::{ApiSchema, ParamType, ParseMode};

use super::flag_param;

pub fn register(reg: &mut ApiRegistry) {
    reg.register("bufcmp", Box::new(BufCmp));
    // The marker keeps the struct name off the `match` keyword; the
    // registry strips it, so scripts write plain `match`.
    reg.register("match_", Box::new(Match));
}

fn var_text(ctx: &ApiContext<'_>, name: &str) -> String {
    ctx.vars
        .get(name)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// `bufcmp -a <var> -b <var> [-for <qaid>]`
///
/// Compares the values of two script variables and records the outcome.
/// On mismatch a unified diff goes to the log and into the recorded
/// output.
pub(super) struct BufCmp;

impl ApiOp for BufCmp {
    fn call(&self, ctx: &mut ApiContext<'_>, params: &[String]) -> Result<(), ScriptError> {
        let a_name = params.first().map(String::as_str).unwrap_or_default();
        let b_name = params.get(1).map(String::as_str).unwrap_or_default();
        let qaid = params.get(2).map(String::as_str).unwrap_or("0").to_string();

        let a = var_text(ctx, a_name);
        let b = var_text(ctx, b_name);
        if a == b {
            ctx.record(&qaid, true, &a);
        } else {
            let diff = TextDiff::from_lines(&a, &b)
                .unified_diff()
                .header(a_name, b_name)
                .to_string();
            debug!(a = a_name, b = b_name, "bufcmp mismatch:\n{}", diff);
            ctx.record(&qaid, false, &diff);
        }
        Ok(())
    }

    fn usage(&self) -> ApiUsage {
        ApiUsage {
            summary: "compare two variables and record the outcome".into(),
            category: "text",
            schema: ApiSchema {
                name: "bufcmp".into(),
                mode: ParseMode::Flags,
                params: vec![
                    flag_param("a", "a", ParamType::Str, true, "", 0),
                    flag_param("b", "b", ParamType::Str, true, "", 1),
                    flag_param("qaid", "for", ParamType::Str, false, "0", 2),
                ],
            },
        }
    }
}

/// `match -e <pattern> -v <var> [-for <qaid>]`
///
/// Regex-matches a variable's value and records the outcome.
pub(super) struct Match;

impl ApiOp for Match {
    fn call(&self, ctx: &mut ApiContext<'_>, params: &[String]) -> Result<(), ScriptError> {
        let pattern = params.first().map(String::as_str).unwrap_or_default();
        let var = params.get(1).map(String::as_str).unwrap_or_default();
        let qaid = params.get(2).map(String::as_str).unwrap_or("0").to_string();

        let re = regex::RegexBuilder::new(pattern)
            .size_limit(1 << 20)
            .build()
            .map_err(|e| ScriptError::bad_parameter(format!("bad pattern '{}': {}", pattern, e)))?;
        let value = var_text(ctx, var);
        ctx.record(&qaid, re.is_match(&value), &value);
        Ok(())
    }

    fn usage(&self) -> ApiUsage {
        ApiUsage {
            summary: "regex-match a variable's value and record the outcome".into(),
            category: "text",
            schema: ApiSchema {
                name: "match_".into(),
                mode: ParseMode::Flags,
                params: vec![
                    flag_param("pattern", "e", ParamType::Str, true, "", 0),
                    flag_param("var", "v", ParamType::Str, true, "", 1),
                    flag_param("qaid", "for", ParamType::Str, false, "0", 2),
                ],
            },
        }
    }
}
