//! Runtime variables, the control-flow stack, and string interpolation
//!
//! The variable table and flow stack are single-writer per script-execution
//! tree: the top-level executor creates them once and lends them to every
//! nested include execution, so includes see (and mutate) the caller's
//! state, and the sharing boundary is explicit instead of process-global.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::env::Environment;
use crate::error::ScriptError;

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    /// Numeric view; strings that look numeric pass through.
    pub fn as_int(&self) -> Result<i64, ScriptError> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Str(s) => s.parse::<i64>().map_err(|_| {
                ScriptError::bad_parameter(format!("'{}' is not an integer", s))
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Name → value map shared by a run tree. Entries are set by
/// `intset`/`strset`/`setvar` and by API calls, and cleared individually.
#[derive(Debug, Default)]
pub struct VarTable {
    map: HashMap<String, Value>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.map.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn clear(&mut self, name: &str) -> bool {
        self.map.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The control-flow stack: one boolean per open `if`/`elseif` chain,
/// recording whether the active branch has already matched.
#[derive(Debug, Default)]
pub struct FlowStack {
    stack: Vec<bool>,
}

impl FlowStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, matched: bool) {
        self.stack.push(matched);
    }

    pub fn pop(&mut self) -> Result<bool, ScriptError> {
        self.stack.pop().ok_or_else(|| {
            ScriptError::new(
                crate::error::ErrorKind::UnknownOpcode,
                "endif with no open if block",
            )
        })
    }

    pub fn top(&self) -> Option<bool> {
        self.stack.last().copied()
    }

    pub fn set_top(&mut self, matched: bool) {
        if let Some(t) = self.stack.last_mut() {
            *t = matched;
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

fn brace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\$([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"))
}

fn device_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Z0-9_]{2,}\b").expect("static pattern"))
}

/// Interpolate one string parameter. Three independent passes in this fixed
/// order: `SECTION:KEY` environment cross-references, `{$name}` user
/// variables, bare uppercase tokens resolved against the current device's
/// config namespace.
pub fn interpolate(
    text: &str,
    env: Option<&dyn Environment>,
    vars: &VarTable,
    device_cfg: Option<&HashMap<String, String>>,
) -> String {
    let mut s = match env {
        Some(env) => env.interpolate(text),
        None => text.to_string(),
    };

    s = brace_re()
        .replace_all(&s, |caps: &regex::Captures<'_>| {
            match vars.get(&caps[1]) {
                Some(v) => v.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    if let Some(cfg) = device_cfg {
        s = device_token_re()
            .replace_all(&s, |caps: &regex::Captures<'_>| {
                match cfg.get(&caps[0]) {
                    Some(v) => v.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
    }

    s
}
