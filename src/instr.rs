//! VM instructions
//!
//! An instruction is an atomic unit of work: an opcode, an ordered parameter
//! list, and the 1-based source line it came from. Synthetic instructions
//! (canned follow-ups spliced in by the command sub-compiler) omit the line.
//!
//! Instructions are value objects. The compiler hands out copies, never
//! shared references — the executor rewrites string parameters in place
//! during variable interpolation, and one compiled file may be attached to
//! several device sections running concurrently.

use std::fmt;

use crate::api::ApiHandle;
use crate::error::ScriptError;

/// One ordered instruction parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A string parameter; subject to interpolation at run time
    Text(String),
    /// A line-number parameter (jump targets from back-patching)
    Int(i64),
    /// A flat expression token list, evaluated at run time
    Tokens(Vec<String>),
}

/// The sealed opcode set. External operations travel as `Api` with a handle
/// resolved once at parse time from the dispatch registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Raw device command text
    Command,
    /// Switch the current device context
    Device,
    IntSet,
    StrSet,
    ListSet,
    IntChange,
    SetVar,
    Sleep,
    /// Conditional: on false, jump to the back-patched line
    IfNotGoto,
    ElseIf,
    Else,
    EndIf,
    LoopBegin,
    Until,
    While,
    EndWhile,
    Expect,
    Search,
    Report,
    ClearBuf,
    ForceLogin,
    /// Run an included script synchronously
    CallScript,
    /// Dispatch through the API registry
    Api { handle: ApiHandle, name: String },
}

impl Opcode {
    /// Mnemonic used in listings and errors.
    pub fn mnemonic(&self) -> &str {
        match self {
            Opcode::Command => "command",
            Opcode::Device => "device",
            Opcode::IntSet => "intset",
            Opcode::StrSet => "strset",
            Opcode::ListSet => "listset",
            Opcode::IntChange => "intchange",
            Opcode::SetVar => "setvar",
            Opcode::Sleep => "sleep",
            Opcode::IfNotGoto => "if_not_goto",
            Opcode::ElseIf => "elseif",
            Opcode::Else => "else",
            Opcode::EndIf => "endif",
            Opcode::LoopBegin => "loop",
            Opcode::Until => "until",
            Opcode::While => "while",
            Opcode::EndWhile => "endwhile",
            Opcode::Expect => "expect",
            Opcode::Search => "search",
            Opcode::Report => "report",
            Opcode::ClearBuf => "clearbuf",
            Opcode::ForceLogin => "force_login",
            Opcode::CallScript => "call_script",
            Opcode::Api { name, .. } => name,
        }
    }
}

/// An instruction: opcode + ordered parameters + originating line
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// 1-based source line; `None` for synthetic instructions
    pub line: Option<usize>,
    pub op: Opcode,
    pub args: Vec<Arg>,
}

impl Instruction {
    pub fn new(op: Opcode) -> Self {
        Self {
            line: None,
            op,
            args: Vec::new(),
        }
    }

    pub fn at(op: Opcode, line: usize) -> Self {
        Self {
            line: Some(line),
            op,
            args: Vec::new(),
        }
    }

    pub fn text(mut self, s: impl Into<String>) -> Self {
        self.args.push(Arg::Text(s.into()));
        self
    }

    pub fn int(mut self, v: i64) -> Self {
        self.args.push(Arg::Int(v));
        self
    }

    pub fn tokens(mut self, ts: Vec<String>) -> Self {
        self.args.push(Arg::Tokens(ts));
        self
    }

    /// Append a back-patched jump target.
    pub fn patch(&mut self, line: usize) {
        self.args.push(Arg::Int(line as i64));
    }

    fn shape_error(&self, idx: usize, want: &str) -> ScriptError {
        let mut e = ScriptError::bad_parameter(format!(
            "{}: parameter {} is not a {}",
            self.op.mnemonic(),
            idx,
            want
        ));
        if let Some(line) = self.line {
            e = e.with_line(line);
        }
        e
    }

    pub fn text_arg(&self, idx: usize) -> Result<&str, ScriptError> {
        match self.args.get(idx) {
            Some(Arg::Text(s)) => Ok(s),
            _ => Err(self.shape_error(idx, "string")),
        }
    }

    pub fn int_arg(&self, idx: usize) -> Result<i64, ScriptError> {
        match self.args.get(idx) {
            Some(Arg::Int(v)) => Ok(*v),
            // Casts recorded as text by the flag parser are still numbers
            Some(Arg::Text(s)) => s
                .parse::<i64>()
                .map_err(|_| self.shape_error(idx, "number")),
            _ => Err(self.shape_error(idx, "number")),
        }
    }

    pub fn tokens_arg(&self, idx: usize) -> Result<&[String], ScriptError> {
        match self.args.get(idx) {
            Some(Arg::Tokens(ts)) => Ok(ts),
            _ => Err(self.shape_error(idx, "token list")),
        }
    }

    /// The jump target appended by back-patching (always the last Int arg).
    pub fn jump_target(&self) -> Result<usize, ScriptError> {
        for arg in self.args.iter().rev() {
            if let Arg::Int(v) = arg {
                return Ok(*v as usize);
            }
        }
        Err(self.shape_error(self.args.len(), "jump target"))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{:>4}  {}", line, self.op.mnemonic())?,
            None => write!(f, "   .  {}", self.op.mnemonic())?,
        }
        for arg in &self.args {
            match arg {
                Arg::Text(s) => write!(f, " {:?}", s)?,
                Arg::Int(v) => write!(f, " ->{}", v)?,
                Arg::Tokens(ts) => write!(f, " [{}]", ts.join(" "))?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_appends_target() {
        let mut i = Instruction::at(Opcode::IfNotGoto, 2).tokens(vec!["x".into(), ">".into(), "2".into()]);
        i.patch(4);
        assert_eq!(i.jump_target().unwrap(), 4);
    }

    #[test]
    fn test_clone_is_independent() {
        let a = Instruction::at(Opcode::Command, 1).text("send hi");
        let mut b = a.clone();
        if let Arg::Text(s) = &mut b.args[0] {
            s.push_str(" there");
        }
        assert_eq!(a.text_arg(0).unwrap(), "send hi");
        assert_eq!(b.text_arg(0).unwrap(), "send hi there");
    }

    #[test]
    fn test_shape_errors() {
        let i = Instruction::at(Opcode::Expect, 3).text("login:");
        assert!(i.int_arg(0).is_err());
        assert!(i.tokens_arg(0).is_err());
        assert_eq!(i.text_arg(0).unwrap(), "login:");
    }

    #[test]
    fn test_display_listing() {
        let i = Instruction::at(Opcode::Command, 7).text("get sys status");
        assert_eq!(i.to_string(), "   7  command \"get sys status\"");
    }
}
