//! Script errors
//!
//! One error type covers the whole pipeline: compile-time syntax errors carry
//! a `file:line` locator plus the offending text and what was expected there;
//! runtime errors carry whatever context the executor had. Assertion
//! (`expect`) failures are NOT errors — they are recorded as results and
//! execution continues.

use std::fmt;

/// The kind of script error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid DSL syntax (lexer or parser)
    Syntax,
    /// Malformed grammar definition file
    Grammar,
    /// Unknown opcode reached the executor (parser bug)
    UnknownOpcode,
    /// Instruction parameter list had the wrong shape
    BadParameter,
    /// Unknown API operation name at dispatch time
    UnknownApi,
    /// Device/transport failure (timeout, disconnect)
    Device,
    /// Missing or unusable configuration (license info, device model)
    Config,
    /// IO error
    Io,
    /// Other error
    Other,
}

/// A script error with file/line context
#[derive(Debug)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    /// 1-based source line
    pub line: Option<usize>,
    /// The offending source text, if any
    pub text: Option<String>,
    /// Human-readable description of what was expected instead
    pub expected: Option<String>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            text: None,
            expected: None,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, msg)
    }

    pub fn grammar(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Grammar, msg)
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Device, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadParameter, msg)
    }

    pub fn is_syntax(&self) -> bool {
        self.kind == ErrorKind::Syntax
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file)?;
        }
        if let Some(line) = self.line {
            write!(f, "{}:", line)?;
        }
        if self.file.is_some() || self.line.is_some() {
            write!(f, " ")?;
        }
        if let Some(ref text) = self.text {
            write!(f, "'{}': ", text)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref expected) = self.expected {
            write!(f, " (expected {})", expected)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

impl From<std::io::Error> for ScriptError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_full_locator() {
        let e = ScriptError::syntax("unexpected token")
            .with_location("case1.txt", 12)
            .with_text("<elseif>")
            .with_expected("<fi> or <else>");
        assert_eq!(
            e.to_string(),
            "case1.txt:12: '<elseif>': unexpected token (expected <fi> or <else>)"
        );
    }

    #[test]
    fn test_display_bare() {
        let e = ScriptError::device("timed out");
        assert_eq!(e.to_string(), "timed out");
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: ScriptError = io.into();
        assert_eq!(e.kind, ErrorKind::Io);
    }
}
