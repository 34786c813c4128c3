//! Lexer
//!
//! Turns one raw source line into a classified line plus zero or more
//! tokens, using only patterns supplied by the Syntax Registry. The lexer
//! tracks one piece of state across lines: whether the current `[DEVICE]`
//! section was commented out, in which case every following line is
//! suppressed until the next real section header.

use crate::error::ScriptError;
use crate::syntax::SyntaxRegistry;

/// Token kind, as consumed by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A control keyword (`if`, `until`, ...)
    Keyword,
    /// A bare identifier (including `-flag` forms)
    Ident,
    /// A quoted string literal, with escapes resolved
    Str,
    /// A numeric literal
    Num,
    /// A variable reference — both `$name` and `{$name}` normalize here,
    /// with `text` holding the bare name
    Var,
    /// An operator or punctuation symbol
    Symbol,
}

/// One token. Immutable; produced here, consumed only by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based source line
    pub line: usize,
}

impl Token {
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }
}

/// A classified source line
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Blank,
    Comment,
    /// `[NAME]` — switches the current device context
    Section(String),
    /// `include <path tokens...>`
    Include(Vec<Token>),
    /// `<keyword rest...>`
    Control { keyword: String, rest: Vec<Token> },
    /// `apiname -flag value ...` or `apiname positional...`
    Api { name: String, rest: Vec<Token> },
    /// Free-text device command
    Command(String),
}

/// The lexer. One instance per file; `suppressing` is the
/// commented-section flag.
pub struct Lexer<'r> {
    registry: &'r SyntaxRegistry,
    suppressing: bool,
}

impl<'r> Lexer<'r> {
    pub fn new(registry: &'r SyntaxRegistry) -> Self {
        Self {
            registry,
            suppressing: false,
        }
    }

    /// Classify one source line and tokenize its interesting remainder.
    pub fn classify(&mut self, line: &str, line_number: usize) -> Result<Line, ScriptError> {
        if line.trim().is_empty() {
            return Ok(Line::Blank);
        }

        let caps = self
            .registry
            .line_pattern()
            .captures(line)
            .ok_or_else(|| {
                ScriptError::syntax("unrecognizable line")
                    .with_line(line_number)
                    .with_text(line.trim())
            })?;

        if let Some(m) = caps.name("comment") {
            // A commented-out section header silences everything up to the
            // next real header.
            if section_in_comment(m.as_str()) {
                self.suppressing = true;
            }
            return Ok(Line::Comment);
        }

        if let Some(m) = caps.name("section") {
            self.suppressing = false;
            let name = m.as_str().trim_matches(|c| c == '[' || c == ']').to_string();
            return Ok(Line::Section(name));
        }

        if self.suppressing {
            return Ok(Line::Comment);
        }

        if let Some(m) = caps.name("include") {
            let rest = self.tokenize(m.as_str(), line_number)?;
            return Ok(Line::Include(rest));
        }

        if let Some(m) = caps.name("control") {
            let rest_text = caps.name("control_rest").map(|r| r.as_str()).unwrap_or("");
            let rest = self.tokenize(rest_text, line_number)?;
            return Ok(Line::Control {
                keyword: m.as_str().to_string(),
                rest,
            });
        }

        if let Some(m) = caps.name("api") {
            let rest_text = caps.name("api_rest").map(|r| r.as_str()).unwrap_or("");
            let rest = self.tokenize(rest_text, line_number)?;
            return Ok(Line::Api {
                name: m.as_str().to_string(),
                rest,
            });
        }

        // Everything else is a raw device command.
        let m = caps.name("command").ok_or_else(|| {
            ScriptError::syntax("unrecognizable line")
                .with_line(line_number)
                .with_text(line.trim())
        })?;
        Ok(Line::Command(m.as_str().to_string()))
    }

    /// Sub-tokenize `text` by repeatedly matching the token pattern at a
    /// cursor. A position where no alternative matches is a syntax error.
    pub fn tokenize(&self, text: &str, line_number: usize) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        let bytes = text.as_bytes();

        loop {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }

            let caps = self
                .registry
                .token_pattern()
                .captures_at(text, pos)
                .filter(|c| c.get(0).map(|m| m.start()) == Some(pos))
                .ok_or_else(|| {
                    ScriptError::syntax("no token matches here")
                        .with_line(line_number)
                        .with_text(&text[pos..])
                })?;

            let whole = caps.get(0).expect("match always has group 0");
            let token = if let Some(m) = caps.name("bracevar").or_else(|| caps.name("var")) {
                Token {
                    kind: TokenKind::Var,
                    text: m.as_str().to_string(),
                    line: line_number,
                }
            } else if let Some(m) = caps.name("string") {
                Token {
                    kind: TokenKind::Str,
                    text: unescape(m.as_str()),
                    line: line_number,
                }
            } else if let Some(m) = caps.name("number") {
                Token {
                    kind: TokenKind::Num,
                    text: m.as_str().to_string(),
                    line: line_number,
                }
            } else if let Some(m) = caps.name("ident") {
                let kind = if self.registry.is_keyword(m.as_str()) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Ident
                };
                Token {
                    kind,
                    text: m.as_str().to_string(),
                    line: line_number,
                }
            } else if let Some(m) = caps.name("symbol") {
                Token {
                    kind: TokenKind::Symbol,
                    text: m.as_str().to_string(),
                    line: line_number,
                }
            } else {
                return Err(ScriptError::syntax("no token matches here")
                    .with_line(line_number)
                    .with_text(&text[pos..]));
            };

            tokens.push(token);
            pos = whole.end();
        }

        Ok(tokens)
    }
}

/// Does a comment line hide a `[SECTION]` header?
fn section_in_comment(comment: &str) -> bool {
    let body = comment
        .trim_start_matches("comment:")
        .trim_start_matches("Comment:")
        .trim_start_matches('#')
        .trim();
    body.starts_with('[') && body.ends_with(']') && body.len() > 2
}

/// Resolve `\"` and `\\` escapes inside a string literal. Only an unescaped
/// quote terminates the literal; the pattern guarantees that, this just
/// collapses the escapes.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
