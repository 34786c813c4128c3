//! Parser
//!
//! Table-driven recursive descent over the lexer's token stream. Simple
//! statements emit one instruction; control constructs run a small
//! per-construct state machine (`if`-chain, `loop`, `while`) whose open
//! instruction is addressed by *index* into the output vector and mutated
//! through that index when its continuation arrives (back-patching).
//!
//! Structural mismatches abort the file immediately with the file name,
//! 1-based line, the offending text, and what was expected there; no partial
//! instruction sequence ever leaves this module.

use std::collections::BTreeSet;

use crate::api::ApiRegistry;
use crate::devcmd::DeviceCommandCompiler;
use crate::error::ScriptError;
use crate::instr::{Instruction, Opcode};
use crate::lexer::{Lexer, Line, Token, TokenKind};
use crate::syntax::{ApiSchema, ParamType, ParseMode, SyntaxRegistry};

/// Everything one file compiles to
#[derive(Debug)]
pub struct ParseOutput {
    pub instructions: Vec<Instruction>,
    /// Devices referenced by `[DEVICE]` headers
    pub devices: BTreeSet<String>,
    /// Include targets discovered, in source order
    pub includes: Vec<String>,
}

/// Word operators accepted between expression terms.
const WORD_OPS: &[&str] = &["and", "or", "eq", "neq", "lt", "gt", "le", "ge"];

/// Control keyword → what a well-formed statement looks like. The
/// expectation string feeds error messages; `handler_for` does the
/// dispatch.
const CONSTRUCTS: &[(&str, &str)] = &[
    ("if", "<if EXPR>"),
    ("elseif", "<elseif EXPR>"),
    ("else", "<else>"),
    ("fi", "<fi>"),
    ("loop", "<loop>"),
    ("until", "<until EXPR>"),
    ("while", "<while EXPR>"),
    ("endwhile", "<endwhile>"),
    ("intset", "<intset NAME VALUE>"),
    ("strset", "<strset NAME VALUE...>"),
    ("listset", "<listset NAME VALUE...>"),
    ("intchange", "<intchange $NAME +|- AMOUNT>"),
];

/// Method-pointer lookup for control keywords, generic over the parser's
/// borrow so the pointers instantiate at the call site.
fn handler_for<'x>(
    keyword: &str,
) -> Option<fn(&mut FileParser<'x>, usize, &[Token]) -> Result<(), ScriptError>> {
    Some(match keyword {
        "if" => FileParser::stmt_if,
        "elseif" => FileParser::stmt_elseif,
        "else" => FileParser::stmt_else,
        "fi" => FileParser::stmt_fi,
        "loop" => FileParser::stmt_loop,
        "until" => FileParser::stmt_until,
        "while" => FileParser::stmt_while,
        "endwhile" => FileParser::stmt_endwhile,
        "intset" => FileParser::stmt_intset,
        "strset" => FileParser::stmt_strset,
        "listset" => FileParser::stmt_listset,
        "intchange" => FileParser::stmt_intchange,
        _ => return None,
    })
}

pub struct Parser<'a> {
    registry: &'a SyntaxRegistry,
    apis: &'a ApiRegistry,
    file: String,
}

impl<'a> Parser<'a> {
    pub fn new(
        registry: &'a SyntaxRegistry,
        apis: &'a ApiRegistry,
        file: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            apis,
            file: file.into(),
        }
    }

    /// Compile source text to an instruction sequence plus the device and
    /// include sets.
    pub fn parse(&self, source: &str) -> Result<ParseOutput, ScriptError> {
        let devcmd = DeviceCommandCompiler::new().map_err(|e| self.locate(e, 0))?;
        let mut fp = FileParser {
            registry: self.registry,
            apis: self.apis,
            devcmd,
            out: Vec::new(),
            blocks: Vec::new(),
            devices: BTreeSet::new(),
            includes: Vec::new(),
        };

        let mut lexer = Lexer::new(self.registry);
        let mut last_line = 0;
        for (i, raw) in source.lines().enumerate() {
            let line_number = i + 1;
            last_line = line_number;
            let line = lexer
                .classify(raw, line_number)
                .map_err(|e| self.locate(e, line_number))?;
            fp.consume(line, line_number)
                .map_err(|e| self.locate(e, line_number))?;
        }

        if let Some(block) = fp.blocks.last() {
            let expected = match block {
                OpenBlock::IfChain { .. } => "<fi> closing the open <if>",
                OpenBlock::Loop { .. } => "<until EXPR> closing the open <loop>",
                OpenBlock::While { .. } => "<endwhile> closing the open <while>",
            };
            return Err(self.locate(
                ScriptError::syntax("unexpected end of file").with_expected(expected),
                last_line,
            ));
        }

        Ok(ParseOutput {
            instructions: fp.out,
            devices: fp.devices,
            includes: fp.includes,
        })
    }

    fn locate(&self, mut e: ScriptError, line: usize) -> ScriptError {
        if e.file.is_none() {
            e.file = Some(self.file.clone());
        }
        if e.line.is_none() && line > 0 {
            e.line = Some(line);
        }
        e
    }
}

/// An open control construct, addressed by index into the output vector.
enum OpenBlock {
    IfChain { open: usize, in_else: bool },
    Loop { head: usize },
    While { head: usize },
}

struct FileParser<'a> {
    registry: &'a SyntaxRegistry,
    apis: &'a ApiRegistry,
    devcmd: DeviceCommandCompiler,
    out: Vec<Instruction>,
    blocks: Vec<OpenBlock>,
    devices: BTreeSet<String>,
    includes: Vec<String>,
}

impl<'a> FileParser<'a> {
    fn consume(&mut self, line: Line, n: usize) -> Result<(), ScriptError> {
        match line {
            Line::Blank | Line::Comment => Ok(()),
            Line::Section(name) => {
                self.devices.insert(name.clone());
                self.out.push(Instruction::at(Opcode::Device, n).text(name));
                Ok(())
            }
            Line::Include(tokens) => self.stmt_include(n, &tokens),
            Line::Control { keyword, rest } => {
                let handler = handler_for(&keyword).ok_or_else(|| {
                    ScriptError::syntax(format!("unknown construct '{}'", keyword))
                        .with_text(format!("<{}>", keyword))
                        .with_expected("a known control statement")
                })?;
                let expected = CONSTRUCTS
                    .iter()
                    .find(|(k, _)| *k == keyword)
                    .map(|(_, e)| *e)
                    .unwrap_or("a known control statement");
                handler(self, n, &rest).map_err(|e| {
                    if e.expected.is_none() {
                        e.with_expected(expected)
                    } else {
                        e
                    }
                })
            }
            Line::Api { name, rest } => self.stmt_api(&name, n, &rest),
            Line::Command(text) => {
                self.devcmd.compile_into(&text, n, &mut self.out);
                Ok(())
            }
        }
    }

    // ──────────────────────────────────────────────────────────
    // if / elseif / else / fi
    // ──────────────────────────────────────────────────────────

    fn stmt_if(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let expr = parse_expression(rest)?;
        self.out
            .push(Instruction::at(Opcode::IfNotGoto, n).tokens(expr));
        self.blocks.push(OpenBlock::IfChain {
            open: self.out.len() - 1,
            in_else: false,
        });
        Ok(())
    }

    fn stmt_elseif(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let open = match self.blocks.last() {
            Some(OpenBlock::IfChain { open, in_else: false }) => *open,
            Some(OpenBlock::IfChain { in_else: true, .. }) => {
                return Err(ScriptError::syntax("'<elseif>' after '<else>'")
                    .with_text("<elseif>")
                    .with_expected("<fi>"));
            }
            _ => {
                return Err(ScriptError::syntax("'<elseif>' without matching '<if>'")
                    .with_text("<elseif>")
                    .with_expected("an open <if> block"));
            }
        };
        let expr = parse_expression(rest)?;
        // The open branch learns where to jump when its condition fails.
        self.out[open].patch(n);
        self.out.push(Instruction::at(Opcode::ElseIf, n).tokens(expr));
        if let Some(OpenBlock::IfChain { open, .. }) = self.blocks.last_mut() {
            *open = self.out.len() - 1;
        }
        Ok(())
    }

    fn stmt_else(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        expect_no_args("else", rest)?;
        let open = match self.blocks.last() {
            Some(OpenBlock::IfChain { open, in_else: false }) => *open,
            Some(OpenBlock::IfChain { in_else: true, .. }) => {
                return Err(ScriptError::syntax("duplicate '<else>'")
                    .with_text("<else>")
                    .with_expected("<fi>"));
            }
            _ => {
                return Err(ScriptError::syntax("'<else>' without matching '<if>'")
                    .with_text("<else>")
                    .with_expected("an open <if> block"));
            }
        };
        self.out[open].patch(n);
        self.out.push(Instruction::at(Opcode::Else, n));
        if let Some(OpenBlock::IfChain { open, in_else }) = self.blocks.last_mut() {
            *open = self.out.len() - 1;
            *in_else = true;
        }
        Ok(())
    }

    fn stmt_fi(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        expect_no_args("fi", rest)?;
        let open = match self.blocks.last() {
            Some(OpenBlock::IfChain { open, .. }) => *open,
            _ => {
                return Err(ScriptError::syntax("'<fi>' without matching '<if>'")
                    .with_text("<fi>")
                    .with_expected("an open <if> block"));
            }
        };
        self.out[open].patch(n);
        self.out.push(Instruction::at(Opcode::EndIf, n));
        self.blocks.pop();
        Ok(())
    }

    // ──────────────────────────────────────────────────────────
    // loop / until and while / endwhile
    // ──────────────────────────────────────────────────────────

    fn stmt_loop(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        expect_no_args("loop", rest)?;
        self.out.push(Instruction::at(Opcode::LoopBegin, n));
        self.blocks.push(OpenBlock::Loop {
            head: self.out.len() - 1,
        });
        Ok(())
    }

    fn stmt_until(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let head = match self.blocks.last() {
            Some(OpenBlock::Loop { head }) => *head,
            _ => {
                return Err(ScriptError::syntax("'<until>' without matching '<loop>'")
                    .with_text("<until>")
                    .with_expected("an open <loop> block"));
            }
        };
        let expr = parse_expression(rest)?;
        let head_line = self.out[head].line.unwrap_or(0);
        self.out.push(
            Instruction::at(Opcode::Until, n)
                .tokens(expr)
                .int(head_line as i64),
        );
        self.blocks.pop();
        Ok(())
    }

    fn stmt_while(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let expr = parse_expression(rest)?;
        self.out.push(Instruction::at(Opcode::While, n).tokens(expr));
        self.blocks.push(OpenBlock::While {
            head: self.out.len() - 1,
        });
        Ok(())
    }

    fn stmt_endwhile(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        expect_no_args("endwhile", rest)?;
        let head = match self.blocks.last() {
            Some(OpenBlock::While { head }) => *head,
            _ => {
                return Err(ScriptError::syntax("'<endwhile>' without matching '<while>'")
                    .with_text("<endwhile>")
                    .with_expected("an open <while> block"));
            }
        };
        let head_line = self.out[head].line.unwrap_or(0);
        // The while head learns its exit target; endwhile its jump-back.
        self.out[head].patch(n);
        self.out
            .push(Instruction::at(Opcode::EndWhile, n).int(head_line as i64));
        self.blocks.pop();
        Ok(())
    }

    // ──────────────────────────────────────────────────────────
    // Variable statements
    // ──────────────────────────────────────────────────────────

    fn stmt_intset(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let (name, value) = name_and_single_value(rest)?;
        self.out
            .push(Instruction::at(Opcode::IntSet, n).text(name).text(value));
        Ok(())
    }

    fn stmt_strset(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let (name, values) = name_and_values(rest)?;
        self.out.push(
            Instruction::at(Opcode::StrSet, n)
                .text(name)
                .text(values.join(" ")),
        );
        Ok(())
    }

    fn stmt_listset(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let (name, values) = name_and_values(rest)?;
        self.out
            .push(Instruction::at(Opcode::ListSet, n).text(name).tokens(values));
        Ok(())
    }

    fn stmt_intchange(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        // Both `$i - 1` and the fused `$i -1` arrive here; the tokenizer
        // folds a leading sign into the number.
        let (target, sign, amount) = match rest {
            [target, op, val] => {
                if !op.is(TokenKind::Symbol, "+") && !op.is(TokenKind::Symbol, "-") {
                    return Err(ScriptError::syntax("intchange operator must be + or -")
                        .with_text(op.text.clone()));
                }
                (target, op.text.clone(), value_text(val))
            }
            [target, val] if val.kind == TokenKind::Num && val.text.starts_with('-') => {
                (target, "-".to_string(), val.text[1..].to_string())
            }
            _ => {
                return Err(ScriptError::syntax(
                    "intchange wants a variable, an operator and an amount",
                )
                .with_text(join_tokens(rest)));
            }
        };
        let name = match target.kind {
            TokenKind::Var | TokenKind::Ident => target.text.clone(),
            _ => {
                return Err(ScriptError::syntax("intchange target must be a variable")
                    .with_text(target.text.clone()));
            }
        };
        self.out.push(
            Instruction::at(Opcode::IntChange, n)
                .text(name)
                .text(sign)
                .text(amount),
        );
        Ok(())
    }

    // ──────────────────────────────────────────────────────────
    // include and API-call lines
    // ──────────────────────────────────────────────────────────

    /// Include paths are scanned greedily across the remaining same-line
    /// tokens; variables stay in `{$name}` form for later substitution.
    fn stmt_include(&mut self, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        if rest.is_empty() {
            return Err(ScriptError::syntax("include without a file")
                .with_expected("include PATH"));
        }
        let path: String = rest.iter().map(value_text).collect();
        self.includes.push(path.clone());
        self.out
            .push(Instruction::at(Opcode::CallScript, n).text(path));
        Ok(())
    }

    fn stmt_api(&mut self, name: &str, n: usize, rest: &[Token]) -> Result<(), ScriptError> {
        let schema = self.registry.schema(name).ok_or_else(|| {
            ScriptError::syntax(format!("no schema for '{}'", name)).with_text(name)
        })?;

        let values = match schema.mode {
            ParseMode::Flags => parse_flag_args(schema, rest)?,
            ParseMode::Positional => parse_positional_args(schema, rest)?,
            ParseMode::Mixed => parse_mixed_args(schema, rest)?,
        };

        let op = match builtin_opcode(name) {
            Some(op) => op,
            None => {
                let handle = self.apis.resolve(name).ok_or_else(|| {
                    ScriptError::new(
                        crate::error::ErrorKind::UnknownApi,
                        format!("API '{}' is not registered", name),
                    )
                })?;
                Opcode::Api {
                    handle,
                    name: name.to_string(),
                }
            }
        };

        let mut instr = Instruction::at(op, n);
        for v in values {
            instr = instr.text(v);
        }
        self.out.push(instr);
        Ok(())
    }
}

/// Statements whose schema name maps onto a built-in opcode.
fn builtin_opcode(name: &str) -> Option<Opcode> {
    match name {
        "expect" => Some(Opcode::Expect),
        "search" => Some(Opcode::Search),
        "sleep" => Some(Opcode::Sleep),
        "setvar" => Some(Opcode::SetVar),
        "report" => Some(Opcode::Report),
        "clearbuf" => Some(Opcode::ClearBuf),
        _ => None,
    }
}

/// Render a value token for an instruction parameter. Variables keep their
/// brace form so run-time interpolation finds them.
fn value_text(token: &Token) -> String {
    match token.kind {
        TokenKind::Var => format!("{{${}}}", token.text),
        _ => token.text.clone(),
    }
}

fn is_value_token(token: &Token) -> bool {
    match token.kind {
        TokenKind::Str | TokenKind::Num | TokenKind::Var | TokenKind::Keyword => true,
        TokenKind::Ident => !token.text.starts_with('-'),
        TokenKind::Symbol => false,
    }
}

fn join_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn expect_no_args(what: &str, rest: &[Token]) -> Result<(), ScriptError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::syntax(format!("'<{}>' takes no arguments", what))
            .with_text(join_tokens(rest)))
    }
}

fn name_and_single_value(rest: &[Token]) -> Result<(String, String), ScriptError> {
    let (name, values) = name_and_values(rest)?;
    if values.len() != 1 {
        return Err(ScriptError::syntax("exactly one value expected")
            .with_text(values.join(" ")));
    }
    Ok((name, values.into_iter().next().expect("checked length")))
}

fn name_and_values(rest: &[Token]) -> Result<(String, Vec<String>), ScriptError> {
    let name = match rest.first() {
        Some(t) if matches!(t.kind, TokenKind::Ident | TokenKind::Var) => t.text.clone(),
        Some(t) => {
            return Err(ScriptError::syntax("first argument must be a name")
                .with_text(t.text.clone()));
        }
        None => return Err(ScriptError::syntax("missing variable name")),
    };
    if rest.len() < 2 {
        return Err(ScriptError::syntax("missing value"));
    }
    Ok((name, rest[1..].iter().map(value_text).collect()))
}

/// Expression production: term (operator term)* — terms are identifiers,
/// numbers, strings or variables; operators are symbols or the word
/// operators. Produces the flat token list the VM evaluates at run time, so
/// variable values resolve only when the branch actually executes.
fn parse_expression(rest: &[Token]) -> Result<Vec<String>, ScriptError> {
    if rest.is_empty() {
        return Err(ScriptError::syntax("empty condition").with_expected("an expression"));
    }
    let mut out = Vec::with_capacity(rest.len());
    let mut i = 0;
    loop {
        let term = rest.get(i).ok_or_else(|| {
            ScriptError::syntax("expression ends after an operator")
                .with_text(join_tokens(rest))
                .with_expected("identifier, number or variable")
        })?;
        match term.kind {
            TokenKind::Num | TokenKind::Ident | TokenKind::Str => out.push(term.text.clone()),
            TokenKind::Var => out.push(format!("${}", term.text)),
            _ => {
                return Err(ScriptError::syntax("bad expression term")
                    .with_text(term.text.clone())
                    .with_expected("identifier, number or variable"));
            }
        }
        i += 1;

        match rest.get(i) {
            None => break,
            Some(t)
                if t.kind == TokenKind::Symbol
                    || (t.kind == TokenKind::Ident && WORD_OPS.contains(&t.text.as_str())) =>
            {
                out.push(t.text.clone());
                i += 1;
            }
            Some(t) => {
                return Err(ScriptError::syntax("two terms in a row")
                    .with_text(t.text.clone())
                    .with_expected("an operator"));
            }
        }
    }
    Ok(out)
}

/// Consume `-flag value` pairs and emit the parameter list in the schema's
/// declared position order — never source order — because downstream code
/// consumes it positionally.
fn parse_flag_args(schema: &ApiSchema, rest: &[Token]) -> Result<Vec<String>, ScriptError> {
    let params = schema.params_in_position_order();
    let mut values: Vec<Option<String>> = vec![None; params.len()];

    let mut i = 0;
    while i < rest.len() {
        let tok = &rest[i];
        let flag = match tok.kind {
            TokenKind::Ident => tok.text.strip_prefix('-'),
            _ => None,
        }
        .ok_or_else(|| {
            ScriptError::syntax(format!("{}: expected a -flag here", schema.name))
                .with_text(tok.text.clone())
                .with_expected("-flag VALUE")
        })?;

        let param = schema.param_for_flag(flag).ok_or_else(|| {
            let known: Vec<String> = schema
                .params
                .iter()
                .filter_map(|p| p.flag.as_ref().map(|f| format!("-{}", f)))
                .collect();
            ScriptError::syntax(format!("{}: unknown flag -{}", schema.name, flag))
                .with_text(tok.text.clone())
                .with_expected(known.join(", "))
        })?;

        let value = match rest.get(i + 1) {
            Some(v) if is_value_token(v) => {
                i += 2;
                value_text(v)
            }
            // A boolean flag's bare presence means true
            _ if param.ty == ParamType::Bool => {
                i += 1;
                "true".to_string()
            }
            _ => {
                return Err(ScriptError::syntax(format!(
                    "{}: flag -{} needs a value",
                    schema.name, flag
                ))
                .with_text(tok.text.clone()));
            }
        };

        // Values holding a variable reference are cast at run time instead.
        let value = if value.contains("{$") {
            value
        } else {
            param.cast(&value)?
        };
        values[param.position] = Some(value);
    }

    fill_defaults(schema, values)
}

/// Leading positional arguments bind to the schema's first positions in
/// order; everything after the first `-flag` must be flag/value pairs.
fn parse_mixed_args(schema: &ApiSchema, rest: &[Token]) -> Result<Vec<String>, ScriptError> {
    let params = schema.params_in_position_order();
    let mut values: Vec<Option<String>> = vec![None; params.len()];

    let mut i = 0;
    let mut pos = 0;
    let mut seen_flag = false;
    while i < rest.len() {
        let tok = &rest[i];
        let flag = match tok.kind {
            TokenKind::Ident => tok.text.strip_prefix('-'),
            _ => None,
        };
        if let Some(flag) = flag {
            seen_flag = true;
            let param = schema.param_for_flag(flag).ok_or_else(|| {
                let known: Vec<String> = schema
                    .params
                    .iter()
                    .filter_map(|p| p.flag.as_ref().map(|f| format!("-{}", f)))
                    .collect();
                ScriptError::syntax(format!("{}: unknown flag -{}", schema.name, flag))
                    .with_text(tok.text.clone())
                    .with_expected(known.join(", "))
            })?;
            let value = match rest.get(i + 1) {
                Some(v) if is_value_token(v) => {
                    i += 2;
                    value_text(v)
                }
                _ if param.ty == ParamType::Bool => {
                    i += 1;
                    "true".to_string()
                }
                _ => {
                    return Err(ScriptError::syntax(format!(
                        "{}: flag -{} needs a value",
                        schema.name, flag
                    ))
                    .with_text(tok.text.clone()));
                }
            };
            let value = if value.contains("{$") {
                value
            } else {
                param.cast(&value)?
            };
            values[param.position] = Some(value);
        } else {
            if seen_flag {
                return Err(ScriptError::syntax(format!(
                    "{}: positional argument after flags",
                    schema.name
                ))
                .with_text(tok.text.clone())
                .with_expected("-flag VALUE"));
            }
            if !is_value_token(tok) {
                return Err(ScriptError::syntax(format!("{}: bad argument", schema.name))
                    .with_text(tok.text.clone()));
            }
            if pos >= params.len() {
                return Err(ScriptError::syntax(format!(
                    "{}: too many arguments ({} max)",
                    schema.name,
                    params.len()
                ))
                .with_text(join_tokens(rest)));
            }
            let value = value_text(tok);
            let value = if value.contains("{$") {
                value
            } else {
                params[pos].cast(&value)?
            };
            values[pos] = Some(value);
            pos += 1;
            i += 1;
        }
    }

    fill_defaults(schema, values)
}

fn parse_positional_args(schema: &ApiSchema, rest: &[Token]) -> Result<Vec<String>, ScriptError> {
    let params = schema.params_in_position_order();
    if rest.len() > params.len() {
        return Err(ScriptError::syntax(format!(
            "{}: too many arguments ({} max)",
            schema.name,
            params.len()
        ))
        .with_text(join_tokens(rest)));
    }

    let mut values: Vec<Option<String>> = vec![None; params.len()];
    for (i, tok) in rest.iter().enumerate() {
        if !is_value_token(tok) {
            return Err(ScriptError::syntax(format!("{}: bad argument", schema.name))
                .with_text(tok.text.clone()));
        }
        let value = value_text(tok);
        let value = if value.contains("{$") {
            value
        } else {
            params[i].cast(&value)?
        };
        values[i] = Some(value);
    }

    fill_defaults(schema, values)
}

/// Missing parameters take their schema defaults; a missing required
/// parameter is a syntax error.
fn fill_defaults(schema: &ApiSchema, values: Vec<Option<String>>) -> Result<Vec<String>, ScriptError> {
    let params = schema.params_in_position_order();
    let mut out = Vec::with_capacity(values.len());
    for (slot, param) in values.into_iter().zip(params) {
        match slot {
            Some(v) => out.push(v),
            None => {
                if param.required {
                    return Err(ScriptError::syntax(format!(
                        "{}: missing required parameter '{}'",
                        schema.name, param.name
                    ))
                    .with_expected(match &param.flag {
                        Some(f) => format!("-{} VALUE", f),
                        None => param.name.clone(),
                    }));
                }
                out.push(param.default.clone().unwrap_or_default());
            }
        }
    }
    Ok(out)
}
