//! Syntax Registry
//!
//! Single source of truth for the DSL grammar. Loads a declarative grammar
//! description (TOML) and generates the two regular expressions the rest of
//! the compiler runs on: the line pattern (one alternation classifying a
//! whole source line) and the token pattern (one alternation matching the
//! next token at a cursor position). `refresh()` re-generates both patterns
//! to absorb API names supplied by the API Dispatch Registry.
//!
//! Alternatives are sorted by length, descending, before being joined, so a
//! longer keyword or API name is never shadowed by a shorter prefix match.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::ScriptError;

/// The default grammar shipped with the crate.
const DEFAULT_GRAMMAR: &str = include_str!("../grammar/netspec.toml");

/// How a statement's arguments are parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Arguments are consumed in declared position order
    Positional,
    /// Arguments are `-flag value` pairs, emitted in schema position order
    Flags,
    /// Leading positional arguments followed by `-flag value` pairs
    Mixed,
}

/// Declared parameter type, used to validate and cast runtime values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    Str,
    Int,
    Bool,
}

/// One parameter of a statement schema
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: ParamType,
    #[serde(default)]
    pub required: bool,
    /// Default value when the parameter is absent from the source line
    pub default: Option<String>,
    /// Allowed values; empty means unrestricted
    #[serde(default)]
    pub choices: Vec<String>,
    /// CLI flag alias (`-e`, `-for`, ...), without the dash
    pub flag: Option<String>,
    /// Declared position in the emitted parameter list
    pub position: usize,
}

impl ParamSchema {
    /// Validate and cast a raw source value against this schema entry.
    pub fn cast(&self, raw: &str) -> Result<String, ScriptError> {
        match self.ty {
            ParamType::Int => {
                raw.parse::<i64>().map_err(|_| {
                    ScriptError::bad_parameter(format!(
                        "parameter '{}' wants an integer, got '{}'",
                        self.name, raw
                    ))
                })?;
            }
            ParamType::Bool => {
                if raw != "true" && raw != "false" {
                    return Err(ScriptError::bad_parameter(format!(
                        "parameter '{}' wants true/false, got '{}'",
                        self.name, raw
                    )));
                }
            }
            ParamType::Str => {}
        }
        if !self.choices.is_empty() && !self.choices.iter().any(|c| c == raw) {
            return Err(ScriptError::bad_parameter(format!(
                "parameter '{}' must be one of {:?}, got '{}'",
                self.name, self.choices, raw
            )));
        }
        Ok(raw.to_string())
    }
}

/// A declarative record for one statement or API call
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSchema {
    pub name: String,
    pub mode: ParseMode,
    #[serde(default, rename = "param")]
    pub params: Vec<ParamSchema>,
}

impl ApiSchema {
    /// Parameters sorted by declared position.
    pub fn params_in_position_order(&self) -> Vec<&ParamSchema> {
        let mut out: Vec<&ParamSchema> = self.params.iter().collect();
        out.sort_by_key(|p| p.position);
        out
    }

    /// Find the schema entry for a `-flag`.
    pub fn param_for_flag(&self, flag: &str) -> Option<&ParamSchema> {
        self.params
            .iter()
            .find(|p| p.flag.as_deref() == Some(flag))
    }
}

#[derive(Debug, Deserialize)]
struct GrammarFile {
    keywords: KeywordsSection,
    #[serde(default, rename = "api")]
    apis: Vec<ApiSchema>,
}

#[derive(Debug, Deserialize)]
struct KeywordsSection {
    control: Vec<String>,
}

/// The registry: grammar description plus the generated patterns.
///
/// Constructed eagerly with everything it needs; `refresh()` is the only
/// mutation and only adds externally-discovered API names.
#[derive(Debug)]
pub struct SyntaxRegistry {
    keywords: Vec<String>,
    apis: HashMap<String, ApiSchema>,
    line_re: Regex,
    token_re: Regex,
}

impl SyntaxRegistry {
    /// Build a registry from the embedded default grammar.
    pub fn default_grammar() -> Result<Self, ScriptError> {
        Self::from_toml(DEFAULT_GRAMMAR)
    }

    /// Build a registry from grammar TOML text. A malformed description is a
    /// fatal startup error.
    pub fn from_toml(text: &str) -> Result<Self, ScriptError> {
        let file: GrammarFile = toml::from_str(text)
            .map_err(|e| ScriptError::grammar(format!("bad grammar description: {}", e)))?;

        let mut apis = HashMap::new();
        for schema in file.apis {
            validate_schema(&schema)?;
            apis.insert(schema.name.clone(), schema);
        }

        let keywords = file.keywords.control;
        if keywords.is_empty() {
            return Err(ScriptError::grammar("grammar declares no control keywords"));
        }

        let (line_re, token_re) = generate_patterns(&keywords, &apis)?;
        Ok(Self {
            keywords,
            apis,
            line_re,
            token_re,
        })
    }

    /// Build a registry from a grammar file on disk.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::grammar(format!("cannot read grammar {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// The line-classification pattern.
    pub fn line_pattern(&self) -> &Regex {
        &self.line_re
    }

    /// The token pattern, matched repeatedly at a cursor position.
    pub fn token_pattern(&self) -> &Regex {
        &self.token_re
    }

    /// Look up the schema for a statement or API name.
    pub fn schema(&self, name: &str) -> Option<&ApiSchema> {
        self.apis.get(name)
    }

    /// True if `word` is a control keyword.
    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.iter().any(|k| k == word)
    }

    /// Absorb externally-supplied API schemas (from the API Dispatch
    /// Registry) and regenerate both patterns. Re-registering a name
    /// replaces its schema.
    pub fn refresh(&mut self, extra_apis: Vec<ApiSchema>) -> Result<(), ScriptError> {
        for schema in extra_apis {
            validate_schema(&schema)?;
            self.apis.insert(schema.name.clone(), schema);
        }
        let (line_re, token_re) = generate_patterns(&self.keywords, &self.apis)?;
        self.line_re = line_re;
        self.token_re = token_re;
        Ok(())
    }
}

fn validate_schema(schema: &ApiSchema) -> Result<(), ScriptError> {
    let mut positions: Vec<usize> = schema.params.iter().map(|p| p.position).collect();
    positions.sort_unstable();
    for (i, pos) in positions.iter().enumerate() {
        if *pos != i {
            return Err(ScriptError::grammar(format!(
                "api '{}': parameter positions must be 0..{} without gaps",
                schema.name,
                schema.params.len()
            )));
        }
    }
    if schema.mode == ParseMode::Flags {
        if let Some(p) = schema.params.iter().find(|p| p.flag.is_none()) {
            return Err(ScriptError::grammar(format!(
                "api '{}': flag-mode parameter '{}' has no flag alias",
                schema.name, p.name
            )));
        }
    }
    for p in &schema.params {
        if !p.required && p.default.is_none() {
            return Err(ScriptError::grammar(format!(
                "api '{}': optional parameter '{}' needs a default",
                schema.name, p.name
            )));
        }
    }
    Ok(())
}

/// Join alternatives longest-first so prefixes never shadow longer names.
fn sorted_alternation(names: impl Iterator<Item = String>) -> String {
    let mut escaped: Vec<String> = names.map(|n| regex::escape(&n)).collect();
    escaped.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    escaped.join("|")
}

fn generate_patterns(
    keywords: &[String],
    apis: &HashMap<String, ApiSchema>,
) -> Result<(Regex, Regex), ScriptError> {
    let kw_alt = sorted_alternation(keywords.iter().cloned());
    let api_alt = sorted_alternation(apis.keys().cloned());

    // One alternation classifying a whole source line. Group names are the
    // dispatch keys the lexer switches on.
    let line_src = format!(
        r"^\s*(?:(?P<comment>(?:comment:|Comment:|\#).*)|(?P<section>\[[A-Za-z0-9_.:-]+\])\s*|include\s+(?P<include>\S.*?)\s*|<\s*(?P<control>{kw})\b(?P<control_rest>.*?)\s*>\s*|(?P<api>{api})\b(?P<api_rest>.*?)\s*|(?P<command>\S.*?)\s*)$",
        kw = kw_alt,
        api = api_alt,
    );
    let line_re = build(&line_src)?;

    // One alternation matching the next token at the cursor. Variable refs
    // come in two textual forms and normalize to the same token kind.
    // Numbers admit dotted runs so IP addresses and versions stay one token.
    // A lone `.` is a symbol: path fragments like `{$case}.nsp` continue
    // with an extension after a variable.
    let token_src = r#"(?:\{\$(?P<bracevar>[A-Za-z_][A-Za-z0-9_]*)\}|\$(?P<var>[A-Za-z_][A-Za-z0-9_]*)|"(?P<string>(?:[^"\\]|\\.)*)"|(?P<number>-?[0-9]+(?:\.[0-9]+)*)\b|(?P<ident>-?[A-Za-z_][A-Za-z0-9_./\\:-]*)|(?P<symbol>==|!=|<=|>=|[<>=+\-*/%,.]))"#;
    let token_re = build(token_src)?;

    Ok((line_re, token_re))
}

fn build(src: &str) -> Result<Regex, ScriptError> {
    RegexBuilder::new(src)
        .size_limit(1 << 22)
        .build()
        .map_err(|e| ScriptError::grammar(format!("generated pattern is invalid: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grammar_loads() {
        let reg = SyntaxRegistry::default_grammar().unwrap();
        assert!(reg.is_keyword("elseif"));
        assert!(reg.schema("expect").is_some());
        assert!(reg.schema("nosuch").is_none());
    }

    #[test]
    fn test_malformed_grammar_is_fatal() {
        let err = SyntaxRegistry::from_toml("keywords = 3").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Grammar);
    }

    #[test]
    fn test_flag_mode_requires_aliases() {
        let toml = r#"
            [keywords]
            control = ["if"]
            [[api]]
            name = "broken"
            mode = "flags"
            [[api.param]]
            name = "x"
            required = true
            position = 0
        "#;
        assert!(SyntaxRegistry::from_toml(toml).is_err());
    }

    #[test]
    fn test_longer_names_win() {
        // "elseif" must not be matched as "else" followed by "if"
        let reg = SyntaxRegistry::default_grammar().unwrap();
        let caps = reg.line_pattern().captures("<elseif $x == 1>").unwrap();
        assert_eq!(caps.name("control").unwrap().as_str(), "elseif");
    }

    #[test]
    fn test_line_classification() {
        let reg = SyntaxRegistry::default_grammar().unwrap();
        let line = reg.line_pattern();

        assert!(line.captures("[FGT1]").unwrap().name("section").is_some());
        assert!(line.captures("comment: note").unwrap().name("comment").is_some());
        assert!(line.captures("# hash note").unwrap().name("comment").is_some());
        assert!(line.captures("include sub/case.nsp").unwrap().name("include").is_some());
        assert!(line.captures("<if $x > 2>").unwrap().name("control").is_some());
        assert!(line
            .captures(r#"expect -e "login:" -t 5"#)
            .unwrap()
            .name("api")
            .is_some());
        assert!(line.captures("get system status").unwrap().name("command").is_some());
    }

    #[test]
    fn test_refresh_absorbs_api_names() {
        let mut reg = SyntaxRegistry::default_grammar().unwrap();
        assert!(reg
            .line_pattern()
            .captures("ping -h 10.0.0.1")
            .unwrap()
            .name("command")
            .is_some());

        reg.refresh(vec![ApiSchema {
            name: "ping".into(),
            mode: ParseMode::Flags,
            params: vec![ParamSchema {
                name: "host".into(),
                ty: ParamType::Str,
                required: true,
                default: None,
                choices: vec![],
                flag: Some("h".into()),
                position: 0,
            }],
        }])
        .unwrap();

        assert!(reg
            .line_pattern()
            .captures("ping -h 10.0.0.1")
            .unwrap()
            .name("api")
            .is_some());
    }

    #[test]
    fn test_param_cast() {
        let p = ParamSchema {
            name: "timeout".into(),
            ty: ParamType::Int,
            required: false,
            default: Some("30".into()),
            choices: vec![],
            flag: Some("t".into()),
            position: 0,
        };
        assert!(p.cast("15").is_ok());
        assert!(p.cast("soon").is_err());
    }
}
