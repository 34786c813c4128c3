//! Command sub-compiler
//!
//! Classifies raw device commands against a fixed regex set and splices in
//! the canned follow-up sequence for the destructive ones, so a factory
//! reset or reboot is never issued without its confirmation and recovery
//! steps. Anything unmatched compiles to a single `command` instruction.
//!
//! The regex set is a behavioral contract and is carried verbatim; do not
//! re-derive it from the command grammar.

use regex::{Regex, RegexBuilder};

use crate::error::ScriptError;
use crate::instr::{Instruction, Opcode};

/// Destructive-command categories with canned follow-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    FactoryReset,
    VmLicenseRestore,
    IpsRestore,
    Reboot,
}

/// The classifier table: category + its contract pattern.
const CLASSIFIER: &[(CommandClass, &str)] = &[
    (CommandClass::FactoryReset, r"^exe(cute)?\s+factoryreset\b"),
    (CommandClass::VmLicenseRestore, r"^exe(cute)?\s+restore\s+vmlicense\b"),
    (CommandClass::IpsRestore, r"^exe(cute)?\s+restore\s+ips\b"),
    (CommandClass::Reboot, r"^exe(cute)?\s+reboot\b"),
];

/// One canned step in a follow-up sequence
struct CannedStep {
    op: Opcode,
    texts: &'static [&'static str],
}

/// Follow-up table, per category. Expect steps use the expect parameter
/// order (pattern, qaid, timeout, fail_pattern, clear).
fn follow_ups(class: CommandClass) -> &'static [CannedStep] {
    const CONFIRM: CannedStep = CannedStep {
        op: Opcode::Command,
        texts: &["y"],
    };
    const RELOGIN: CannedStep = CannedStep {
        op: Opcode::ForceLogin,
        texts: &[],
    };

    match class {
        CommandClass::FactoryReset => &[
            CONFIRM,
            CannedStep {
                op: Opcode::Expect,
                texts: &[r"(?i)login:", "0", "600", "", "true"],
            },
            RELOGIN,
        ],
        CommandClass::Reboot => &[
            CONFIRM,
            CannedStep {
                op: Opcode::Expect,
                texts: &[r"(?i)login:", "0", "300", "", "true"],
            },
            RELOGIN,
        ],
        CommandClass::VmLicenseRestore => &[
            CONFIRM,
            CannedStep {
                op: Opcode::Expect,
                texts: &[r"(?i)login:", "0", "300", "", "true"],
            },
            RELOGIN,
        ],
        CommandClass::IpsRestore => &[
            CONFIRM,
            CannedStep {
                op: Opcode::Expect,
                texts: &[r"(?i)(#|\$)\s*$", "0", "300", "", "false"],
            },
        ],
    }
}

/// Compiled classifier. Built once per parser.
pub struct DeviceCommandCompiler {
    rules: Vec<(CommandClass, Regex)>,
}

impl DeviceCommandCompiler {
    pub fn new() -> Result<Self, ScriptError> {
        let mut rules = Vec::with_capacity(CLASSIFIER.len());
        for (class, pattern) in CLASSIFIER {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    ScriptError::grammar(format!("command classifier pattern: {}", e))
                })?;
            rules.push((*class, re));
        }
        Ok(Self { rules })
    }

    /// Classify a raw command, if it belongs to a canned category.
    pub fn classify(&self, command: &str) -> Option<CommandClass> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(command.trim()))
            .map(|(class, _)| *class)
    }

    /// Compile a raw command into `out`: the command itself, plus any canned
    /// follow-up sequence its category demands. Follow-ups are synthetic and
    /// carry no line number.
    pub fn compile_into(&self, command: &str, line: usize, out: &mut Vec<Instruction>) {
        out.push(Instruction::at(Opcode::Command, line).text(command));

        let Some(class) = self.classify(command) else {
            return;
        };
        for step in follow_ups(class) {
            let mut instr = Instruction::new(step.op.clone());
            for text in step.texts {
                instr = instr.text(*text);
            }
            out.push(instr);
        }
    }
}
