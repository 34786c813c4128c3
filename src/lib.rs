//! netspec: a DSL compiler and instruction-set VM for driving networked
//! appliances in regression tests
//!
//! Scripts are plain text. A compiler pipeline (grammar-driven lexer,
//! table-driven parser, device-command sub-compiler) turns a script into a
//! flat instruction sequence; a small VM executes it against live device
//! sessions, collecting pass/fail results per test-case id (QAID).
//!
//! # Script Syntax
//!
//! ```text
//! comment: provision then verify
//! [FGT1]
//! <intset tries 0>
//! exe factoryreset
//! <loop>
//! <intchange tries + 1>
//! get system status
//! expect -e "Version:" -for 1001 -t 30
//! <until $tries > 2>
//! include common/teardown.nsp
//! ```
//!
//! # Statements
//!
//! | Statement | Description |
//! |-----------|-------------|
//! | `[NAME]` | Switch to device section NAME |
//! | `comment:` / `#` | Comment line |
//! | `include PATH` | Run another script in the same context |
//! | `<if EXPR>` .. `<elseif>` .. `<else>` .. `<fi>` | Conditional chain |
//! | `<loop>` .. `<until EXPR>` | Repeat body until EXPR holds |
//! | `<while EXPR>` .. `<endwhile>` | Repeat body while EXPR holds |
//! | `<intset>` / `<strset>` / `<listset>` / `<intchange>` | Variable statements |
//! | `expect` / `search` | Match device output, record per QAID |
//! | `sleep` / `setvar` / `report` / `clearbuf` | Built-in operations |
//! | anything else | Raw command sent to the current device |
//!
//! Registered API operations (`ping`, `bufcmp`, `match`, `relogin`,
//! `switch`, ...) parse like built-ins; their names come from the dispatch
//! registry at startup.
//!
//! # Variables
//!
//! `{$name}` interpolates a script variable, `SECTION:KEY` reads the
//! environment, and bare `UPPERCASE` tokens resolve against the current
//! device's config namespace.

mod api;
mod apis;
mod compiler;
mod devcmd;
mod device;
mod env;
mod error;
mod executor;
mod expr;
mod instr;
mod lexer;
mod parser;
mod report;
mod syntax;
mod vars;

pub use api::{ApiContext, ApiHandle, ApiOp, ApiRegistry, ApiUsage};
pub use compiler::{CompiledScript, Compiler};
pub use devcmd::{CommandClass, DeviceCommandCompiler};
pub use device::{Device, DeviceTable, ExpectOutcome, ScriptedDevice};
pub use env::{Environment, MapEnvironment};
pub use error::{ErrorKind, ScriptError};
pub use executor::{run_file, Executor, RunContext, RunPolicy};
pub use instr::{Arg, Instruction, Opcode};
pub use lexer::{Lexer, Line, Token, TokenKind};
pub use parser::{ParseOutput, Parser};
pub use report::{ExpectRecord, MemoryReporter, Reporter};
pub use syntax::{ApiSchema, ParamSchema, ParamType, ParseMode, SyntaxRegistry};
pub use vars::{interpolate, FlowStack, Value, VarTable};
