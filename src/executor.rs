//! VM executor
//!
//! A program-counter loop over one script's instruction copy. Control flow
//! jumps are expressed as 1-based source lines; the executor maps lines
//! back to instruction indices once, up front. Included scripts run in a
//! child executor that shares the caller's variable table, flow stack,
//! device set and reporter, so an include behaves like spliced-in source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use regex::RegexBuilder;
use tracing::{debug, trace};

use crate::api::ApiContext;
use crate::compiler::Compiler;
use crate::device::{Device, DeviceTable, ExpectOutcome};
use crate::env::Environment;
use crate::error::{ErrorKind, ScriptError};
use crate::expr;
use crate::instr::{Arg, Instruction, Opcode};
use crate::report::Reporter;
use crate::vars::{self, FlowStack, Value, VarTable};

/// Command prefixes whose following `expect` may be retried by resending
/// the command: transfers and log dumps that legitimately lag.
const RETRY_PREFIXES: &[&str] = &["curl", "wget", "get log", "diag log"];

/// Retry bound, total attempts including the first.
const MAX_EXPECT_ATTEMPTS: u32 = 3;

/// Bound on run-time include nesting. Cycles through variable include
/// paths only become visible here; the compile-time cycle guard cannot
/// see them.
const MAX_INCLUDE_DEPTH: usize = 32;

/// Knobs for one run
#[derive(Debug, Clone, Copy)]
pub struct RunPolicy {
    /// Resend a lagging command and re-expect, up to the attempt bound
    pub retry_on_expect_failure: bool,
    /// Treat `sleep` as a no-op (dry runs, tests)
    pub skip_sleeps: bool,
    /// Abort a runaway script after this many executed instructions
    pub max_steps: u64,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            retry_on_expect_failure: true,
            skip_sleeps: false,
            max_steps: 1_000_000,
        }
    }
}

/// Everything a run mutates, shared across the include tree
pub struct RunContext<'a> {
    pub devices: &'a mut DeviceTable,
    pub vars: &'a mut VarTable,
    pub flow: &'a mut FlowStack,
    pub env: Option<&'a dyn Environment>,
    pub reporter: &'a mut dyn Reporter,
    /// Name of the device section instructions currently target
    pub current_device: String,
    /// Per-run transcript, shown for failed runs
    pub log: String,
}

impl RunContext<'_> {
    pub fn logf(&mut self, msg: &str) {
        self.log.push_str(msg);
        if !msg.ends_with('\n') {
            self.log.push('\n');
        }
    }

    /// The current device session, or a config error when the script
    /// addresses a section no session was attached for.
    pub fn current(&mut self) -> Result<&mut dyn Device, ScriptError> {
        match self.devices.get_mut(&self.current_device) {
            Some(d) => Ok(&mut **d),
            None => Err(ScriptError::config(format!(
                "no device session '{}'",
                self.current_device
            ))),
        }
    }
}

/// Executes one compiled script over a run context.
pub struct Executor<'c> {
    file: PathBuf,
    instructions: Vec<Instruction>,
    compiler: &'c Compiler,
    policy: RunPolicy,
    /// 1-based source line → index of its first instruction
    line_pc: HashMap<usize, usize>,
    last_command: Option<String>,
    steps: u64,
    /// Include nesting level of this executor, 0 at the root
    depth: usize,
}

impl<'c> Executor<'c> {
    /// Retrieve (compiling if needed) a private instruction copy of `file`.
    pub fn new(
        compiler: &'c Compiler,
        file: impl Into<PathBuf>,
        policy: RunPolicy,
    ) -> Result<Self, ScriptError> {
        let file = file.into();
        let instructions = compiler.retrieve(&file)?;
        let mut line_pc = HashMap::new();
        for (pc, instr) in instructions.iter().enumerate() {
            if let Some(line) = instr.line {
                line_pc.entry(line).or_insert(pc);
            }
        }
        Ok(Self {
            file,
            instructions,
            compiler,
            policy,
            line_pc,
            last_command: None,
            steps: 0,
            depth: 0,
        })
    }

    pub fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), ScriptError> {
        debug!(file = %self.file.display(), instructions = self.instructions.len(), "run");
        let mut pc = 0usize;
        while pc < self.instructions.len() {
            self.steps += 1;
            if self.steps > self.policy.max_steps {
                return Err(self.located(
                    ScriptError::new(ErrorKind::Other, "instruction budget exhausted"),
                    self.instructions[pc].line,
                ));
            }
            let mut instr = self.instructions[pc].clone();
            self.interpolate_args(&mut instr, ctx);
            trace!(pc, %instr, "step");

            pc = self
                .dispatch(&instr, pc, ctx)
                .map_err(|e| self.located(e, instr.line))?;
            // Retry applies only to an expect directly after its command;
            // any other instruction in between forfeits it.
            if !matches!(instr.op, Opcode::Command) {
                self.last_command = None;
            }
        }
        Ok(())
    }

    fn located(&self, mut e: ScriptError, line: Option<usize>) -> ScriptError {
        if e.file.is_none() {
            e.file = Some(self.file.display().to_string());
        }
        if e.line.is_none() {
            e.line = line;
        }
        e
    }

    /// Rewrite string parameters of this step's private copy.
    fn interpolate_args(&self, instr: &mut Instruction, ctx: &RunContext<'_>) {
        let device_cfg = ctx
            .env
            .and_then(|env| env.device_config(&ctx.current_device));
        for arg in &mut instr.args {
            if let Arg::Text(s) = arg {
                *s = vars::interpolate(s, ctx.env, ctx.vars, device_cfg);
            }
        }
    }

    fn pc_for_line(&self, line: usize) -> Result<usize, ScriptError> {
        self.line_pc.get(&line).copied().ok_or_else(|| {
            ScriptError::new(
                ErrorKind::Other,
                format!("jump to line {} which holds no instruction", line),
            )
        })
    }

    /// Execute one instruction and return the next pc.
    fn dispatch(
        &mut self,
        instr: &Instruction,
        pc: usize,
        ctx: &mut RunContext<'_>,
    ) -> Result<usize, ScriptError> {
        let next = pc + 1;
        match &instr.op {
            Opcode::Device => {
                let name = instr.text_arg(0)?;
                if !ctx.devices.contains(name) {
                    return Err(ScriptError::config(format!(
                        "script addresses device '{}' but no session was attached",
                        name
                    )));
                }
                ctx.current_device = name.to_string();
                ctx.logf(&format!("### [{}]", name));
                Ok(next)
            }
            Opcode::Command => {
                let text = instr.text_arg(0)?.to_string();
                let entry = format!("{}> {}", ctx.current_device, text);
                ctx.current()?.send_line(&text)?;
                ctx.logf(&entry);
                self.last_command = Some(text);
                Ok(next)
            }
            Opcode::IntSet => {
                let name = instr.text_arg(0)?.to_string();
                let value = instr.int_arg(1)?;
                ctx.vars.set(name, Value::Int(value));
                Ok(next)
            }
            Opcode::StrSet | Opcode::SetVar => {
                let name = instr.text_arg(0)?.to_string();
                let value = instr.text_arg(1)?.to_string();
                ctx.vars.set(name, Value::Str(value));
                Ok(next)
            }
            Opcode::ListSet => {
                let name = instr.text_arg(0)?.to_string();
                let items = instr.tokens_arg(1)?;
                ctx.vars.set(name, Value::Str(items.join(" ")));
                Ok(next)
            }
            Opcode::IntChange => {
                let name = instr.text_arg(0)?.to_string();
                let sign = instr.text_arg(1)?;
                let amount = instr.int_arg(2)?;
                let current = match ctx.vars.get(&name) {
                    Some(v) => v.as_int()?,
                    None => 0,
                };
                let value = if sign == "-" {
                    current - amount
                } else {
                    current + amount
                };
                ctx.vars.set(name, Value::Int(value));
                Ok(next)
            }
            Opcode::Sleep => {
                let seconds = instr.int_arg(0)?.max(0) as u64;
                if !self.policy.skip_sleeps {
                    thread::sleep(Duration::from_secs(seconds));
                }
                Ok(next)
            }
            Opcode::IfNotGoto => {
                let taken = expr::eval(instr.tokens_arg(0)?, ctx.vars)?;
                ctx.flow.push(taken);
                if taken {
                    Ok(next)
                } else {
                    self.pc_for_line(instr.jump_target()?)
                }
            }
            Opcode::ElseIf => {
                // A taken earlier branch hops over the rest of the chain.
                if ctx.flow.top() == Some(true) {
                    return self.pc_for_line(instr.jump_target()?);
                }
                let taken = expr::eval(instr.tokens_arg(0)?, ctx.vars)?;
                if taken {
                    ctx.flow.set_top(true);
                    Ok(next)
                } else {
                    self.pc_for_line(instr.jump_target()?)
                }
            }
            Opcode::Else => {
                if ctx.flow.top() == Some(true) {
                    self.pc_for_line(instr.jump_target()?)
                } else {
                    ctx.flow.set_top(true);
                    Ok(next)
                }
            }
            Opcode::EndIf => {
                ctx.flow.pop()?;
                Ok(next)
            }
            Opcode::LoopBegin => Ok(next),
            Opcode::Until => {
                // Repeat the body until the condition holds.
                if expr::eval(instr.tokens_arg(0)?, ctx.vars)? {
                    Ok(next)
                } else {
                    self.pc_for_line(instr.jump_target()?)
                }
            }
            Opcode::While => {
                if expr::eval(instr.tokens_arg(0)?, ctx.vars)? {
                    Ok(next)
                } else {
                    // Resume just past the closing endwhile.
                    Ok(self.pc_for_line(instr.jump_target()?)? + 1)
                }
            }
            Opcode::EndWhile => self.pc_for_line(instr.jump_target()?),
            Opcode::Expect => {
                self.run_expect(instr, ctx)?;
                Ok(next)
            }
            Opcode::Search => {
                self.run_search(instr, ctx)?;
                Ok(next)
            }
            Opcode::Report => {
                let qaid = instr.text_arg(0)?;
                ctx.reporter.report(qaid);
                Ok(next)
            }
            Opcode::ClearBuf => {
                ctx.current()?.clear_buffer();
                Ok(next)
            }
            Opcode::ForceLogin => {
                ctx.current()?.force_login()?;
                Ok(next)
            }
            Opcode::CallScript => {
                let target = instr.text_arg(0)?;
                if self.depth >= MAX_INCLUDE_DEPTH {
                    return Err(ScriptError::new(
                        ErrorKind::Other,
                        format!(
                            "include nesting deeper than {} levels at '{}'",
                            MAX_INCLUDE_DEPTH, target
                        ),
                    ));
                }
                let resolved = self.compiler.resolve_include(&self.file, target);
                ctx.logf(&format!("include {}", resolved.display()));
                let mut child = Executor::new(self.compiler, resolved, self.policy)?;
                child.depth = self.depth + 1;
                child.run(ctx)?;
                Ok(next)
            }
            Opcode::Api { handle, .. } => {
                let params: Vec<String> = instr
                    .args
                    .iter()
                    .filter_map(|a| match a {
                        Arg::Text(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                let name = ctx.current_device.clone();
                let device = ctx
                    .devices
                    .get_mut(&name)
                    .map(|d| &mut **d)
                    .ok_or_else(|| {
                        ScriptError::config(format!("no device session '{}'", name))
                    })?;
                let mut api_ctx = ApiContext {
                    device,
                    vars: &mut *ctx.vars,
                    reporter: &mut *ctx.reporter,
                    line: instr.line,
                };
                self.compiler.apis().call(*handle, &mut api_ctx, &params)?;
                Ok(next)
            }
        }
    }

    /// `expect pattern qaid timeout fail_pattern clear`. A mismatch records
    /// a failure and execution continues; only transport errors abort.
    fn run_expect(
        &mut self,
        instr: &Instruction,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), ScriptError> {
        let pattern = instr.text_arg(0)?;
        let qaid = instr.text_arg(1)?.to_string();
        let timeout = instr.int_arg(2)?.max(0) as u64;
        let fail_pattern = instr.text_arg(3)?;
        let clear = instr.text_arg(4)? == "true";

        let fail_re = if fail_pattern.is_empty() {
            None
        } else {
            Some(build_pattern(fail_pattern)?)
        };

        let attempts = if self.policy.retry_on_expect_failure && self.retryable_command() {
            MAX_EXPECT_ATTEMPTS
        } else {
            1
        };

        let mut outcome = ExpectOutcome {
            matched: false,
            output: String::new(),
        };
        let mut passed = false;
        for attempt in 1..=attempts {
            let device = ctx.current()?;
            if attempt > 1 {
                let cmd = self.last_command.clone().unwrap_or_default();
                debug!(attempt, %cmd, "re-sending lagging command");
                device.send_line(&cmd)?;
            }
            outcome = device.expect(pattern, timeout, clear)?;
            passed = outcome.matched
                && !fail_re
                    .as_ref()
                    .map(|re| re.is_match(&outcome.output))
                    .unwrap_or(false);
            if passed {
                break;
            }
        }

        ctx.logf(&format!(
            "expect /{}/ -> {} [qaid {}]",
            pattern,
            if passed { "match" } else { "no match" },
            qaid
        ));
        if qaid != "0" {
            ctx.reporter
                .add_expect_result(&qaid, passed, instr.line, &outcome.output);
        }
        if !passed {
            debug!(pattern, %qaid, "expect did not match; continuing");
        }
        Ok(())
    }

    /// `search pattern qaid timeout start`: like expect but offset into the
    /// buffer and never retried.
    fn run_search(
        &mut self,
        instr: &Instruction,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), ScriptError> {
        let pattern = instr.text_arg(0)?;
        let qaid = instr.text_arg(1)?.to_string();
        let timeout = instr.int_arg(2)?.max(0) as u64;
        let start = instr.int_arg(3)?.max(0) as usize;

        let outcome = ctx.current()?.search(pattern, timeout, start)?;
        ctx.logf(&format!(
            "search /{}/ from {} -> {} [qaid {}]",
            pattern,
            start,
            if outcome.matched { "match" } else { "no match" },
            qaid
        ));
        if qaid != "0" {
            ctx.reporter
                .add_expect_result(&qaid, outcome.matched, instr.line, &outcome.output);
        }
        Ok(())
    }

    fn retryable_command(&self) -> bool {
        match &self.last_command {
            Some(cmd) => RETRY_PREFIXES.iter().any(|p| cmd.starts_with(p)),
            None => false,
        }
    }
}

fn build_pattern(pattern: &str) -> Result<regex::Regex, ScriptError> {
    RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
        .map_err(|e| ScriptError::bad_parameter(format!("bad pattern '{}': {}", pattern, e)))
}

/// Run `file` against `devices` from a cold start and return the run
/// transcript. The current device defaults to the table's first entry until
/// the script names a section.
pub fn run_file(
    compiler: &Compiler,
    file: &Path,
    devices: &mut DeviceTable,
    reporter: &mut dyn Reporter,
    env: Option<&dyn Environment>,
    policy: RunPolicy,
) -> Result<String, ScriptError> {
    let mut vars = VarTable::new();
    let mut flow = FlowStack::new();
    let current_device = devices.first_name().unwrap_or_default();
    let mut ctx = RunContext {
        devices,
        vars: &mut vars,
        flow: &mut flow,
        env,
        reporter,
        current_device,
        log: String::new(),
    };
    Executor::new(compiler, file, policy)?.run(&mut ctx)?;
    Ok(ctx.log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiRegistry;
    use crate::device::ScriptedDevice;
    use crate::report::MemoryReporter;
    use crate::syntax::SyntaxRegistry;
    use std::io::Write as _;
    use std::sync::Arc;

    fn compiler() -> Compiler {
        Compiler::new(
            SyntaxRegistry::default_grammar().unwrap(),
            Arc::new(ApiRegistry::builtin()),
        )
        .unwrap()
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    /// Compile and run `body` with one scripted device and return what the
    /// run left behind.
    fn run_with_device(
        body: &str,
        dev: ScriptedDevice,
    ) -> (VarTable, FlowStack, MemoryReporter) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "case.nsp", body);
        let c = compiler();
        let mut devices = DeviceTable::new();
        devices.insert(Box::new(dev));
        let mut vars = VarTable::new();
        let mut flow = FlowStack::new();
        let mut rep = MemoryReporter::new();
        let current_device = devices.first_name().unwrap();
        let mut ctx = RunContext {
            devices: &mut devices,
            vars: &mut vars,
            flow: &mut flow,
            env: None,
            reporter: &mut rep,
            current_device,
            log: String::new(),
        };
        let policy = RunPolicy {
            skip_sleeps: true,
            ..RunPolicy::default()
        };
        Executor::new(&c, &path, policy)
            .unwrap()
            .run(&mut ctx)
            .unwrap();
        (vars, flow, rep)
    }

    fn run_simple(body: &str) -> (VarTable, FlowStack, MemoryReporter) {
        run_with_device(body, ScriptedDevice::new("FGT1"))
    }

    #[test]
    fn test_empty_script_is_a_noop() {
        let (vars, flow, rep) = run_simple("");
        assert!(vars.is_empty());
        assert_eq!(flow.depth(), 0);
        assert!(rep.records.is_empty());
    }

    #[test]
    fn test_if_selects_matching_branch() {
        let mut dev = ScriptedDevice::new("FGT1");
        dev.respond_to("send hi", "HI-SENT");
        let body = "\
[FGT1]
<intset x 2>
<if $x == 1>
send lo
<elseif $x == 2>
send hi
<else>
send other
<fi>
expect -e HI-SENT -for 1001 -t 5
";
        let (_, flow, rep) = run_with_device(body, dev);
        assert_eq!(flow.depth(), 0, "if chain must balance the flow stack");
        assert_eq!(rep.passed("1001"), Some(true));
    }

    #[test]
    fn test_else_branch_when_nothing_matched() {
        let body = "\
[FGT1]
<intset x 9>
<if $x == 1>
<strset r one>
<elseif $x == 2>
<strset r two>
<else>
<strset r other>
<fi>
";
        let (vars, flow, _) = run_simple(body);
        assert_eq!(vars.get("r"), Some(&Value::Str("other".into())));
        assert_eq!(flow.depth(), 0);
    }

    #[test]
    fn test_taken_branch_skips_later_arms() {
        let body = "\
[FGT1]
<intset x 1>
<if $x == 1>
<strset r one>
<elseif $x == 1>
<strset r again>
<else>
<strset r other>
<fi>
";
        let (vars, _, _) = run_simple(body);
        assert_eq!(vars.get("r"), Some(&Value::Str("one".into())));
    }

    #[test]
    fn test_loop_until_runs_body_to_the_bound() {
        let body = "\
[FGT1]
<intset i 0>
<loop>
<intchange i + 1>
<until $i > 3>
";
        let (vars, _, _) = run_simple(body);
        assert_eq!(vars.get("i"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_while_counts_and_exits() {
        let body = "\
[FGT1]
<intset i 0>
<while $i < 3>
<intchange i + 1>
<endwhile>
<strset done yes>
";
        let (vars, _, _) = run_simple(body);
        assert_eq!(vars.get("i"), Some(&Value::Int(3)));
        assert_eq!(vars.get("done"), Some(&Value::Str("yes".into())));
    }

    #[test]
    fn test_false_while_skips_body_entirely() {
        let body = "\
[FGT1]
<intset i 5>
<while $i < 3>
<intchange i + 100>
<endwhile>
";
        let (vars, _, _) = run_simple(body);
        assert_eq!(vars.get("i"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_expect_failure_records_and_continues() {
        let body = "\
[FGT1]
expect -e NEVER_PRINTED -for 1001 -t 1
<strset done yes>
";
        let (vars, _, rep) = run_simple(body);
        assert_eq!(rep.passed("1001"), Some(false));
        assert_eq!(vars.get("done"), Some(&Value::Str("yes".into())));
    }

    #[test]
    fn test_unattributed_expect_records_nothing() {
        let (_, _, rep) = run_simple("[FGT1]\nexpect -e X -t 1\n");
        assert!(rep.records.is_empty());
    }

    #[test]
    fn test_interpolation_reaches_commands() {
        let mut dev = ScriptedDevice::new("FGT1");
        dev.respond_to("probe 10.0.0.7", "alive");
        let body = "\
[FGT1]
<strset host 10.0.0.7>
probe {$host}
expect -e alive -for 1002 -t 5
";
        let (_, _, rep) = run_with_device(body, dev);
        assert_eq!(rep.passed("1002"), Some(true));
    }

    #[test]
    fn test_unknown_device_section_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "case.nsp", "[FGT9]\nget system status\n");
        let c = compiler();
        let mut devices = DeviceTable::new();
        devices.insert(Box::new(ScriptedDevice::new("FGT1")));
        let mut rep = MemoryReporter::new();
        let err = run_file(
            &c,
            &path,
            &mut devices,
            &mut rep,
            None,
            RunPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn test_include_shares_variables() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "sub.nsp", "<strset from_sub yes>\n");
        let path = write_script(
            dir.path(),
            "main.nsp",
            "[FGT1]\ninclude sub.nsp\n<strset after {$from_sub}>\n",
        );
        let c = compiler();
        let mut devices = DeviceTable::new();
        devices.insert(Box::new(ScriptedDevice::new("FGT1")));
        let mut vars = VarTable::new();
        let mut flow = FlowStack::new();
        let mut rep = MemoryReporter::new();
        let mut ctx = RunContext {
            devices: &mut devices,
            vars: &mut vars,
            flow: &mut flow,
            env: None,
            reporter: &mut rep,
            current_device: "FGT1".into(),
            log: String::new(),
        };
        Executor::new(&c, &path, RunPolicy::default())
            .unwrap()
            .run(&mut ctx)
            .unwrap();
        assert_eq!(vars.get("from_sub"), Some(&Value::Str("yes".into())));
        assert_eq!(vars.get("after"), Some(&Value::Str("yes".into())));
    }

    #[test]
    fn test_runtime_include_cycle_is_bounded() {
        // A self-include through a variable path is invisible to the
        // compile-time cycle guard; the run must stop, not overflow.
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "again.nsp",
            "[FGT1]\n<strset next again>\ninclude {$next}.nsp\n",
        );
        let c = compiler();
        let mut devices = DeviceTable::new();
        devices.insert(Box::new(ScriptedDevice::new("FGT1")));
        let mut rep = MemoryReporter::new();
        let err = run_file(
            &c,
            &path,
            &mut devices,
            &mut rep,
            None,
            RunPolicy::default(),
        )
        .unwrap_err();
        assert!(err.message.contains("include nesting"), "{}", err);
    }

    // Counts force_login calls so tests can see through the boxed table.
    struct LoginProbe {
        name: String,
        logins: std::sync::Arc<std::sync::atomic::AtomicU32>,
    }

    impl Device for LoginProbe {
        fn name(&self) -> &str {
            &self.name
        }
        fn send(&mut self, _text: &str) -> Result<(), ScriptError> {
            Ok(())
        }
        fn send_line(&mut self, text: &str) -> Result<(), ScriptError> {
            self.send(text)
        }
        fn expect(
            &mut self,
            _pattern: &str,
            _timeout_s: u64,
            _clear: bool,
        ) -> Result<ExpectOutcome, ScriptError> {
            Ok(ExpectOutcome {
                matched: true,
                output: "FGT1 login:".into(),
            })
        }
        fn search(
            &mut self,
            pattern: &str,
            timeout_s: u64,
            _start: usize,
        ) -> Result<ExpectOutcome, ScriptError> {
            self.expect(pattern, timeout_s, false)
        }
        fn clear_buffer(&mut self) {}
        fn switch(&mut self) -> Result<(), ScriptError> {
            Ok(())
        }
        fn force_login(&mut self) -> Result<(), ScriptError> {
            self.logins.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_factory_reset_relogs_in() {
        let logins = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let dev = LoginProbe {
            name: "FGT1".into(),
            logins: std::sync::Arc::clone(&logins),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "case.nsp", "[FGT1]\nexe factoryreset\n");
        let c = compiler();
        let mut devices = DeviceTable::new();
        devices.insert(Box::new(dev));
        let mut rep = MemoryReporter::new();
        run_file(
            &c,
            &path,
            &mut devices,
            &mut rep,
            None,
            RunPolicy::default(),
        )
        .unwrap();
        assert_eq!(logins.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_report_finalizes_qaid() {
        let (_, _, rep) = run_simple("[FGT1]\nreport 1001\n");
        assert_eq!(rep.reported, vec!["1001".to_string()]);
    }

    // A device that only starts matching after a number of expect calls.
    struct FlakyDevice {
        name: String,
        expects: u32,
        succeed_on: u32,
    }

    impl Device for FlakyDevice {
        fn name(&self) -> &str {
            &self.name
        }
        fn send(&mut self, _text: &str) -> Result<(), ScriptError> {
            Ok(())
        }
        fn send_line(&mut self, text: &str) -> Result<(), ScriptError> {
            self.send(text)
        }
        fn expect(
            &mut self,
            _pattern: &str,
            _timeout_s: u64,
            _clear: bool,
        ) -> Result<ExpectOutcome, ScriptError> {
            self.expects += 1;
            Ok(ExpectOutcome {
                matched: self.expects >= self.succeed_on,
                output: String::new(),
            })
        }
        fn search(
            &mut self,
            pattern: &str,
            timeout_s: u64,
            _start: usize,
        ) -> Result<ExpectOutcome, ScriptError> {
            self.expect(pattern, timeout_s, false)
        }
        fn clear_buffer(&mut self) {}
        fn switch(&mut self) -> Result<(), ScriptError> {
            Ok(())
        }
        fn force_login(&mut self) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    fn run_flaky(body: &str, succeed_on: u32) -> MemoryReporter {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "case.nsp", body);
        let c = compiler();
        let mut devices = DeviceTable::new();
        devices.insert(Box::new(FlakyDevice {
            name: "FGT1".into(),
            expects: 0,
            succeed_on,
        }));
        let mut rep = MemoryReporter::new();
        run_file(
            &c,
            &path,
            &mut devices,
            &mut rep,
            None,
            RunPolicy::default(),
        )
        .unwrap();
        rep
    }

    #[test]
    fn test_lagging_log_command_is_retried() {
        let body = "[FGT1]\nget log traffic\nexpect -e done -for 1001 -t 1\n";
        let rep = run_flaky(body, 2);
        assert_eq!(rep.passed("1001"), Some(true));
    }

    #[test]
    fn test_retry_is_bounded() {
        let body = "[FGT1]\nget log traffic\nexpect -e done -for 1001 -t 1\n";
        let rep = run_flaky(body, 5);
        assert_eq!(rep.passed("1001"), Some(false));
    }

    #[test]
    fn test_retry_needs_the_command_directly_before() {
        // An unrelated instruction between the transfer and its expect
        // forfeits the retry.
        let body = "\
[FGT1]
get log traffic
<intset pad 1>
expect -e done -for 1001 -t 1
";
        let rep = run_flaky(body, 2);
        assert_eq!(rep.passed("1001"), Some(false));
    }

    #[test]
    fn test_non_transfer_commands_never_retry() {
        let body = "[FGT1]\nshow system interface\nexpect -e done -for 1001 -t 1\n";
        let rep = run_flaky(body, 2);
        assert_eq!(rep.passed("1001"), Some(false));
    }

    #[test]
    fn test_api_dispatch_from_script() {
        let body = "\
[FGT1]
<strset left alpha>
<strset right alpha>
bufcmp -a left -b right -for 3001
";
        let (_, _, rep) = run_simple(body);
        assert_eq!(rep.passed("3001"), Some(true));
    }
}
