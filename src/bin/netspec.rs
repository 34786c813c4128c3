//! netspec CLI
//!
//! Compile, inspect and dry-run appliance test scripts.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use netspec::{
    run_file, ApiRegistry, Compiler, DeviceTable, MemoryReporter, RunPolicy, ScriptedDevice,
    SyntaxRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "netspec")]
#[command(version)]
#[command(about = "Compile and run appliance test scripts")]
struct Cli {
    /// Grammar description to use instead of the built-in one
    #[arg(long, global = true)]
    grammar: Option<PathBuf>,

    /// Verbose output: show compiler and VM tracing
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile scripts and report syntax errors
    Check {
        /// Script files to compile
        files: Vec<PathBuf>,
    },
    /// Print the instruction listing of a compiled script
    Dump { file: PathBuf },
    /// Dry-run a script against scripted (in-memory) device sessions
    Run { file: PathBuf },
    /// List registered API operations by category
    ListApis,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let registry = match &cli.grammar {
        Some(path) => SyntaxRegistry::from_file(path),
        None => SyntaxRegistry::default_grammar(),
    };
    let registry = match registry {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let apis = Arc::new(ApiRegistry::builtin());

    match cli.command {
        Command::Check { files } => check(registry, apis, &files),
        Command::Dump { file } => dump(registry, apis, &file),
        Command::Run { file } => run(registry, apis, &file, cli.verbose),
        Command::ListApis => {
            list_apis(&apis);
            ExitCode::SUCCESS
        }
    }
}

fn build_compiler(registry: SyntaxRegistry, apis: Arc<ApiRegistry>) -> Option<Compiler> {
    match Compiler::new(registry, apis) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("error: {}", e);
            None
        }
    }
}

fn check(registry: SyntaxRegistry, apis: Arc<ApiRegistry>, files: &[PathBuf]) -> ExitCode {
    let Some(compiler) = build_compiler(registry, apis) else {
        return ExitCode::FAILURE;
    };

    let mut failed = 0usize;
    for file in files {
        match compiler.compile(file) {
            Ok(script) => {
                println!(
                    "OK    {} ({} instructions, devices: {})",
                    file.display(),
                    script.instructions.len(),
                    script.devices.iter().cloned().collect::<Vec<_>>().join(", "),
                );
            }
            Err(e) => {
                failed += 1;
                println!("FAIL  {}", file.display());
                println!("      {}", e);
            }
        }
    }
    println!();
    println!("{} file(s), {} failed", files.len(), failed);
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn dump(registry: SyntaxRegistry, apis: Arc<ApiRegistry>, file: &PathBuf) -> ExitCode {
    let Some(compiler) = build_compiler(registry, apis) else {
        return ExitCode::FAILURE;
    };
    match compiler.compile(file) {
        Ok(script) => {
            for instr in &script.instructions {
                println!("{}", instr);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(registry: SyntaxRegistry, apis: Arc<ApiRegistry>, file: &PathBuf, verbose: bool) -> ExitCode {
    let Some(compiler) = build_compiler(registry, apis) else {
        return ExitCode::FAILURE;
    };

    // Compile first so the full device set (includes too) is known, then
    // attach one scripted session per section the scripts mention.
    if let Err(e) = compiler.compile(file) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    let mut devices = DeviceTable::new();
    for name in compiler.devices() {
        devices.insert(Box::new(ScriptedDevice::new(name)));
    }
    if devices.first_name().is_none() {
        devices.insert(Box::new(ScriptedDevice::new("DEFAULT")));
    }

    let mut reporter = MemoryReporter::new();
    let policy = RunPolicy {
        skip_sleeps: true,
        ..RunPolicy::default()
    };
    let transcript = match run_file(&compiler, file, &mut devices, &mut reporter, None, policy) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if verbose || reporter.failed_count() > 0 {
        for line in transcript.lines() {
            println!("      {}", line);
        }
    }

    // Per-QAID verdicts, worst result wins.
    let mut verdicts: BTreeMap<String, bool> = BTreeMap::new();
    for record in &reporter.records {
        let v = verdicts.entry(record.qaid.clone()).or_insert(true);
        *v &= record.passed;
    }
    for (qaid, passed) in &verdicts {
        println!("{}  {}", if *passed { "PASS " } else { "FAIL " }, qaid);
    }
    println!();
    println!(
        "{} assertion(s), {} failed",
        reporter.records.len(),
        reporter.failed_count()
    );
    if reporter.failed_count() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn list_apis(apis: &ApiRegistry) {
    println!("Registered operations:");
    println!();
    for (category, entries) in apis.list_by_category() {
        println!("  [{}]", category);
        for (name, summary) in entries {
            println!("    {:<12} {}", name, summary);
        }
    }
}
