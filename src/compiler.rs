//! Compiler orchestrator
//!
//! Owns the script cache. `compile` is idempotent per path: the first call
//! parses the file and its include graph, later calls hit the cache. A
//! read-probe on the cache is the fast path; actual compilation is
//! serialized behind a separate mutex so concurrent first-compiles of the
//! same path do the work once. `retrieve` hands out deep copies, never
//! shared instruction vectors, so executors can patch their copy freely.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::api::ApiRegistry;
use crate::env::Environment;
use crate::error::{ErrorKind, ScriptError};
use crate::instr::Instruction;
use crate::parser::Parser;
use crate::syntax::SyntaxRegistry;
use crate::vars::{self, VarTable};

/// The cached result of compiling one script file
#[derive(Debug)]
pub struct CompiledScript {
    pub instructions: Vec<Instruction>,
    /// Device section names the script mentions
    pub devices: BTreeSet<String>,
    /// Include path expressions, as written in the source
    pub includes: Vec<String>,
}

pub struct Compiler {
    registry: SyntaxRegistry,
    apis: Arc<ApiRegistry>,
    cache: RwLock<HashMap<PathBuf, Arc<CompiledScript>>>,
    compile_lock: Mutex<()>,
    devices: Mutex<BTreeSet<String>>,
    env: Option<Arc<dyn Environment>>,
}

impl Compiler {
    /// Build a compiler around a grammar and an operation registry. The
    /// registry's operation names are folded into the grammar up front so
    /// the parser recognizes them as statements.
    pub fn new(mut registry: SyntaxRegistry, apis: Arc<ApiRegistry>) -> Result<Self, ScriptError> {
        registry.refresh(apis.schemas())?;
        Ok(Self {
            registry,
            apis,
            cache: RwLock::new(HashMap::new()),
            compile_lock: Mutex::new(()),
            devices: Mutex::new(BTreeSet::new()),
            env: None,
        })
    }

    /// Attach an environment; include paths are interpolated against it.
    pub fn with_env(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn apis(&self) -> &ApiRegistry {
        &self.apis
    }

    /// Device names seen across every script compiled so far.
    pub fn devices(&self) -> BTreeSet<String> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Compile `path` and its reachable includes, or return the cached
    /// result.
    pub fn compile(&self, path: &Path) -> Result<Arc<CompiledScript>, ScriptError> {
        let key = normalize(path);
        if let Some(script) = self.cache_get(&key) {
            return Ok(script);
        }

        let _guard = self
            .compile_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // Another thread may have compiled it while we waited.
        if let Some(script) = self.cache_get(&key) {
            return Ok(script);
        }
        let mut chain = Vec::new();
        self.compile_locked(&key, &mut chain)
    }

    /// A fresh, independent copy of a script's instruction sequence,
    /// compiling on a cache miss.
    pub fn retrieve(&self, path: &Path) -> Result<Vec<Instruction>, ScriptError> {
        Ok(self.compile(path)?.instructions.clone())
    }

    fn cache_get(&self, key: &Path) -> Option<Arc<CompiledScript>> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Compile one file while holding the compile lock. `chain` is the
    /// include path from the root of this compilation, used to refuse
    /// cyclic include graphs.
    fn compile_locked(
        &self,
        key: &PathBuf,
        chain: &mut Vec<PathBuf>,
    ) -> Result<Arc<CompiledScript>, ScriptError> {
        if chain.contains(key) {
            let mut cycle: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
            cycle.push(key.display().to_string());
            return Err(ScriptError::new(
                ErrorKind::Syntax,
                format!("include cycle: {}", cycle.join(" -> ")),
            ));
        }
        if let Some(script) = self.cache_get(key) {
            return Ok(script);
        }

        debug!(file = %key.display(), "compiling");
        let source = std::fs::read_to_string(key).map_err(|e| {
            ScriptError::new(
                ErrorKind::Io,
                format!("cannot read script {}: {}", key.display(), e),
            )
        })?;
        let output = Parser::new(&self.registry, &self.apis, key.display().to_string())
            .parse(&source)?;

        {
            let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            devices.extend(output.devices.iter().cloned());
        }

        // Pre-compile includes whose paths resolve at compile time. A path
        // still holding a `{$var}` reference is deferred to run time.
        chain.push(key.clone());
        for include in &output.includes {
            let resolved = self.resolve_include(key, include);
            if resolved.to_string_lossy().contains("{$") {
                debug!(%include, "include deferred to run time");
                continue;
            }
            self.compile_locked(&normalize(&resolved), chain)?;
        }
        chain.pop();

        let script = Arc::new(CompiledScript {
            instructions: output.instructions,
            devices: output.devices,
            includes: output.includes,
        });
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), Arc::clone(&script));
        Ok(script)
    }

    /// Interpolate an include expression and resolve it relative to the
    /// including file's directory.
    pub fn resolve_include(&self, from: &Path, include: &str) -> PathBuf {
        let vars = VarTable::new();
        let text = vars::interpolate(include, self.env.as_deref(), &vars, None);
        let candidate = PathBuf::from(text);
        if candidate.is_absolute() {
            candidate
        } else {
            from.parent().unwrap_or_else(|| Path::new(".")).join(candidate)
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::thread;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    fn compiler() -> Compiler {
        Compiler::new(
            SyntaxRegistry::default_grammar().unwrap(),
            Arc::new(ApiRegistry::builtin()),
        )
        .unwrap()
    }

    #[test]
    fn test_second_compile_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "a.nsp", "[FGT1]\nget system status\n");
        let c = compiler();
        let first = c.compile(&path).unwrap();
        let second = c.compile(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_retrieve_copies_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "a.nsp", "[FGT1]\nget system status\n");
        let c = compiler();
        let mut one = c.retrieve(&path).unwrap();
        let two = c.retrieve(&path).unwrap();
        assert_eq!(one, two);
        one[0].patch(99);
        assert_ne!(one, two);
        assert_eq!(c.retrieve(&path).unwrap(), two);
    }

    #[test]
    fn test_includes_precompiled() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "sub.nsp", "[FGT1]\ndiag sys top\n");
        let path = write_script(dir.path(), "main.nsp", "[FGT1]\ninclude sub.nsp\n");
        let c = compiler();
        let script = c.compile(&path).unwrap();
        assert_eq!(script.includes, vec!["sub.nsp".to_string()]);
        // The include is already cached; retrieving it reads no file twice.
        let sub = c.resolve_include(&path, "sub.nsp");
        assert!(!c.retrieve(&sub).unwrap().is_empty());
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "a.nsp", "include b.nsp\n");
        let path_a = dir.path().join("a.nsp");
        write_script(dir.path(), "b.nsp", "include a.nsp\n");
        let c = compiler();
        let err = c.compile(&path_a).unwrap_err();
        assert!(err.to_string().contains("include cycle"));
    }

    #[test]
    fn test_variable_include_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "main.nsp", "[FGT1]\ninclude {$case}.nsp\n");
        let c = compiler();
        // Must compile even though the include target cannot exist yet.
        let script = c.compile(&path).unwrap();
        assert_eq!(script.includes, vec!["{$case}.nsp".to_string()]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let c = compiler();
        let err = c.compile(Path::new("/no/such/script.nsp")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }

    #[test]
    fn test_concurrent_compiles_share_one_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "a.nsp", "[FGT1]\nget system status\n");
        let c = Arc::new(compiler());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&c);
                let path = path.clone();
                thread::spawn(move || c.compile(&path).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for pair in results.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn test_devices_accumulate_across_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_script(dir.path(), "a.nsp", "[FGT1]\nget system status\n");
        let b = write_script(dir.path(), "b.nsp", "[PC05]\nls\n");
        let c = compiler();
        c.compile(&a).unwrap();
        c.compile(&b).unwrap();
        let devices = c.devices();
        assert!(devices.contains("FGT1"));
        assert!(devices.contains("PC05"));
    }
}
