//! API dispatch registry
//!
//! A name → handler table built eagerly at startup from the capability
//! modules under `apis/`. The parser resolves an operation name to an
//! `ApiHandle` exactly once; dispatch afterwards is by handle, never by
//! name. Registered names ending in `_` (reserved-word collisions in the
//! contributing module) have the marker stripped.

use std::collections::{BTreeMap, HashMap};

use crate::device::Device;
use crate::error::{ErrorKind, ScriptError};
use crate::report::Reporter;
use crate::syntax::ApiSchema;
use crate::vars::VarTable;

/// Opaque index of a registered operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiHandle(pub(crate) usize);

/// What an operation sees while it runs
pub struct ApiContext<'a> {
    pub device: &'a mut dyn Device,
    pub vars: &'a mut VarTable,
    pub reporter: &'a mut dyn Reporter,
    /// Source line of the dispatching instruction
    pub line: Option<usize>,
}

impl ApiContext<'_> {
    /// Record an assertion outcome. QAID "0" means unattributed — nothing
    /// is recorded for it.
    pub fn record(&mut self, qaid: &str, passed: bool, output: &str) {
        if qaid != "0" {
            self.reporter.add_expect_result(qaid, passed, self.line, output);
        }
    }
}

/// Usage information for an operation
pub struct ApiUsage {
    /// One-line summary
    pub summary: String,
    /// Category for `list_by_category`
    pub category: &'static str,
    /// Parameter schema, fed to the Syntax Registry on refresh
    pub schema: ApiSchema,
}

/// One externally dispatchable operation
pub trait ApiOp: Send + Sync {
    fn call(&self, ctx: &mut ApiContext<'_>, params: &[String]) -> Result<(), ScriptError>;
    fn usage(&self) -> ApiUsage;
}

/// The registry
pub struct ApiRegistry {
    ops: Vec<Box<dyn ApiOp>>,
    by_name: HashMap<String, usize>,
}

impl ApiRegistry {
    pub fn empty() -> Self {
        Self {
            ops: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Build the registry from every built-in capability module.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        crate::apis::register_all(&mut reg);
        reg
    }

    /// Register an operation. A trailing `_` marker is stripped.
    pub fn register(&mut self, name: &str, op: Box<dyn ApiOp>) {
        let name = name.strip_suffix('_').unwrap_or(name);
        let idx = self.ops.len();
        self.ops.push(op);
        self.by_name.insert(name.to_string(), idx);
    }

    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Resolve a name to its handle, once, at parse time.
    pub fn resolve(&self, name: &str) -> Option<ApiHandle> {
        self.by_name.get(name).copied().map(ApiHandle)
    }

    /// Dispatch by handle. An unknown handle is a fatal lookup error.
    pub fn call(
        &self,
        handle: ApiHandle,
        ctx: &mut ApiContext<'_>,
        params: &[String],
    ) -> Result<(), ScriptError> {
        let op = self.ops.get(handle.0).ok_or_else(|| {
            ScriptError::new(
                ErrorKind::UnknownApi,
                format!("no operation registered for handle {}", handle.0),
            )
        })?;
        op.call(ctx, params)
    }

    /// Operation names and summaries grouped by category, sorted both ways.
    pub fn list_by_category(&self) -> BTreeMap<&'static str, Vec<(String, String)>> {
        let mut out: BTreeMap<&'static str, Vec<(String, String)>> = BTreeMap::new();
        for (name, idx) in &self.by_name {
            let usage = self.ops[*idx].usage();
            out.entry(usage.category)
                .or_default()
                .push((name.clone(), usage.summary));
        }
        for names in out.values_mut() {
            names.sort();
        }
        out
    }

    /// Parameter schemas of every registered operation, for the Syntax
    /// Registry's refresh.
    pub fn schemas(&self) -> Vec<ApiSchema> {
        self.by_name
            .iter()
            .map(|(name, idx)| {
                let mut schema = self.ops[*idx].usage().schema;
                schema.name = name.clone();
                schema
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_populated() {
        let reg = ApiRegistry::builtin();
        assert!(reg.has("ping"));
        assert!(reg.has("bufcmp"));
        assert!(!reg.has("nothing"));
    }

    #[test]
    fn test_reserved_word_marker_stripped() {
        // text module registers "match_" to dodge the keyword
        let reg = ApiRegistry::builtin();
        assert!(reg.has("match"));
        assert!(!reg.has("match_"));
    }

    #[test]
    fn test_resolve_then_dispatch() {
        let reg = ApiRegistry::builtin();
        let h = reg.resolve("ping").unwrap();
        assert_eq!(reg.resolve("ping"), Some(h));
        assert_eq!(reg.resolve("nothing"), None);
    }

    #[test]
    fn test_unknown_handle_is_fatal() {
        let reg = ApiRegistry::empty();
        let mut dev = crate::device::ScriptedDevice::new("D");
        let mut vars = VarTable::new();
        let mut rep = crate::report::MemoryReporter::new();
        let mut ctx = ApiContext {
            device: &mut dev,
            vars: &mut vars,
            reporter: &mut rep,
            line: None,
        };
        let err = reg.call(ApiHandle(7), &mut ctx, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownApi);
    }

    #[test]
    fn test_categories_listed() {
        let reg = ApiRegistry::builtin();
        let cats = reg.list_by_category();
        assert!(cats.contains_key("net"));
        assert!(cats.values().all(|names| !names.is_empty()));
    }
}
