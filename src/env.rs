//! Environment/config collaborator
//!
//! Resolves `SECTION:KEY` cross-references and serves per-device config
//! maps. The real framework backs this with its configuration files; the
//! in-crate `MapEnvironment` is enough for tests and dry runs.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Configuration and shared-variable access
pub trait Environment: Send + Sync {
    fn get_var(&self, name: &str) -> Option<String>;
    fn add_var(&mut self, name: &str, value: &str);
    /// Resolve `SECTION:KEY` tokens in `text`; unknown references stay as-is.
    fn interpolate(&self, text: &str) -> String;
    /// Key/value config for one device section.
    fn device_config(&self, name: &str) -> Option<&HashMap<String, String>>;
}

fn section_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][A-Z0-9_]*):([A-Za-z0-9_]+)\b").expect("static pattern")
    })
}

/// A map-backed environment
#[derive(Debug, Default)]
pub struct MapEnvironment {
    sections: HashMap<String, HashMap<String, String>>,
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_section_value(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(key.into(), value.into());
    }
}

impl Environment for MapEnvironment {
    fn get_var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn add_var(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    fn interpolate(&self, text: &str) -> String {
        section_key_re()
            .replace_all(text, |caps: &regex::Captures<'_>| {
                match self.sections.get(&caps[1]).and_then(|s| s.get(&caps[2])) {
                    Some(v) => v.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn device_config(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.sections.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_key_resolution() {
        let mut env = MapEnvironment::new();
        env.set_section_value("FGT1", "MGMT_IP", "10.0.0.1");
        assert_eq!(env.interpolate("ping FGT1:MGMT_IP"), "ping 10.0.0.1");
    }

    #[test]
    fn test_unknown_reference_untouched() {
        let env = MapEnvironment::new();
        assert_eq!(env.interpolate("ping FGT1:MGMT_IP"), "ping FGT1:MGMT_IP");
    }

    #[test]
    fn test_vars_roundtrip() {
        let mut env = MapEnvironment::new();
        env.add_var("build", "2718");
        assert_eq!(env.get_var("build").as_deref(), Some("2718"));
        assert_eq!(env.get_var("missing"), None);
    }
}
