//! Device collaborator
//!
//! The VM treats a device session as an opaque blocking collaborator: send
//! text, search buffered output for a pattern within a timeout. Transport,
//! login state machines and anti-hang heuristics live behind this trait.
//!
//! Patterns may carry inline regex flags (`(?i)`, `(?m)`, `(?s)`);
//! translating those to the host engine is the implementor's job, not the
//! core's. `ScriptedDevice` gets that for free from the `regex` crate.

use std::collections::BTreeMap;

use crate::error::ScriptError;

/// What a pattern search produced
#[derive(Debug, Clone)]
pub struct ExpectOutcome {
    pub matched: bool,
    /// The output window the search looked at
    pub output: String,
}

/// An interactive device session
pub trait Device: Send {
    fn name(&self) -> &str;
    fn send(&mut self, text: &str) -> Result<(), ScriptError>;
    fn send_line(&mut self, text: &str) -> Result<(), ScriptError>;
    /// Search buffered output for `pattern` within `timeout_s` seconds,
    /// optionally clearing the buffer first.
    fn expect(
        &mut self,
        pattern: &str,
        timeout_s: u64,
        clear_buffer: bool,
    ) -> Result<ExpectOutcome, ScriptError>;
    /// Like `expect`, starting at byte offset `start` into the buffer.
    fn search(
        &mut self,
        pattern: &str,
        timeout_s: u64,
        start: usize,
    ) -> Result<ExpectOutcome, ScriptError>;
    fn clear_buffer(&mut self);
    /// Switch console (e.g. to a secondary unit in an HA pair).
    fn switch(&mut self) -> Result<(), ScriptError>;
    /// Re-establish a logged-in session after a reboot-class command.
    fn force_login(&mut self) -> Result<(), ScriptError>;
}

/// The per-run device set, keyed by section name. Shared by a whole
/// script-execution tree; `[DEVICE]` instructions pick the current entry.
#[derive(Default)]
pub struct DeviceTable {
    map: BTreeMap<String, Box<dyn Device>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: Box<dyn Device>) {
        self.map.insert(device.name().to_string(), device);
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn Device>> {
        self.map.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn first_name(&self) -> Option<String> {
        self.map.keys().next().cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }
}

/// An in-memory device that replays a canned transcript. Used by the CLI
/// dry-run mode and throughout the test suite: sent commands are recorded,
/// configured responses are appended to the output buffer, and `expect`
/// searches the buffer immediately instead of waiting on a wire.
pub struct ScriptedDevice {
    name: String,
    buffer: String,
    /// Every line the script sent, in order
    pub sent: Vec<String>,
    /// command-prefix → output appended when such a command is sent
    responses: Vec<(String, String)>,
    login_count: u32,
}

impl ScriptedDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: String::new(),
            sent: Vec::new(),
            responses: Vec::new(),
            login_count: 0,
        }
    }

    /// Preload output, as if the device had already printed it.
    pub fn push_output(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// When a sent command starts with `prefix`, append `output`.
    pub fn respond_to(&mut self, prefix: impl Into<String>, output: impl Into<String>) {
        self.responses.push((prefix.into(), output.into()));
    }

    pub fn times_logged_in(&self) -> u32 {
        self.login_count
    }

    fn find(&self, pattern: &str, start: usize) -> Result<ExpectOutcome, ScriptError> {
        let re = regex::RegexBuilder::new(pattern)
            .size_limit(1 << 20)
            .build()
            .map_err(|e| ScriptError::device(format!("bad pattern '{}': {}", pattern, e)))?;
        let window = &self.buffer[start.min(self.buffer.len())..];
        Ok(ExpectOutcome {
            matched: re.is_match(window),
            output: window.to_string(),
        })
    }
}

impl Device for ScriptedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, text: &str) -> Result<(), ScriptError> {
        self.sent.push(text.to_string());
        let hits: Vec<String> = self
            .responses
            .iter()
            .filter(|(prefix, _)| text.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .collect();
        for output in hits {
            self.buffer.push_str(&output);
        }
        Ok(())
    }

    fn send_line(&mut self, text: &str) -> Result<(), ScriptError> {
        self.send(text)
    }

    fn expect(
        &mut self,
        pattern: &str,
        _timeout_s: u64,
        clear_buffer: bool,
    ) -> Result<ExpectOutcome, ScriptError> {
        let outcome = self.find(pattern, 0)?;
        if clear_buffer && outcome.matched {
            self.buffer.clear();
        }
        Ok(outcome)
    }

    fn search(
        &mut self,
        pattern: &str,
        _timeout_s: u64,
        start: usize,
    ) -> Result<ExpectOutcome, ScriptError> {
        self.find(pattern, start)
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    fn switch(&mut self) -> Result<(), ScriptError> {
        Ok(())
    }

    fn force_login(&mut self) -> Result<(), ScriptError> {
        self.login_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_expect() {
        let mut dev = ScriptedDevice::new("FGT1");
        dev.push_output("FortiGate-100F login: ");
        let out = dev.expect("login:", 5, false).unwrap();
        assert!(out.matched);
        let out = dev.expect("Password:", 5, false).unwrap();
        assert!(!out.matched);
    }

    #[test]
    fn test_inline_flags_supported() {
        let mut dev = ScriptedDevice::new("FGT1");
        dev.push_output("SYSTEM READY\n");
        assert!(dev.expect("(?i)system ready", 1, false).unwrap().matched);
    }

    #[test]
    fn test_respond_to_appends() {
        let mut dev = ScriptedDevice::new("FGT1");
        dev.respond_to("get system status", "Version: v7.4.1\n");
        dev.send_line("get system status").unwrap();
        assert!(dev.expect("v7.4.1", 1, false).unwrap().matched);
    }

    #[test]
    fn test_clear_on_match() {
        let mut dev = ScriptedDevice::new("FGT1");
        dev.push_output("login: ");
        dev.expect("login:", 1, true).unwrap();
        assert!(!dev.expect("login:", 1, false).unwrap().matched);
    }

    #[test]
    fn test_search_with_offset() {
        let mut dev = ScriptedDevice::new("FGT1");
        dev.push_output("error ok");
        assert!(dev.search("error", 1, 0).unwrap().matched);
        assert!(!dev.search("error", 1, 5).unwrap().matched);
    }

    #[test]
    fn test_table_order_and_lookup() {
        let mut table = DeviceTable::new();
        table.insert(Box::new(ScriptedDevice::new("B")));
        table.insert(Box::new(ScriptedDevice::new("A")));
        assert_eq!(table.first_name().as_deref(), Some("A"));
        assert!(table.contains("B"));
    }
}
