//! Result/report collaborator
//!
//! Assertion outcomes correlate to a QAID (test-case id). The VM records
//! every `expect` result here and `report` marks the id as finalized;
//! rendering and submission happen outside the core.

/// Pass/fail bookkeeping for assertion results
pub trait Reporter: Send {
    /// Record one expect-style assertion outcome.
    fn add_expect_result(&mut self, qaid: &str, passed: bool, line: Option<usize>, output: &str);
    /// Finalize a test-case id.
    fn report(&mut self, qaid: &str);
}

/// One recorded assertion
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectRecord {
    pub qaid: String,
    pub passed: bool,
    pub line: Option<usize>,
    pub output: String,
}

/// Collects results in memory; what the tests and the CLI dry-run use.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    pub records: Vec<ExpectRecord>,
    pub reported: Vec<String>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final verdict for a qaid: every recorded assertion passed.
    pub fn passed(&self, qaid: &str) -> Option<bool> {
        let mut saw = false;
        let mut ok = true;
        for r in &self.records {
            if r.qaid == qaid {
                saw = true;
                ok &= r.passed;
            }
        }
        saw.then_some(ok)
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| !r.passed).count()
    }
}

impl Reporter for MemoryReporter {
    fn add_expect_result(&mut self, qaid: &str, passed: bool, line: Option<usize>, output: &str) {
        self.records.push(ExpectRecord {
            qaid: qaid.to_string(),
            passed,
            line,
            output: output.to_string(),
        });
    }

    fn report(&mut self, qaid: &str) {
        self.reported.push(qaid.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_aggregates() {
        let mut rep = MemoryReporter::new();
        rep.add_expect_result("1001", true, Some(3), "");
        rep.add_expect_result("1001", false, Some(9), "boom");
        rep.add_expect_result("1002", true, None, "");
        assert_eq!(rep.passed("1001"), Some(false));
        assert_eq!(rep.passed("1002"), Some(true));
        assert_eq!(rep.passed("1003"), None);
        assert_eq!(rep.failed_count(), 1);
    }
}
