//! Serializable record of everything a unit reported inside the child

use crate::errors::Result;
use crate::isolation::collector::ResultCollector;
use serde::{Deserialize, Serialize};

/// One collector call made inside the child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeEntry {
    Start { id: String },
    Stop { id: String },
    Success { id: String },
    Failure { id: String, reason: String, trace: String },
    Error { id: String, reason: String, trace: String },
    Skip { id: String, reason: String },
    ExpectedFailure { id: String, trace: String },
    UnexpectedSuccess { id: String },
}

/// Ordered log of collector calls, produced by the child and replayed by the parent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Process ID of the process that ran the unit
    pub child_pid: u32,
    pub entries: Vec<OutcomeEntry>,
}

impl OutcomeRecord {
    pub fn new(child_pid: u32) -> Self {
        Self {
            child_pid,
            entries: Vec::new(),
        }
    }

    /// Stand-in record for a child that died before reporting
    pub fn abnormal(unit: &str, child_pid: u32, reason: &str) -> Self {
        let mut record = Self::new(child_pid);
        record.start_test(unit);
        record.add_error(
            unit,
            "isolated process terminated abnormally",
            &format!("child process {} {}", child_pid, reason),
        );
        record.stop_test(unit);
        record
    }

    /// Number of checks the child started
    pub fn tests_run(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, OutcomeEntry::Start { .. }))
            .count()
    }

    /// Re-issue every recorded call, in order, against `result`
    pub fn replay(&self, result: &mut dyn ResultCollector) {
        for entry in &self.entries {
            match entry {
                OutcomeEntry::Start { id } => result.start_test(id),
                OutcomeEntry::Stop { id } => result.stop_test(id),
                OutcomeEntry::Success { id } => result.add_success(id),
                OutcomeEntry::Failure { id, reason, trace } => result.add_failure(id, reason, trace),
                OutcomeEntry::Error { id, reason, trace } => result.add_error(id, reason, trace),
                OutcomeEntry::Skip { id, reason } => result.add_skip(id, reason),
                OutcomeEntry::ExpectedFailure { id, trace } => {
                    result.add_expected_failure(id, trace)
                }
                OutcomeEntry::UnexpectedSuccess { id } => result.add_unexpected_success(id),
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl ResultCollector for OutcomeRecord {
    fn start_test(&mut self, id: &str) {
        self.entries.push(OutcomeEntry::Start { id: id.to_string() });
    }

    fn stop_test(&mut self, id: &str) {
        self.entries.push(OutcomeEntry::Stop { id: id.to_string() });
    }

    fn add_success(&mut self, id: &str) {
        self.entries.push(OutcomeEntry::Success { id: id.to_string() });
    }

    fn add_failure(&mut self, id: &str, reason: &str, trace: &str) {
        self.entries.push(OutcomeEntry::Failure {
            id: id.to_string(),
            reason: reason.to_string(),
            trace: trace.to_string(),
        });
    }

    fn add_error(&mut self, id: &str, reason: &str, trace: &str) {
        self.entries.push(OutcomeEntry::Error {
            id: id.to_string(),
            reason: reason.to_string(),
            trace: trace.to_string(),
        });
    }

    fn add_skip(&mut self, id: &str, reason: &str) {
        self.entries.push(OutcomeEntry::Skip {
            id: id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn add_expected_failure(&mut self, id: &str, trace: &str) {
        self.entries.push(OutcomeEntry::ExpectedFailure {
            id: id.to_string(),
            trace: trace.to_string(),
        });
    }

    fn add_unexpected_success(&mut self, id: &str) {
        self.entries
            .push(OutcomeEntry::UnexpectedSuccess { id: id.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::collector::TestResult;

    #[derive(Default)]
    struct CallLog(Vec<String>);

    impl ResultCollector for CallLog {
        fn start_test(&mut self, id: &str) {
            self.0.push(format!("start {id}"));
        }
        fn stop_test(&mut self, id: &str) {
            self.0.push(format!("stop {id}"));
        }
        fn add_success(&mut self, id: &str) {
            self.0.push(format!("success {id}"));
        }
        fn add_failure(&mut self, id: &str, reason: &str, _trace: &str) {
            self.0.push(format!("failure {id} {reason}"));
        }
        fn add_error(&mut self, id: &str, reason: &str, _trace: &str) {
            self.0.push(format!("error {id} {reason}"));
        }
        fn add_skip(&mut self, id: &str, reason: &str) {
            self.0.push(format!("skip {id} {reason}"));
        }
        fn add_expected_failure(&mut self, id: &str, _trace: &str) {
            self.0.push(format!("xfail {id}"));
        }
        fn add_unexpected_success(&mut self, id: &str) {
            self.0.push(format!("xpass {id}"));
        }
    }

    fn sample_record() -> OutcomeRecord {
        let mut record = OutcomeRecord::new(42);
        record.start_test("s::a");
        record.add_failure("s::a", "first", "t1");
        record.stop_test("s::a");
        record.start_test("s::b");
        record.add_skip("s::b", "later");
        record.stop_test("s::b");
        record.start_test("s::c");
        record.add_failure("s::c", "second", "t2");
        record.stop_test("s::c");
        record
    }

    #[test]
    fn replay_preserves_call_order() {
        let mut log = CallLog::default();
        sample_record().replay(&mut log);

        assert_eq!(
            log.0,
            vec![
                "start s::a",
                "failure s::a first",
                "stop s::a",
                "start s::b",
                "skip s::b later",
                "stop s::b",
                "start s::c",
                "failure s::c second",
                "stop s::c",
            ]
        );
    }

    #[test]
    fn replay_into_test_result_keeps_category_order() {
        let mut result = TestResult::new();
        sample_record().replay(&mut result);

        assert_eq!(result.tests_run, 3);
        let reasons: Vec<_> = result.failures.iter().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons, vec!["first", "second"]);
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn record_survives_the_wire_format() {
        let record = sample_record();
        let decoded = OutcomeRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.tests_run(), 3);
    }

    #[test]
    fn entries_are_tagged_by_kind() {
        let json = serde_json::to_string(&OutcomeEntry::UnexpectedSuccess {
            id: "s::x".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"unexpected_success","id":"s::x"}"#);
    }

    #[test]
    fn truncated_record_does_not_decode() {
        let bytes = sample_record().to_bytes().unwrap();
        assert!(OutcomeRecord::from_bytes(&bytes[..bytes.len() / 2]).is_err());
        assert!(OutcomeRecord::from_bytes(b"").is_err());
    }

    #[test]
    fn abnormal_record_is_a_single_error() {
        let mut result = TestResult::new();
        OutcomeRecord::abnormal("unit", 7, "killed by signal 9").replay(&mut result);

        assert_eq!(result.tests_run, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].id, "unit");
        assert!(result.errors[0].trace.contains("killed by signal 9"));
    }
}
