//! Result collectors shared by parent and child processes

use serde::{Deserialize, Serialize};

/// Receives the outcome of every check, in the order checks run.
///
/// Both sides of an isolated run speak this interface: the child records
/// into an [`OutcomeRecord`](super::OutcomeRecord), and the parent replays
/// that record into whatever collector the caller supplied.
pub trait ResultCollector {
    /// A check is about to run
    fn start_test(&mut self, id: &str);

    /// A check has finished, whatever its outcome
    fn stop_test(&mut self, _id: &str) {}

    fn add_success(&mut self, _id: &str) {}

    /// An assertion inside the check did not hold
    fn add_failure(&mut self, id: &str, reason: &str, trace: &str);

    /// The check broke for a reason other than a failed assertion
    fn add_error(&mut self, id: &str, reason: &str, trace: &str);

    fn add_skip(&mut self, id: &str, reason: &str);

    fn add_expected_failure(&mut self, id: &str, trace: &str);

    fn add_unexpected_success(&mut self, id: &str);
}

/// A failed or errored check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFault {
    pub id: String,
    pub reason: String,
    pub trace: String,
}

/// In-memory collector with one list per outcome category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestResult {
    /// Number of checks started
    pub tests_run: usize,
    pub successes: Vec<String>,
    pub failures: Vec<CheckFault>,
    pub errors: Vec<CheckFault>,
    /// (id, reason)
    pub skipped: Vec<(String, String)>,
    /// (id, trace)
    pub expected_failures: Vec<(String, String)>,
    pub unexpected_successes: Vec<String>,
}

impl TestResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing failed, errored or unexpectedly passed
    pub fn was_successful(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty() && self.unexpected_successes.is_empty()
    }
}

impl ResultCollector for TestResult {
    fn start_test(&mut self, _id: &str) {
        self.tests_run += 1;
    }

    fn add_success(&mut self, id: &str) {
        self.successes.push(id.to_string());
    }

    fn add_failure(&mut self, id: &str, reason: &str, trace: &str) {
        self.failures.push(CheckFault {
            id: id.to_string(),
            reason: reason.to_string(),
            trace: trace.to_string(),
        });
    }

    fn add_error(&mut self, id: &str, reason: &str, trace: &str) {
        self.errors.push(CheckFault {
            id: id.to_string(),
            reason: reason.to_string(),
            trace: trace.to_string(),
        });
    }

    fn add_skip(&mut self, id: &str, reason: &str) {
        self.skipped.push((id.to_string(), reason.to_string()));
    }

    fn add_expected_failure(&mut self, id: &str, trace: &str) {
        self.expected_failures
            .push((id.to_string(), trace.to_string()));
    }

    fn add_unexpected_success(&mut self, id: &str) {
        self.unexpected_successes.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_counts_started_checks() {
        let mut result = TestResult::new();
        result.start_test("a");
        result.add_success("a");
        result.start_test("b");
        result.add_skip("b", "not today");

        assert_eq!(result.tests_run, 2);
        assert_eq!(result.successes, vec!["a"]);
        assert_eq!(result.skipped, vec![("b".to_string(), "not today".to_string())]);
        assert!(result.was_successful());
    }

    #[test]
    fn failures_and_unexpected_successes_are_unsuccessful() {
        let mut result = TestResult::new();
        result.add_failure("a", "boom", "trace");
        assert!(!result.was_successful());

        let mut result = TestResult::new();
        result.add_unexpected_success("b");
        assert!(!result.was_successful());

        let mut result = TestResult::new();
        result.add_expected_failure("c", "trace");
        assert!(result.was_successful());
    }
}
