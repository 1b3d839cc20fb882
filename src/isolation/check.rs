//! Named checks grouped into suites, with panic and trace capture

use crate::isolation::collector::ResultCollector;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// Outcome of one check body
pub type CheckResult = std::result::Result<(), CheckError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// An assertion did not hold
    Failure,
    /// Something other than an assertion went wrong
    Error,
}

/// Why a check body did not pass
#[derive(Debug, Clone)]
pub struct CheckError {
    pub kind: FaultKind,
    pub message: String,
    pub trace: String,
}

impl CheckError {
    fn capture(kind: FaultKind, message: String) -> Self {
        let trace = format!("{}\n\nstack backtrace:\n{}", message, Backtrace::force_capture());
        Self {
            kind,
            message,
            trace,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::capture(FaultKind::Failure, message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::capture(FaultKind::Error, message.into())
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Any error propagated with `?` out of a check body counts as an error
impl<E: std::error::Error> From<E> for CheckError {
    fn from(err: E) -> Self {
        Self::error(err.to_string())
    }
}

/// How a check's result is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    Run,
    Skip(String),
    /// Passing is reported as an unexpected success
    ExpectedFailure,
}

/// One named check over a fixture of type `T`
pub struct Check<T> {
    pub name: String,
    pub policy: Policy,
    body: fn(&T) -> CheckResult,
}

/// Ordered set of checks sharing one fixture
pub struct Suite<T> {
    name: String,
    checks: Vec<Check<T>>,
}

impl<T> Suite<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checks: Vec::new(),
        }
    }

    fn push(mut self, name: &str, policy: Policy, body: fn(&T) -> CheckResult) -> Self {
        self.checks.push(Check {
            name: name.to_string(),
            policy,
            body,
        });
        self
    }

    pub fn check(self, name: &str, body: fn(&T) -> CheckResult) -> Self {
        self.push(name, Policy::Run, body)
    }

    pub fn skip(self, name: &str, reason: &str, body: fn(&T) -> CheckResult) -> Self {
        self.push(name, Policy::Skip(reason.to_string()), body)
    }

    pub fn expected_failure(self, name: &str, body: fn(&T) -> CheckResult) -> Self {
        self.push(name, Policy::ExpectedFailure, body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Identifier reported for `check`
    pub fn check_id(&self, check: &Check<T>) -> String {
        format!("{}::{}", self.name, check.name)
    }

    /// Run every check against `fixture` and report to `result`
    pub fn run(&self, fixture: &T, result: &mut dyn ResultCollector) {
        for check in &self.checks {
            let id = self.check_id(check);
            result.start_test(&id);

            match &check.policy {
                Policy::Skip(reason) => result.add_skip(&id, reason),
                Policy::Run => match execute(check.body, fixture) {
                    Ok(()) => result.add_success(&id),
                    Err(fault) if fault.kind == FaultKind::Failure => {
                        result.add_failure(&id, &fault.message, &fault.trace)
                    }
                    Err(fault) => result.add_error(&id, &fault.message, &fault.trace),
                },
                Policy::ExpectedFailure => match execute(check.body, fixture) {
                    Ok(()) => result.add_unexpected_success(&id),
                    Err(fault) => result.add_expected_failure(&id, &fault.trace),
                },
            }

            result.stop_test(&id);
        }
    }
}

fn execute<T>(body: fn(&T) -> CheckResult, fixture: &T) -> CheckResult {
    match run_guarded(|| body(fixture)) {
        Ok(outcome) => outcome,
        Err(panicked) => Err(CheckError {
            kind: FaultKind::Failure,
            message: panicked.message,
            trace: panicked.trace,
        }),
    }
}

/// A panic caught by [`run_guarded`]
#[derive(Debug, Clone)]
pub struct Panicked {
    pub message: String,
    pub trace: String,
}

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chain a hook that records location and backtrace for guarded panics
/// and stays silent for them; other panics go to the previous hook.
///
/// Call before forking so the child never has to take the hook lock.
pub(crate) fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARDED.with(Cell::get) {
                let trace = format!("{}\n\nstack backtrace:\n{}", info, Backtrace::force_capture());
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

#[cfg(test)]
pub(crate) fn panic_hook_installed() -> bool {
    HOOK.is_completed()
}

/// Run `f`, turning a panic into a [`Panicked`] with its trace
pub fn run_guarded<R>(f: impl FnOnce() -> R) -> std::result::Result<R, Panicked> {
    install_panic_hook();

    let was_guarded = GUARDED.with(|g| g.replace(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    GUARDED.with(|g| g.set(was_guarded));

    outcome.map_err(|payload| {
        let message = payload_message(payload.as_ref());
        let trace = LAST_PANIC
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| message.clone());
        Panicked { message, trace }
    })
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::collector::TestResult;
    use crate::test_support::serial_guard;
    use std::io;

    fn passes(_: &u32) -> CheckResult {
        Ok(())
    }

    fn asserts(value: &u32) -> CheckResult {
        assert_eq!(*value, 0, "value must be zero");
        Ok(())
    }

    fn fails(_: &u32) -> CheckResult {
        Err(CheckError::failure("fail-ok"))
    }

    fn errors(_: &u32) -> CheckResult {
        Err::<(), _>(io::Error::other("fail-error"))?;
        Ok(())
    }

    #[test]
    fn suite_reports_each_category() {
        let _guard = serial_guard();
        let suite = Suite::new("sample")
            .check("passes", passes)
            .check("asserts", asserts)
            .check("fails", fails)
            .check("errors", errors)
            .skip("skipped", "not now", fails)
            .expected_failure("xfail", fails)
            .expected_failure("xpass", passes);
        assert_eq!(suite.len(), 7);

        let mut result = TestResult::new();
        suite.run(&1, &mut result);

        assert_eq!(result.tests_run, 7);
        assert_eq!(result.successes, vec!["sample::passes"]);

        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].id, "sample::asserts");
        assert!(result.failures[0].reason.contains("value must be zero"));
        assert!(result.failures[0].trace.contains("stack backtrace"));
        assert_eq!(result.failures[1].reason, "fail-ok");

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].id, "sample::errors");
        assert_eq!(result.errors[0].reason, "fail-error");
        assert!(!result.errors[0].trace.is_empty());

        assert_eq!(
            result.skipped,
            vec![("sample::skipped".to_string(), "not now".to_string())]
        );
        assert_eq!(result.expected_failures.len(), 1);
        assert_eq!(result.unexpected_successes, vec!["sample::xpass"]);
    }

    #[test]
    fn run_guarded_returns_value_or_panic() {
        let _guard = serial_guard();
        assert_eq!(run_guarded(|| 5).unwrap(), 5);

        let panicked = run_guarded(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panicked.message, "boom 1");
        assert!(panicked.trace.contains("boom 1"));
    }

    #[test]
    fn nested_guards_restore_outer_state() {
        let _guard = serial_guard();
        let outer = run_guarded(|| {
            let inner = run_guarded(|| panic!("inner"));
            assert!(inner.is_err());
            panic!("outer");
        })
        .unwrap_err();
        assert_eq!(outer.message, "outer");
        assert!(!GUARDED.with(Cell::get));
    }
}
