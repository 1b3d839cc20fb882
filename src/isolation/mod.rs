//! Isolation layer: running a unit of checks in a separate process
//!
//! The unit runs in a child created either by forking the current process
//! ([`IsolationMode::Duplicate`]) or by launching the current executable
//! again ([`IsolationMode::Respawn`]). The child records every collector
//! call into an [`OutcomeRecord`], sends it back over a socket pair, and the
//! parent replays it into the caller's collector.
//!
//! # Examples
//!
//! ```ignore
//! use isolate_rs::isolation::{IsolatedContext, TestResult};
//!
//! let mut unit = MyUnit::default();
//! let mut result = TestResult::new();
//! IsolatedContext::duplicate("my_unit").run(&mut unit, &mut result)?;
//! assert!(result.was_successful());
//! ```

pub mod channel;
pub mod check;
pub mod collector;
pub mod fork;
pub mod outcome;
pub mod respawn;

pub use check::{Check, CheckError, CheckResult, FaultKind, Policy, Suite, run_guarded};
pub use collector::{CheckFault, ResultCollector, TestResult};
pub use outcome::{OutcomeEntry, OutcomeRecord};
pub use respawn::{CHANNEL_FD_ENV, UNIT_ENV};

use crate::errors::Result;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// How the child process is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationMode {
    /// Copy-on-write fork: the child sees the parent's state as of the call.
    ///
    /// Only the calling thread exists in the child. A lock held by any other
    /// thread at the moment of the fork (allocator, stdio, backtrace
    /// symbolization) stays held forever, so units run this way can hang in
    /// a busy multi-threaded host. Prefer [`IsolationMode::Respawn`] there.
    Duplicate,
    /// Fresh start of the current executable: lazily computed state is
    /// computed again in the child
    Respawn,
}

/// A unit of work that can run in an isolated child
///
/// The unit travels to a respawned child as JSON, so whatever
/// [`set_up_parent`](IsolatedUnit::set_up_parent) stores in it is visible
/// to [`run`](IsolatedUnit::run) in both modes.
pub trait IsolatedUnit: Serialize + DeserializeOwned {
    /// Runs in the calling process before the child is created
    fn set_up_parent(&mut self) {}

    /// Runs in the child; every outcome goes to `result`
    fn run(&self, result: &mut dyn ResultCollector);
}

/// What the parent learned about the child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationReport {
    pub mode: IsolationMode,
    /// Process ID reported by the child, or the OS pid if it never reported
    pub child_pid: u32,
    /// Exit code, or 128 + signal
    pub exit_code: i32,
    /// Whether a complete outcome record arrived
    pub delivered: bool,
}

/// Raw result of one child run, before decoding
pub(crate) struct Delivery {
    pub pid: u32,
    pub payload: Vec<u8>,
    pub exit_code: i32,
}

/// Runs units in isolated child processes
#[derive(Debug, Clone)]
pub struct IsolatedContext {
    name: String,
    mode: IsolationMode,
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
}

impl IsolatedContext {
    pub fn new(name: impl Into<String>, mode: IsolationMode) -> Self {
        Self {
            name: name.into(),
            mode,
            program: None,
            args: None,
        }
    }

    /// Fork-based isolation
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::new(name, IsolationMode::Duplicate)
    }

    /// Re-exec isolation. Under the default arguments `name` must be the
    /// full libtest path of the test that makes this call.
    pub fn respawn(name: impl Into<String>) -> Self {
        Self::new(name, IsolationMode::Respawn)
    }

    /// Executable launched in respawn mode (defaults to the current one)
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Arguments for the respawned executable
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    /// Run `unit` in a child process and replay its outcome into `result`.
    ///
    /// Inside a respawned child this call runs the unit received from the
    /// parent and exits the process; it does not return.
    pub fn run<U: IsolatedUnit>(
        &self,
        unit: &mut U,
        result: &mut dyn ResultCollector,
    ) -> Result<IsolationReport> {
        if self.mode == IsolationMode::Respawn {
            if let Some(fd) = respawn::child_channel(&self.name) {
                respawn::serve::<U>(fd, &self.name);
            }
        }

        unit.set_up_parent();

        let delivery = match self.mode {
            IsolationMode::Duplicate => fork::run_forked(&self.name, unit)?,
            IsolationMode::Respawn => respawn::run_respawned(self, unit)?,
        };

        let (record, delivered) = match decode(&delivery) {
            Some(record) => (record, true),
            None => {
                let reason = describe_exit(delivery.exit_code);
                warn!(
                    "isolated unit {} produced no outcome; child {}",
                    self.name, reason
                );
                (
                    OutcomeRecord::abnormal(&self.name, delivery.pid, &reason),
                    false,
                )
            }
        };

        debug!(
            "replaying {} entries from child {} ({:?})",
            record.entries.len(),
            record.child_pid,
            self.mode
        );
        record.replay(result);

        Ok(IsolationReport {
            mode: self.mode,
            child_pid: record.child_pid,
            exit_code: delivery.exit_code,
            delivered,
        })
    }

    fn child_args(&self) -> Vec<String> {
        match &self.args {
            Some(args) => args.clone(),
            None => vec![
                self.name.clone(),
                "--exact".to_string(),
                "--nocapture".to_string(),
                "--test-threads=1".to_string(),
                "--quiet".to_string(),
            ],
        }
    }
}

/// Run `unit` against a fresh record; a panic escaping the unit becomes an
/// error entry named after the unit.
pub(crate) fn execute_unit<U: IsolatedUnit>(name: &str, unit: &U) -> OutcomeRecord {
    let mut record = OutcomeRecord::new(std::process::id());

    if let Err(panicked) = run_guarded(|| unit.run(&mut record)) {
        record.start_test(name);
        record.add_error(name, &panicked.message, &panicked.trace);
        record.stop_test(name);
    }

    record
}

fn decode(delivery: &Delivery) -> Option<OutcomeRecord> {
    if delivery.payload.is_empty() {
        return None;
    }

    match OutcomeRecord::from_bytes(&delivery.payload) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("discarding incomplete outcome record: {}", e);
            None
        }
    }
}

fn describe_exit(exit_code: i32) -> String {
    if exit_code > 128 {
        format!("was killed by signal {}", exit_code - 128)
    } else {
        format!("exited with code {}", exit_code)
    }
}
