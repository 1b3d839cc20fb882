//! Execution layer: running external commands
//!
//! Launches a child process, drains its stdout and stderr on dedicated
//! threads while it runs, and classifies the exit code.
//!
//! # Examples
//!
//! ```no_run
//! use isolate_rs::execution::{ProcessExecutor, ProcessSpec};
//!
//! let outcome = ProcessExecutor::run(
//!     ProcessSpec::new(["sh", "-c", "echo $GREETING"]).env_add("GREETING", "hello"),
//! )?;
//! assert_eq!(outcome.stdout, "hello\n");
//! # Ok::<(), isolate_rs::IsolateError>(())
//! ```

pub mod process;
pub mod stream;

pub use process::{EnvBase, ProcessExecutor, ProcessOutcome, ProcessSpec, run_process, sink_levels};
pub use stream::{LineBuffer, LineSink, PROCESS_LOG_TARGET, StreamDrainer, drain, log_sink};
