//! Error types for process execution and isolation

use std::io;
use thiserror::Error;

/// Result type for isolate-rs operations
pub type Result<T> = std::result::Result<T, IsolateError>;

/// Errors that can occur while running or isolating processes
#[derive(Error, Debug)]
pub enum IsolateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Syscall error: {0}")]
    Syscall(String),

    #[error("Empty command")]
    EmptyCommand,

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Child exited with a non-zero code while the run was strict.
    /// Carries everything the child printed so callers do not have to re-run it.
    #[error("Command {args:?} exited with code {code}")]
    ProcessExecution {
        code: i32,
        args: Vec<String>,
        stdout: String,
        stderr: String,
    },

    #[error("Isolation channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IsolateError {
    /// Exit code of the failed child, if this error came from one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            IsolateError::ProcessExecution { code, .. } => Some(*code),
            _ => None,
        }
    }
}
