//! External command execution with concurrent output draining

use crate::errors::{IsolateError, Result};
use crate::execution::stream::{LineSink, StreamDrainer, log_sink};
use log::{Level, debug};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Base environment a child starts from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvBase {
    /// Copy of the current process environment
    #[default]
    Inherit,
    /// Exactly these variables and nothing else
    Replace(BTreeMap<String, String>),
}

/// Description of one external command run
pub struct ProcessSpec {
    /// Program followed by its arguments
    pub args: Vec<String>,
    /// Text written to the child's stdin, which is closed afterwards
    pub input: Option<String>,
    /// Base environment
    pub env: EnvBase,
    /// Variables set on top of the base environment
    pub env_overlay: BTreeMap<String, String>,
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
    /// Log drained lines at info/error instead of debug
    pub verbose: bool,
    /// Treat a non-zero exit code as an error
    pub check: bool,
    stdout_sink: Option<LineSink>,
    stderr_sink: Option<LineSink>,
}

impl ProcessSpec {
    /// Build a spec from an explicit argument vector
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self::with_args(args.into_iter().map(|arg| arg.to_string()).collect())
    }

    /// Build a spec from a single command line, split on runs of whitespace
    pub fn from_command_line(command: &str) -> Self {
        Self::new(command.split_whitespace())
    }

    /// Build a spec from arguments where `None` stands for an empty argument
    pub fn from_optional_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: ToString,
    {
        Self::with_args(
            args.into_iter()
                .map(|arg| arg.map(|a| a.to_string()).unwrap_or_default())
                .collect(),
        )
    }

    fn with_args(args: Vec<String>) -> Self {
        Self {
            args,
            input: None,
            env: EnvBase::Inherit,
            env_overlay: BTreeMap::new(),
            cwd: None,
            verbose: true,
            check: true,
            stdout_sink: None,
            stderr_sink: None,
        }
    }

    /// Send `input` to the child's stdin
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Replace the whole child environment
    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = EnvBase::Replace(env);
        self
    }

    /// Add or overwrite one variable on top of the base environment
    pub fn env_add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overlay.insert(key.into(), value.into());
        self
    }

    /// Add or overwrite several variables on top of the base environment
    pub fn env_overlay<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_overlay
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Route drained lines to custom sinks instead of the logger
    pub fn sinks(mut self, stdout: LineSink, stderr: LineSink) -> Self {
        self.stdout_sink = Some(stdout);
        self.stderr_sink = Some(stderr);
        self
    }

    /// Environment the child should receive, or `None` to inherit unchanged
    pub fn resolved_env(&self) -> Option<BTreeMap<String, String>> {
        if self.env_overlay.is_empty() {
            return match &self.env {
                EnvBase::Inherit => None,
                EnvBase::Replace(vars) => Some(vars.clone()),
            };
        }

        let mut vars = match &self.env {
            EnvBase::Inherit => std::env::vars().collect::<BTreeMap<_, _>>(),
            EnvBase::Replace(vars) => vars.clone(),
        };
        vars.extend(
            self.env_overlay
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Some(vars)
    }

    fn take_sinks(&mut self) -> (LineSink, LineSink) {
        let (stdout_level, stderr_level) = sink_levels(self.verbose);
        let stdout = self
            .stdout_sink
            .take()
            .unwrap_or_else(|| log_sink(stdout_level));
        let stderr = self
            .stderr_sink
            .take()
            .unwrap_or_else(|| log_sink(stderr_level));
        (stdout, stderr)
    }

    fn to_command(&self) -> Result<Command> {
        let (program, rest) = self.args.split_first().ok_or(IsolateError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            });

        if let Some(vars) = self.resolved_env() {
            command.env_clear().envs(vars);
        }
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        Ok(command)
    }
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("args", &self.args)
            .field("input", &self.input.as_ref().map(|i| i.len()))
            .field("env", &self.env)
            .field("env_overlay", &self.env_overlay)
            .field("cwd", &self.cwd)
            .field("verbose", &self.verbose)
            .field("check", &self.check)
            .finish_non_exhaustive()
    }
}

/// Log levels for (stdout, stderr) lines
pub fn sink_levels(verbose: bool) -> (Level, Level) {
    if verbose {
        (Level::Info, Level::Error)
    } else {
        (Level::Debug, Level::Debug)
    }
}

/// Result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Process ID of the child
    pub pid: u32,
    /// Everything written to stdout
    pub stdout: String,
    /// Everything written to stderr
    pub stderr: String,
    /// Exit code, or 128 + signal if the child was killed
    pub exit_code: i32,
    /// Wall-clock time from launch to exit
    pub duration: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Runs external commands
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Run `spec` to completion.
    ///
    /// Both output streams are drained on their own threads while the child
    /// runs, so a chatty child cannot stall on a full pipe. The outcome is
    /// returned only after the child has exited and both streams hit EOF.
    pub fn run(mut spec: ProcessSpec) -> Result<ProcessOutcome> {
        debug!("cmd {:?}", spec.args);

        let mut command = spec.to_command()?;
        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| IsolateError::Spawn {
            program: spec.args[0].clone(),
            source,
        })?;
        let pid = child.id();

        let (stdout_sink, stderr_sink) = spec.take_sinks();
        let drainers = spawn_drainers(&mut child, stdout_sink, stderr_sink);
        let (stdout_drainer, stderr_drainer) = match drainers {
            Ok(drainers) => drainers,
            Err(e) => {
                abort(&mut child);
                return Err(e);
            }
        };

        if let Some(input) = spec.input.take() {
            if let Err(e) = feed_stdin(&mut child, &input) {
                abort(&mut child);
                return Err(e.into());
            }
        }

        let status = child.wait()?;
        let duration = start.elapsed();

        let stdout = stdout_drainer.result();
        let stderr = stderr_drainer.result();
        let exit_code = exit_code(status);

        debug!(
            "done in {:.2} seconds, code {}",
            duration.as_secs_f64(),
            exit_code
        );

        if exit_code != 0 && spec.check {
            return Err(IsolateError::ProcessExecution {
                code: exit_code,
                args: spec.args,
                stdout,
                stderr,
            });
        }

        Ok(ProcessOutcome {
            pid,
            stdout,
            stderr,
            exit_code,
            duration,
        })
    }
}

/// Run a command with default settings and return its stdout
pub fn run_process<I, S>(args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    ProcessExecutor::run(ProcessSpec::new(args)).map(|outcome| outcome.stdout)
}

fn spawn_drainers(
    child: &mut Child,
    stdout_sink: LineSink,
    stderr_sink: LineSink,
) -> Result<(StreamDrainer, StreamDrainer)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout pipe missing"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr pipe missing"))?;

    let stdout_drainer = StreamDrainer::spawn("stdout", stdout, stdout_sink)?;
    let stderr_drainer = StreamDrainer::spawn("stderr", stderr, stderr_sink)?;
    Ok((stdout_drainer, stderr_drainer))
}

/// Write `input` and close stdin so the child sees EOF
fn feed_stdin(child: &mut Child, input: &str) -> io::Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };

    match stdin.write_all(input.as_bytes()) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("child closed stdin early: {}", e);
            Ok(())
        }
        other => other,
    }
}

fn abort(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}
