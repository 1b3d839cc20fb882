use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "isolate-run")]
#[command(version, about = "Run a command with live output logging", long_about = None)]
#[command(after_help = "EXAMPLES:
    isolate-run -- ls -la
    isolate-run --env RUST_LOG=debug -- cargo build
    isolate-run --input 'hello' -- cat
    isolate-run --no-check -- sh -c 'exit 3'
")]
pub struct Cli {
    /// Program to run
    #[arg(value_name = "PROGRAM")]
    pub program: String,

    /// Program arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Log command output at debug level only
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not fail on a non-zero exit code
    #[arg(long)]
    pub no_check: bool,

    /// Set an environment variable (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Start from an empty environment instead of the current one
    #[arg(long)]
    pub clear_env: bool,

    /// Text written to the program's stdin
    #[arg(short, long, value_name = "TEXT")]
    pub input: Option<String>,

    /// Working directory
    #[arg(short = 'C', long, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    /// Print captured stdout when the command finishes
    #[arg(short, long)]
    pub print: bool,

    /// Show debug logging
    #[arg(short, long)]
    pub debug: bool,
}
