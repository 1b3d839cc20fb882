//! isolate-run - run a command with its output drained into the log

mod cli;
mod logging;
mod runner;

use clap::Parser;
use cli::Cli;
use console::style;
use isolate_rs::IsolateError;

fn main() {
    let cli = Cli::parse();

    logging::init_logger(cli.debug);
    let print = cli.print;

    let spec = match runner::build_spec(cli) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(2);
        }
    };

    match runner::run(spec) {
        Ok(outcome) => {
            if print {
                print!("{}", outcome.stdout);
            }
            std::process::exit(runner::exit_status(outcome.exit_code));
        }
        Err(IsolateError::ProcessExecution { code, stderr, .. }) => {
            eprintln!(
                "{} command exited with code {}",
                style("error:").red().bold(),
                code
            );
            if !stderr.is_empty() {
                eprint!("{}", stderr);
            }
            std::process::exit(runner::failure_status(code));
        }
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}
