use console::style;
use env_logger::{Builder, Env};
use isolate_rs::execution::PROCESS_LOG_TARGET;
use log::{Level, LevelFilter};
use std::io::Write;

/// Initialize logger.
///
/// The runner logs the child's stdout at info and its stderr at error, so
/// the info default is what makes command output visible at all; `--quiet`
/// moves both streams down to debug.
pub fn init_logger(debug: bool) {
    let env = Env::default().filter_or("RUST_LOG", if debug { "debug" } else { "info" });

    Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{}",
                format_line(record.level(), record.target(), &record.args().to_string())
            )
        })
        .filter_level(if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();
}

/// Lines drained from the child get a stream marker instead of a level tag
pub fn format_line(level: Level, target: &str, message: &str) -> String {
    if target == PROCESS_LOG_TARGET {
        let marker = match level {
            Level::Error => style("!").red().bold(),
            _ => style("|").dim(),
        };
        return format!("{} {}", marker, message);
    }

    let label = match level {
        Level::Error => style("ERROR").red().bold(),
        Level::Warn => style("WARN ").yellow().bold(),
        Level::Info => style("INFO ").green(),
        Level::Debug => style("DEBUG").cyan(),
        Level::Trace => style("TRACE").dim(),
    };
    format!("{} {}", label, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_lines_use_stream_markers() {
        console::set_colors_enabled(false);

        assert_eq!(format_line(Level::Info, PROCESS_LOG_TARGET, "out"), "| out");
        assert_eq!(format_line(Level::Debug, PROCESS_LOG_TARGET, "quiet"), "| quiet");
        assert_eq!(format_line(Level::Error, PROCESS_LOG_TARGET, "err"), "! err");
    }

    #[test]
    fn other_lines_use_level_labels() {
        console::set_colors_enabled(false);

        assert_eq!(format_line(Level::Warn, "isolate_rs", "careful"), "WARN  careful");
        assert_eq!(format_line(Level::Debug, "isolate_run", "cmd"), "DEBUG cmd");
    }
}
