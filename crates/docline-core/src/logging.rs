//! Log setup: env_logger, routed through indicatif when progress bars are live

use std::io::Write;

use indicatif::MultiProgress;
use log::Log;

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(quiet: bool, debug: bool) -> &'static str {
    match (debug, quiet) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    }
}

fn label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Logger that suspends progress bars while printing a line.
pub struct ProgressLogger {
    filter: env_logger::Logger,
    multi: MultiProgress,
}

impl ProgressLogger {
    pub fn new(filter: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { filter, multi }
    }
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.filter.matches(record) {
            let level = record.level();
            let line = format!("[{}{}\x1b[0m] {}", color(level), label(level), record.args());
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.filter.flush();
    }
}

/// Initialize logging.
///
/// With `multi` (TTY), colored lines are printed above the progress bars.
/// Without it, lines carry a millisecond timestamp and no color, for log files.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    let env = env_logger::Env::default().default_filter_or(default_filter(quiet, debug));

    match multi {
        Some(multi) => {
            let filter = env_logger::Builder::from_env(env).build();
            let max_level = filter.filter();
            if log::set_boxed_logger(Box::new(ProgressLogger::new(filter, multi.clone()))).is_ok()
            {
                log::set_max_level(max_level);
            }
        }
        None => {
            let _ = env_logger::Builder::from_env(env)
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "{} [{}] {}",
                        buf.timestamp_millis(),
                        label(record.level()),
                        record.args()
                    )
                })
                .try_init();
        }
    }
}
