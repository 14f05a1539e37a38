//! Failure-rate circuit breaker for unattended batch runs
//!
//! The monitor keeps the outcomes of the last `window` calls. A failing call
//! is swallowed (logged to the exception log, reported as "no result") while
//! the rolling failure rate is tolerable, and propagated once at least
//! `min_calls` samples exist and the rate exceeds `error_rate_threshold`.
//!
//! ```text
//! call fails ──► record ──► samples >= min_calls && rate > threshold ?
//!                               │ yes                      │ no
//!                               ▼                          ▼
//!                          Err(e) to caller        append to log, Ok(None)
//! ```
//!
//! The decision is re-made on every call: a tripped call does not lock out
//! the next one. State is per instance and in memory only.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::error::GenerationError;

/// Breaker thresholds and exception log location.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Failure fraction in `[0, 1)` above which failures propagate.
    pub error_rate_threshold: f64,
    /// Samples required before the rate is evaluated.
    pub min_calls: usize,
    /// Number of most recent outcomes kept.
    pub window: usize,
    pub log_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 0.03,
            min_calls: 100,
            window: 100,
            log_path: PathBuf::from("exceptions.log"),
        }
    }
}

#[derive(Debug)]
pub enum MonitorError {
    InvalidConfig(String),
    Io(io::Error),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid monitor config: {msg}"),
            Self::Io(e) => write!(f, "exception log: {e}"),
        }
    }
}

impl std::error::Error for MonitorError {}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !(0.0..1.0).contains(&self.error_rate_threshold) {
            return Err(MonitorError::InvalidConfig(format!(
                "error_rate_threshold {} must be in [0, 1)",
                self.error_rate_threshold
            )));
        }
        if self.min_calls == 0 {
            return Err(MonitorError::InvalidConfig(
                "min_calls must be at least 1".to_string(),
            ));
        }
        if self.window < self.min_calls {
            return Err(MonitorError::InvalidConfig(format!(
                "window {} must be greater than or equal to min_calls {}",
                self.window, self.min_calls
            )));
        }
        Ok(())
    }
}

/// Rolling-window failure monitor.
#[derive(Debug)]
pub struct ExceptionMonitor {
    config: MonitorConfig,
    /// `true` = failure, oldest first.
    outcomes: VecDeque<bool>,
}

impl ExceptionMonitor {
    /// Create a monitor with an empty window and a fresh exception log.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        match fs::remove_file(&config.log_path) {
            Ok(()) => log::debug!("cleared {}", config.log_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(MonitorError::Io(e)),
        }
        Ok(Self {
            outcomes: VecDeque::with_capacity(config.window),
            config,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run `operation` under the breaker.
    ///
    /// `Ok(None)` means the call failed and the failure was swallowed.
    pub fn call<T>(
        &mut self,
        operation: impl FnOnce() -> Result<T, GenerationError>,
    ) -> Result<Option<T>, GenerationError> {
        match operation() {
            Ok(v) => {
                self.record(false);
                Ok(Some(v))
            }
            Err(e) => {
                self.record(true);
                if self.is_tripped() {
                    log::error!(
                        "error rate {:.1}% over last {} calls exceeds {:.1}%: {e}",
                        self.error_rate() * 100.0,
                        self.samples(),
                        self.config.error_rate_threshold * 100.0
                    );
                    return Err(e);
                }
                log::warn!(
                    "suppressed failure ({}/{} recent calls failed): {e}",
                    self.failures(),
                    self.samples()
                );
                if let Err(log_err) = self.save_exception(&e) {
                    log::error!(
                        "failed to append to {}: {log_err}",
                        self.config.log_path.display()
                    );
                }
                Ok(None)
            }
        }
    }

    fn record(&mut self, failed: bool) {
        if self.outcomes.len() == self.config.window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(failed);
    }

    /// Outcomes currently in the window.
    pub fn samples(&self) -> usize {
        self.outcomes.len()
    }

    /// Failures currently in the window.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|&&failed| failed).count()
    }

    pub fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures() as f64 / self.samples() as f64
    }

    /// Whether a failure recorded now would propagate.
    pub fn is_tripped(&self) -> bool {
        self.samples() >= self.config.min_calls
            && self.error_rate() > self.config.error_rate_threshold
    }

    fn save_exception(&self, error: &GenerationError) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_path)?;
        file.write_all(format_entry(chrono::Local::now(), error).as_bytes())
    }
}

/// One exception log entry: timestamp line, error with its cause chain, blank line.
fn format_entry(at: chrono::DateTime<chrono::Local>, error: &GenerationError) -> String {
    let mut entry = format!("{}\n{error}\n", at.to_rfc3339());
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        entry.push_str(&format!("caused by: {cause}\n"));
        source = cause.source();
    }
    entry.push_str(&format!("{error:?}\n\n"));
    entry
}
