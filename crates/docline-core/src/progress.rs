//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY: a single batch bar managed by `MultiProgress` (log lines print above it).
//! Non-TTY: hidden bars; the periodic log lines are the only progress output.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn batch_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {prefix:<10.cyan.bold} {bar:30.green/dim} {pos}/{len} {eta:>4} {wide_msg:.dim}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("--")
}

/// Owner of the progress bars for one command.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Detect whether stderr is a terminal.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    /// Context with no visible output.
    pub fn hidden() -> Self {
        Self::with_tty(false)
    }

    fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Bar counting finished jobs out of `total`.
    pub fn batch_bar(&self, name: &str, total: usize) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(batch_style());
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// `MultiProgress` for the log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a count with thousands separators (`12345` → `12,345`).
pub fn fmt_num(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(999), "999");
    }

    #[test]
    fn fmt_num_groups() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(12_345), "12,345");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }

    #[test]
    fn hidden_context_hides_bars() {
        let progress = ProgressContext::hidden();
        assert!(!progress.is_tty());
        assert!(progress.batch_bar("extract", 10).is_hidden());
    }

    #[test]
    fn tty_bar_is_registered_and_sized() {
        let progress = ProgressContext::with_tty(true);
        let pb = progress.batch_bar("extract", 42);
        assert_eq!(pb.length(), Some(42));
        assert_eq!(pb.prefix(), "extract");
        pb.inc(2);
        assert_eq!(pb.position(), 2);
        pb.finish_and_clear();
    }
}
