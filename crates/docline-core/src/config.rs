//! Client and extraction configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::batch::Job;
use crate::extract::MarkdownSink;
use crate::monitor::MonitorConfig;
use crate::request::{Attachment, Request};

/// Settings consumed by [`ResilientClient`](crate::client::ResilientClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    /// Delays between attempts, in seconds.
    pub backoff_secs: Vec<u64>,
    pub error_rate_threshold: f64,
    pub min_calls: usize,
    pub window: usize,
    pub exception_log: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        Self {
            cache_enabled: false,
            cache_dir: PathBuf::from("./cache"),
            backoff_secs: vec![30, 60],
            error_rate_threshold: monitor.error_rate_threshold,
            min_calls: monitor.min_calls,
            window: monitor.window,
            exception_log: monitor.log_path,
        }
    }
}

impl ClientConfig {
    pub fn backoff(&self) -> Vec<Duration> {
        self.backoff_secs
            .iter()
            .map(|&s| Duration::from_secs(s))
            .collect()
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            error_rate_threshold: self.error_rate_threshold,
            min_calls: self.min_calls,
            window: self.window,
            log_path: self.exception_log.clone(),
        }
    }
}

/// Prompts, token limit and directories of an extraction run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    pub prompt_file: PathBuf,
    #[serde(deserialize_with = "deserialize_env_path")]
    pub system_prompt_file: Option<PathBuf>,
    pub max_output_tokens: Option<u32>,
    /// Scanned for `*.pdf` attachments, one job each.
    pub src_dir: PathBuf,
    pub dest_dir: PathBuf,
    /// Keep the model's remarks around the markdown block.
    pub include_annotation: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            prompt_file: PathBuf::from("prompts/extraction/instructions.txt"),
            system_prompt_file: None,
            max_output_tokens: None,
            src_dir: PathBuf::from("data/pdfs"),
            dest_dir: PathBuf::from("data/extracted"),
            include_annotation: false,
        }
    }
}

/// Deserialize a path that may be given as `${VAR}`.
fn deserialize_env_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)).map(PathBuf::from))
}

/// Expand `${VAR}` to the variable's value; other strings pass through.
fn expand_env_var(s: &str) -> Option<String> {
    match s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).ok(),
        None => Some(s.to_string()),
    }
}

fn read_prompt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt: {}", path.display()))
}

impl ExtractionConfig {
    /// Request carrying the configured prompts and token limit, no attachments.
    pub fn base_request(&self) -> Result<Request> {
        let mut request = Request::new(read_prompt(&self.prompt_file)?);
        if let Some(path) = &self.system_prompt_file {
            request = request.with_system_prompt(read_prompt(path)?);
        }
        if let Some(max_output_tokens) = self.max_output_tokens {
            request = request.with_max_output_tokens(max_output_tokens);
        }
        Ok(request)
    }

    /// PDFs directly under `src_dir`, sorted by path.
    pub fn source_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*.pdf",
            glob::Pattern::escape(&self.src_dir.to_string_lossy())
        );
        let mut files: Vec<_> = glob::glob(&pattern)
            .context("invalid glob pattern")?
            .filter_map(|e| e.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// One job per source PDF, named after the file stem.
    pub fn jobs(&self) -> Result<Vec<Job>> {
        let base = self.base_request()?;
        self.source_files()?
            .into_iter()
            .map(|path| -> Result<Job> {
                let id = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .with_context(|| format!("no file name: {}", path.display()))?;
                Ok(Job::new(id, base.clone().with_attachment(Attachment::file(path))))
            })
            .collect()
    }

    /// Output sink for `dest_dir`, created if missing.
    pub fn sink(&self) -> Result<MarkdownSink> {
        MarkdownSink::new(&self.dest_dir, self.include_annotation)
    }
}
